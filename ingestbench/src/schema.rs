//! Table layout inferred from a CSV header and a sample of rows.
//!
//! Only the coarse type guess needed to create a table is made: a column is
//! Integer, Real or Timestamp when every non-empty sampled cell parses as
//! such, and Text otherwise.

use crate::{BenchError, BenchResult, Row};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Rows inspected per column when guessing types.
pub const INFERENCE_SAMPLE_ROWS: usize = 1000;

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %I:%M:%S %p",
];

/// Parse a timestamp in any of the accepted layouts.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Real,
    Timestamp,
    Text,
}

impl ColumnType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Real)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<Column>,
}

impl TableSchema {
    /// Build a schema from a header and sample rows. Names are trimmed and
    /// lowercased; blank names become `column_<n>` and repeats get a numeric
    /// suffix.
    pub fn infer(table: &str, header: &[String], sample: &[Row]) -> BenchResult<Self> {
        if header.is_empty() {
            return Err(BenchError::Schema("CSV header has no columns".into()));
        }
        validate_identifier(table)?;

        let mut seen = HashSet::new();
        let mut columns = Vec::with_capacity(header.len());
        for (i, raw) in header.iter().enumerate() {
            let mut name = raw.trim().to_lowercase();
            if name.is_empty() {
                name = format!("column_{}", i + 1);
            }
            let base = name.clone();
            let mut n = 2;
            while !seen.insert(name.clone()) {
                name = format!("{}_{}", base, n);
                n += 1;
            }

            let cells = sample
                .iter()
                .take(INFERENCE_SAMPLE_ROWS)
                .filter_map(|row| row.get(i))
                .map(|c| c.trim())
                .filter(|c| !c.is_empty());
            columns.push(Column {
                name,
                ty: guess_type(cells),
            });
        }

        Ok(Self {
            table: table.to_string(),
            columns,
        })
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// `CREATE TABLE` statement using `type_name` for each column type.
    pub fn create_table_sql(&self, type_name: impl Fn(ColumnType) -> &'static str) -> String {
        let cols: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), type_name(c.ty)))
            .collect();
        format!(
            "CREATE TABLE {} ({})",
            quote_ident(&self.table),
            cols.join(", ")
        )
    }

    /// `INSERT INTO t (a, b) VALUES (?, ?)`
    pub fn insert_sql(&self) -> String {
        let names: Vec<String> = self.columns.iter().map(|c| quote_ident(&c.name)).collect();
        let params = vec!["?"; self.columns.len()].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&self.table),
            names.join(", "),
            params
        )
    }
}

fn guess_type<'a>(cells: impl Iterator<Item = &'a str>) -> ColumnType {
    let mut all_int = true;
    let mut all_real = true;
    let mut all_ts = true;
    let mut any = false;

    for cell in cells {
        any = true;
        if all_int && cell.parse::<i64>().is_err() {
            all_int = false;
        }
        if all_real && cell.parse::<f64>().is_err() {
            all_real = false;
        }
        if all_ts && parse_timestamp(cell).is_none() {
            all_ts = false;
        }
        if !(all_int || all_real || all_ts) {
            break;
        }
    }

    if !any {
        ColumnType::Text
    } else if all_int {
        ColumnType::Integer
    } else if all_real {
        ColumnType::Real
    } else if all_ts {
        ColumnType::Timestamp
    } else {
        ColumnType::Text
    }
}

/// Double-quoted SQL identifier, understood by both engines.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn validate_identifier(table: &str) -> BenchResult<()> {
    let ok = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !table.starts_with(|c: char| c.is_ascii_digit());
    if ok {
        Ok(())
    } else {
        Err(BenchError::Schema(format!("invalid table name '{}'", table)))
    }
}
