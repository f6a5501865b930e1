//! Conversion of raw CSV cells into typed values.
//!
//! A cell that is empty or does not parse as its column's type becomes
//! `Null`; a batch never fails because of its contents.

use crate::schema::{parse_timestamp, ColumnType, TableSchema};
use crate::Row;
use chrono::NaiveDateTime;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Integer(i64),
    Real(f64),
    Timestamp(NaiveDateTime),
    Text(String),
}

pub fn coerce_cell(raw: &str, ty: ColumnType) -> Cell {
    if ty == ColumnType::Text {
        return Cell::Text(raw.to_string());
    }
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Cell::Null;
    }
    match ty {
        ColumnType::Integer => trimmed
            .parse::<i64>()
            .ok()
            .or_else(|| integral_float(trimmed))
            .map(Cell::Integer)
            .unwrap_or(Cell::Null),
        ColumnType::Real => trimmed
            .parse::<f64>()
            .map(Cell::Real)
            .unwrap_or(Cell::Null),
        ColumnType::Timestamp => parse_timestamp(trimmed)
            .map(Cell::Timestamp)
            .unwrap_or(Cell::Null),
        ColumnType::Text => Cell::Text(raw.to_string()),
    }
}

// "3.0" in an integer column.
fn integral_float(raw: &str) -> Option<i64> {
    let v: f64 = raw.parse().ok()?;
    if v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

/// Coerce a row to the schema's width: missing cells are `Null`, extra
/// cells are dropped.
pub fn coerce_row(schema: &TableSchema, row: &Row) -> Vec<Cell> {
    schema
        .columns
        .iter()
        .enumerate()
        .map(|(i, col)| match row.get(i) {
            Some(raw) => coerce_cell(raw, col.ty),
            None => Cell::Null,
        })
        .collect()
}
