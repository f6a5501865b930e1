//! DuckDB adapter.
//!
//! Configuration: `memory_limit` and `threads` from the run configuration.
//! With profiling enabled DuckDB writes a JSON profile of each statement to
//! `{store}.profile.json`, which is read back after every query.

use super::coerce::{coerce_row, Cell};
use super::{file_with_wal_size, index_name, Backend};
use crate::schema::{quote_ident, ColumnType, TableSchema};
use crate::{BackendKind, BenchError, BenchResult, Row, RunConfig};
use duckdb::types::{TimeUnit, Value};
use duckdb::{params, params_from_iter, Connection};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct DuckDbAdapter {
    conn: Connection,
    path: PathBuf,
    schema: Option<TableSchema>,
    profile_path: Option<PathBuf>,
    last_profile: Option<serde_json::Value>,
}

impl DuckDbAdapter {
    pub fn open(path: &Path, config: &RunConfig) -> BenchResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| BenchError::Connection(format!("DuckDB open {}: {}", path.display(), e)))?;

        conn.execute_batch(&format!(
            "SET memory_limit = '{}';
             SET threads = {};",
            config.memory_limit, config.threads
        ))
        .map_err(|e| BenchError::Connection(format!("DuckDB config: {}", e)))?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
            schema: None,
            profile_path: None,
            last_profile: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_profile(path: &Path) -> Option<serde_json::Value> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "query profile missing");
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "query profile is not valid JSON");
                None
            }
        }
    }
}

fn column_type(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Integer => "BIGINT",
        ColumnType::Real => "DOUBLE",
        ColumnType::Timestamp => "TIMESTAMP",
        ColumnType::Text => "VARCHAR",
    }
}

fn to_value(cell: Cell) -> Value {
    match cell {
        Cell::Null => Value::Null,
        Cell::Integer(v) => Value::BigInt(v),
        Cell::Real(v) => Value::Double(v),
        Cell::Timestamp(ts) => Value::Timestamp(TimeUnit::Microsecond, ts.and_utc().timestamp_micros()),
        Cell::Text(s) => Value::Text(s),
    }
}

impl Backend for DuckDbAdapter {
    fn name(&self) -> &str {
        "DuckDB"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::DuckDb
    }

    fn prepare_table(&mut self, schema: &TableSchema) -> BenchResult<()> {
        let sql = format!(
            "DROP TABLE IF EXISTS {};\n{};",
            quote_ident(&schema.table),
            schema.create_table_sql(column_type)
        );
        debug!(%sql, "DuckDB prepare table");
        self.conn
            .execute_batch(&sql)
            .map_err(|e| BenchError::Schema(format!("create {}: {}", schema.table, e)))?;
        self.schema = Some(schema.clone());
        Ok(())
    }

    fn table_exists(&mut self, table: &str) -> BenchResult<bool> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ?",
                params![table],
                |row| row.get(0),
            )
            .map_err(|e| BenchError::Schema(format!("table lookup: {}", e)))?;
        Ok(count > 0)
    }

    fn create_indexes(&mut self, table: &str, columns: &[String]) -> BenchResult<()> {
        for col in columns {
            let sql = format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                quote_ident(&index_name(table, col)),
                quote_ident(table),
                quote_ident(col)
            );
            self.conn
                .execute_batch(&sql)
                .map_err(|e| BenchError::Schema(format!("index on {}: {}", col, e)))?;
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> BenchResult<()> {
        let _ = self.conn.execute_batch("CHECKPOINT;");
        if let Some(profile) = &self.profile_path {
            let _ = std::fs::remove_file(profile);
        }
        Ok(())
    }

    fn insert_rows(&mut self, rows: &[Row]) -> BenchResult<u64> {
        let schema = self
            .schema
            .as_ref()
            .ok_or_else(|| BenchError::Execution("table not prepared".into()))?;
        let tx = self
            .conn
            .transaction()
            .map_err(|e| BenchError::Execution(format!("begin: {}", e)))?;
        {
            let mut stmt = tx
                .prepare(&schema.insert_sql())
                .map_err(|e| BenchError::Execution(format!("prepare: {}", e)))?;
            for row in rows {
                let values = coerce_row(schema, row).into_iter().map(to_value);
                stmt.execute(params_from_iter(values))
                    .map_err(|e| BenchError::Execution(format!("insert: {}", e)))?;
            }
        }
        tx.commit()
            .map_err(|e| BenchError::Execution(format!("commit: {}", e)))?;
        Ok(rows.len() as u64)
    }

    fn run_query(&mut self, sql: &str) -> BenchResult<u64> {
        self.last_profile = None;
        let mut count = 0u64;
        {
            let mut stmt = self
                .conn
                .prepare(sql)
                .map_err(|e| BenchError::Execution(format!("prepare: {}", e)))?;
            let mut rows = stmt
                .query([])
                .map_err(|e| BenchError::Execution(format!("query: {}", e)))?;
            while rows
                .next()
                .map_err(|e| BenchError::Execution(format!("next: {}", e)))?
                .is_some()
            {
                count += 1;
            }
        }
        // The profile is written once the statement's result is released.
        if let Some(path) = &self.profile_path {
            self.last_profile = Self::read_profile(path);
        }
        Ok(count)
    }

    fn enable_profiling(&mut self) -> BenchResult<()> {
        let path = PathBuf::from(format!("{}.profile.json", self.path.display()));
        let _ = std::fs::remove_file(&path);
        let sql = format!(
            "PRAGMA enable_profiling = 'json';
             PRAGMA profiling_output = '{}';",
            path.display().to_string().replace('\'', "''")
        );
        self.conn
            .execute_batch(&sql)
            .map_err(|e| BenchError::Config(format!("DuckDB profiling: {}", e)))?;
        debug!(path = %path.display(), "DuckDB JSON profiling enabled");
        self.profile_path = Some(path);
        Ok(())
    }

    fn take_profile(&mut self) -> Option<serde_json::Value> {
        self.last_profile.take()
    }

    fn db_size_bytes(&self) -> BenchResult<u64> {
        let wal = PathBuf::from(format!("{}.wal", self.path.display()));
        file_with_wal_size(&self.path, &wal)
    }
}
