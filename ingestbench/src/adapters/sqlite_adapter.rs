//! SQLite adapter (via rusqlite).
//!
//! Configuration: WAL mode, NORMAL synchronous, page cache and soft heap
//! limit sized from the run's memory limit, `threads` helper threads.

use super::coerce::{coerce_row, Cell};
use super::{file_with_wal_size, index_name, Backend};
use crate::schema::{quote_ident, ColumnType, TableSchema};
use crate::{BackendKind, BenchError, BenchResult, Row, RunConfig};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct SqliteAdapter {
    conn: Connection,
    path: PathBuf,
    schema: Option<TableSchema>,
}

impl SqliteAdapter {
    pub fn open(path: &Path, config: &RunConfig) -> BenchResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| BenchError::Connection(format!("SQLite open {}: {}", path.display(), e)))?;

        // A negative cache_size is a size in KiB rather than pages.
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -{};
             PRAGMA soft_heap_limit = {};
             PRAGMA threads = {};",
            config.memory_limit.kib().max(1),
            config.memory_limit.bytes(),
            config.threads
        ))
        .map_err(|e| BenchError::Connection(format!("SQLite pragma: {}", e)))?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
            schema: None,
        })
    }
}

fn column_type(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Integer => "INTEGER",
        ColumnType::Real => "REAL",
        ColumnType::Timestamp | ColumnType::Text => "TEXT",
    }
}

fn to_value(cell: Cell) -> Value {
    match cell {
        Cell::Null => Value::Null,
        Cell::Integer(v) => Value::Integer(v),
        Cell::Real(v) if v.is_finite() => Value::Real(v),
        Cell::Real(_) => Value::Null,
        Cell::Timestamp(ts) => Value::Text(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        Cell::Text(s) => Value::Text(s),
    }
}

impl Backend for SqliteAdapter {
    fn name(&self) -> &str {
        "SQLite"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn prepare_table(&mut self, schema: &TableSchema) -> BenchResult<()> {
        let sql = format!(
            "DROP TABLE IF EXISTS {};\n{};",
            quote_ident(&schema.table),
            schema.create_table_sql(column_type)
        );
        debug!(%sql, "SQLite prepare table");
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
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
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
        // WAL checkpoint to consolidate.
        let _ = self.conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);");
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
                .prepare_cached(&schema.insert_sql())
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
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| BenchError::Execution(format!("prepare: {}", e)))?;
        let mut rows = stmt
            .query([])
            .map_err(|e| BenchError::Execution(format!("query: {}", e)))?;
        let mut count = 0u64;
        while rows
            .next()
            .map_err(|e| BenchError::Execution(format!("next: {}", e)))?
            .is_some()
        {
            count += 1;
        }
        Ok(count)
    }

    fn db_size_bytes(&self) -> BenchResult<u64> {
        let wal = PathBuf::from(format!("{}-wal", self.path.display()));
        file_with_wal_size(&self.path, &wal)
    }
}
