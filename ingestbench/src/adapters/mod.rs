//! Database adapters and the interface the executor drives them through.

pub mod coerce;
pub mod duckdb_adapter;
pub mod sqlite_adapter;

use crate::schema::TableSchema;
use crate::{BackendKind, BenchError, BenchResult, Row, RunConfig, UnitPayload, WorkUnit};
use ingestbench_harness::UnitKind;
use std::path::PathBuf;
use tracing::info;

pub use duckdb_adapter::DuckDbAdapter;
pub use sqlite_adapter::SqliteAdapter;

/// What one unit produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub kind: UnitKind,
    /// Rows inserted, or rows returned by the query.
    pub count: u64,
}

/// One open engine connection, owned by a single run.
pub trait Backend: Send {
    fn name(&self) -> &str;
    fn kind(&self) -> BackendKind;

    // ── setup / teardown ──

    /// Drop and recreate the table so every run starts empty.
    fn prepare_table(&mut self, schema: &TableSchema) -> BenchResult<()>;
    fn table_exists(&mut self, table: &str) -> BenchResult<bool>;
    fn create_indexes(&mut self, table: &str, columns: &[String]) -> BenchResult<()>;
    /// Checkpoint and release the connection.
    fn close(self: Box<Self>) -> BenchResult<()>;

    // ── work ──

    /// Insert raw rows into the prepared table in one transaction.
    fn insert_rows(&mut self, rows: &[Row]) -> BenchResult<u64>;
    /// Run a statement and count the rows it returns.
    fn run_query(&mut self, sql: &str) -> BenchResult<u64>;

    fn execute_unit(&mut self, unit: &WorkUnit) -> BenchResult<ExecutionOutcome> {
        let result = match &unit.payload {
            UnitPayload::Rows(rows) => self.insert_rows(rows).map(|count| ExecutionOutcome {
                kind: UnitKind::Ingest,
                count,
            }),
            UnitPayload::Query(sql) => self.run_query(sql).map(|count| ExecutionOutcome {
                kind: UnitKind::Query,
                count,
            }),
        };
        result.map_err(|e| match e {
            BenchError::Execution(msg) => BenchError::Execution(msg),
            other => BenchError::Execution(other.to_string()),
        })
    }

    // ── profiling ──

    /// Start collecting a per-query profile for every later `run_query`.
    fn enable_profiling(&mut self) -> BenchResult<()> {
        Err(BenchError::Config(format!(
            "{} does not support query profiling",
            self.name()
        )))
    }

    /// Profile of the last query, if one was collected and not yet taken.
    fn take_profile(&mut self) -> Option<serde_json::Value> {
        None
    }

    // ── storage size ──
    fn db_size_bytes(&self) -> BenchResult<u64>;
}

/// Opens a backend for a run configuration.
pub trait BackendFactory {
    fn connect(&self, config: &RunConfig) -> BenchResult<Box<dyn Backend>>;
}

/// Opens the real engines, one store file per configuration under `store_dir`.
#[derive(Debug, Clone)]
pub struct EngineFactory {
    pub store_dir: PathBuf,
}

impl EngineFactory {
    pub fn new(store_dir: impl Into<PathBuf>) -> Self {
        Self {
            store_dir: store_dir.into(),
        }
    }
}

impl BackendFactory for EngineFactory {
    fn connect(&self, config: &RunConfig) -> BenchResult<Box<dyn Backend>> {
        std::fs::create_dir_all(&self.store_dir).map_err(|e| {
            BenchError::Connection(format!(
                "cannot create store dir {}: {}",
                self.store_dir.display(),
                e
            ))
        })?;
        let path = config.store_path(&self.store_dir);
        info!(
            backend = %config.backend,
            path = %path.display(),
            memory_limit = %config.memory_limit,
            threads = config.threads,
            "connecting"
        );
        match config.backend {
            BackendKind::DuckDb => Ok(Box::new(DuckDbAdapter::open(&path, config)?)),
            BackendKind::Sqlite => Ok(Box::new(SqliteAdapter::open(&path, config)?)),
        }
    }
}

/// Sum of a store file and its write-ahead log, if any.
pub(crate) fn file_with_wal_size(path: &std::path::Path, wal: &std::path::Path) -> BenchResult<u64> {
    let mut total = std::fs::metadata(path)?.len();
    if wal.exists() {
        total += std::fs::metadata(wal)?.len();
    }
    Ok(total)
}

pub(crate) fn index_name(table: &str, column: &str) -> String {
    let clean: String = column
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("idx_{}_{}", table, clean)
}
