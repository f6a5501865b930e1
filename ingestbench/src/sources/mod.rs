//! Work-unit sources: bulk CSV batches, simulated streaming writes and
//! generated analytical queries.

pub mod bulk;
pub mod queries;
pub mod streaming;

use crate::adapters::Backend;
use crate::schema::TableSchema;
use crate::{BenchError, BenchResult, Row, RunConfig, WorkUnit};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub use bulk::BulkCsvSource;
pub use queries::{QueryProfile, QuerySource};
pub use streaming::{StreamMode, StreamingSource};

/// Shared flag asking an unbounded source to stop at its next boundary.
pub type StopFlag = Arc<AtomicBool>;

pub fn stop_requested(flag: &Option<StopFlag>) -> bool {
    flag.as_ref().is_some_and(|f| f.load(Ordering::Relaxed))
}

/// Produces the units of one run, in order.
pub trait UnitSource {
    /// Next unit, `Ok(None)` once the source is exhausted or stopped.
    fn next_unit(&mut self) -> BenchResult<Option<WorkUnit>>;
}

// ────────────────────────────────────────────────────────────────────────────────
// CSV helpers
// ────────────────────────────────────────────────────────────────────────────────

pub(crate) fn open_csv(path: &Path, delimiter: u8) -> BenchResult<csv::Reader<File>> {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_path(path)
        .map_err(|e| BenchError::Source(format!("open {}: {}", path.display(), e)))
}

pub(crate) fn read_header(reader: &mut csv::Reader<File>, path: &Path) -> BenchResult<Vec<String>> {
    let header: Vec<String> = reader
        .headers()
        .map_err(|e| BenchError::Source(format!("{}: header: {}", path.display(), e)))?
        .iter()
        .map(|s| s.to_string())
        .collect();
    if header.is_empty() || header.iter().all(|h| h.trim().is_empty()) {
        return Err(BenchError::Source(format!("{}: missing header", path.display())));
    }
    Ok(header)
}

/// Read up to `limit` records.
pub(crate) fn read_rows(
    reader: &mut csv::Reader<File>,
    limit: usize,
    path: &Path,
) -> BenchResult<Vec<Row>> {
    let mut rows = Vec::new();
    let mut record = csv::StringRecord::new();
    while rows.len() < limit {
        let more = reader
            .read_record(&mut record)
            .map_err(|e| BenchError::Source(format!("{}: {}", path.display(), e)))?;
        if !more {
            break;
        }
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }
    Ok(rows)
}

/// Header and the first `limit` rows of a CSV file; fails when there are no rows.
pub(crate) fn load_sample(path: &Path, delimiter: u8, limit: usize) -> BenchResult<(Vec<String>, Vec<Row>)> {
    let mut reader = open_csv(path, delimiter)?;
    let header = read_header(&mut reader, path)?;
    let rows = read_rows(&mut reader, limit, path)?;
    if rows.is_empty() {
        return Err(BenchError::Source(format!("{}: no data rows", path.display())));
    }
    Ok((header, rows))
}

// ────────────────────────────────────────────────────────────────────────────────
// Workloads
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BulkSpec {
    pub input: PathBuf,
    pub table: String,
    pub delimiter: u8,
}

#[derive(Debug, Clone)]
pub struct StreamingSpec {
    pub input: PathBuf,
    pub table: String,
    pub delimiter: u8,
    pub mode: StreamMode,
    pub sample_rows: usize,
    pub max_rows: Option<u64>,
    pub max_seconds: Option<f64>,
    pub seed: u64,
    pub stop: Option<StopFlag>,
}

#[derive(Debug, Clone)]
pub struct QuerySpec {
    pub sample: PathBuf,
    pub table: String,
    pub delimiter: u8,
    pub rounds: Option<u64>,
    pub max_seconds: Option<f64>,
    pub seed: u64,
    /// Create the table from the sample before querying.
    pub preload: bool,
    pub create_indexes: bool,
    /// How long to wait for the table to appear when not preloading.
    pub wait_for_table: Duration,
    /// Collect the engine's JSON profile of every query.
    pub profile: bool,
    pub stop: Option<StopFlag>,
}

/// What a run does: which source feeds it and how the table is set up.
#[derive(Debug, Clone)]
pub enum WorkloadSpec {
    Bulk(BulkSpec),
    Streaming(StreamingSpec),
    Query(QuerySpec),
}

impl WorkloadSpec {
    /// Log file prefix.
    pub fn name(&self) -> &'static str {
        match self {
            WorkloadSpec::Bulk(_) => "ingest",
            WorkloadSpec::Streaming(_) => "stream",
            WorkloadSpec::Query(_) => "query",
        }
    }

    /// Prepare the backend for this workload and open a fresh source.
    pub fn open(
        &self,
        backend: &mut dyn Backend,
        config: &RunConfig,
    ) -> BenchResult<Box<dyn UnitSource>> {
        match self {
            WorkloadSpec::Bulk(spec) => {
                let source = BulkCsvSource::open(&spec.input, spec.delimiter, config.batch_size)?;
                let schema = TableSchema::infer(&spec.table, source.header(), source.sample())?;
                backend.prepare_table(&schema)?;
                info!(table = %spec.table, columns = schema.columns.len(), "table prepared");
                Ok(Box::new(source))
            }
            WorkloadSpec::Streaming(spec) => {
                let source = StreamingSource::open(spec)?;
                let schema = TableSchema::infer(&spec.table, source.header(), source.working_set())?;
                backend.prepare_table(&schema)?;
                info!(table = %spec.table, columns = schema.columns.len(), "table prepared");
                Ok(Box::new(source))
            }
            WorkloadSpec::Query(spec) => {
                let (header, rows) = load_sample(&spec.sample, spec.delimiter, queries::PROFILE_SAMPLE_ROWS)?;
                let schema = TableSchema::infer(&spec.table, &header, &rows)?;
                let profile = QueryProfile::build(&schema, &rows);

                if spec.preload {
                    backend.prepare_table(&schema)?;
                    for chunk in rows.chunks(config.batch_size) {
                        backend.insert_rows(chunk).map_err(|e| {
                            BenchError::Schema(format!("preload {}: {}", spec.table, e))
                        })?;
                    }
                    info!(table = %spec.table, rows = rows.len(), "sample preloaded");
                } else {
                    wait_for_table(backend, &spec.table, spec.wait_for_table)?;
                }

                if spec.create_indexes {
                    let columns = profile.index_columns();
                    if let Err(e) = backend.create_indexes(&spec.table, &columns) {
                        warn!(error = %e, "index creation failed, continuing without");
                    }
                }

                if spec.profile {
                    match backend.enable_profiling() {
                        Ok(()) => info!(backend = backend.name(), "query profiling enabled"),
                        Err(e) => warn!(error = %e, "query profiling unavailable, continuing without"),
                    }
                }

                Ok(Box::new(QuerySource::new(
                    profile,
                    &spec.table,
                    config.backend,
                    spec.rounds,
                    spec.max_seconds,
                    spec.seed,
                    spec.stop.clone(),
                )))
            }
        }
    }
}

fn wait_for_table(backend: &mut dyn Backend, table: &str, timeout: Duration) -> BenchResult<()> {
    let start = Instant::now();
    loop {
        if backend.table_exists(table)? {
            return Ok(());
        }
        if start.elapsed() >= timeout {
            return Err(BenchError::Schema(format!(
                "table '{}' does not exist (waited {:.0?})",
                table, timeout
            )));
        }
        info!(table, "waiting for table");
        std::thread::sleep(Duration::from_millis(500).min(timeout));
    }
}
