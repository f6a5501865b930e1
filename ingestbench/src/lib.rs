//! Shared types for ingestbench: errors, run configuration and work units.

pub mod adapters;
pub mod config;
pub mod executor;
pub mod report;
pub mod schema;
pub mod sources;
pub mod sweep;

use ingestbench_harness::{LogError, SamplingError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

// ────────────────────────────────────────────────────────────────────────────────
// Error type
// ────────────────────────────────────────────────────────────────────────────────

pub type BenchResult<T> = std::result::Result<T, BenchError>;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("schema error: {0}")]
    Schema(String),
    #[error("execution error: {0}")]
    Execution(String),
    #[error("source error: {0}")]
    Source(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("log error: {0}")]
    Log(#[from] LogError),
    #[error("sampling error: {0}")]
    Sampling(#[from] SamplingError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ────────────────────────────────────────────────────────────────────────────────
// Backend kind
// ────────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Embedded analytical engine.
    DuckDb,
    /// Embedded relational engine.
    Sqlite,
}

impl BackendKind {
    pub const ALL: [BackendKind; 2] = [BackendKind::DuckDb, BackendKind::Sqlite];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::DuckDb => "duckdb",
            BackendKind::Sqlite => "sqlite",
        }
    }

    /// Extension of the store file.
    pub fn file_extension(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = BenchError;

    fn from_str(s: &str) -> BenchResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "duckdb" => Ok(BackendKind::DuckDb),
            "sqlite" | "sqlite3" => Ok(BackendKind::Sqlite),
            other => Err(BenchError::Config(format!("unknown backend '{}'", other))),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Memory limit
// ────────────────────────────────────────────────────────────────────────────────

/// A memory budget such as `256MB` or `4GB` (binary multiples).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoryLimit {
    text: String,
    bytes: u64,
}

impl MemoryLimit {
    pub fn parse(raw: &str) -> BenchResult<Self> {
        let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        let split = compact
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(compact.len());
        let (number, unit) = compact.split_at(split);

        let value: f64 = number
            .parse()
            .map_err(|_| BenchError::Config(format!("invalid memory limit '{}'", raw)))?;
        let (multiplier, unit_text) = match unit.to_ascii_lowercase().as_str() {
            "b" => (1u64, "B"),
            "kb" | "k" => (1 << 10, "KB"),
            "kib" => (1 << 10, "KiB"),
            "mb" | "m" => (1 << 20, "MB"),
            "mib" => (1 << 20, "MiB"),
            "gb" | "g" => (1 << 30, "GB"),
            "gib" => (1 << 30, "GiB"),
            "tb" | "t" => (1 << 40, "TB"),
            "tib" => (1 << 40, "TiB"),
            _ => {
                return Err(BenchError::Config(format!(
                    "invalid memory limit unit in '{}'",
                    raw
                )))
            }
        };

        let bytes = (value * multiplier as f64).round();
        if !bytes.is_finite() || bytes < 1.0 {
            return Err(BenchError::Config(format!(
                "memory limit '{}' must be positive",
                raw
            )));
        }
        Ok(Self {
            text: format!("{}{}", number, unit_text),
            bytes: bytes as u64,
        })
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn kib(&self) -> u64 {
        self.bytes / 1024
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Form used in file names: `256mb`.
    pub fn slug(&self) -> String {
        self.text.to_ascii_lowercase()
    }
}

impl fmt::Display for MemoryLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for MemoryLimit {
    type Err = BenchError;

    fn from_str(s: &str) -> BenchResult<Self> {
        MemoryLimit::parse(s)
    }
}

impl Serialize for MemoryLimit {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for MemoryLimit {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        MemoryLimit::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// ────────────────────────────────────────────────────────────────────────────────
// Run configuration
// ────────────────────────────────────────────────────────────────────────────────

/// One point of the configuration space. Owns one connection, one log
/// file and one store file for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub backend: BackendKind,
    pub memory_limit: MemoryLimit,
    pub threads: usize,
    pub batch_size: usize,
}

impl RunConfig {
    pub fn new(
        backend: BackendKind,
        memory_limit: MemoryLimit,
        threads: usize,
        batch_size: usize,
    ) -> BenchResult<Self> {
        let config = Self {
            backend,
            memory_limit,
            threads,
            batch_size,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BenchResult<()> {
        if self.threads == 0 {
            return Err(BenchError::Config("threads must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(BenchError::Config("batch size must be at least 1".into()));
        }
        Ok(())
    }

    /// `duckdb_256mb_2threads`
    pub fn canonical_name(&self) -> String {
        format!(
            "{}_{}_{}threads",
            self.backend,
            self.memory_limit.slug(),
            self.threads
        )
    }

    pub fn log_path(&self, log_dir: &Path, prefix: &str) -> PathBuf {
        let name = if prefix.is_empty() {
            format!("{}.jsonl", self.canonical_name())
        } else {
            format!("{}_{}.jsonl", prefix, self.canonical_name())
        };
        log_dir.join(name)
    }

    pub fn store_path(&self, store_dir: &Path) -> PathBuf {
        store_dir.join(format!(
            "{}.{}",
            self.canonical_name(),
            self.backend.file_extension()
        ))
    }
}

/// A log file name split back into its workload prefix and run configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LogName {
    /// Everything before the canonical name; empty for unprefixed logs.
    pub workload: String,
    pub backend: BackendKind,
    pub memory_limit: MemoryLimit,
    pub threads: usize,
}

/// Inverse of [`RunConfig::log_path`]: `{workload}_{canonical}[.jsonl]`.
pub fn parse_log_name(name: &str) -> Option<LogName> {
    let stem = name.strip_suffix(".jsonl").unwrap_or(name);
    let parts: Vec<&str> = stem.split('_').collect();
    if parts.len() < 3 {
        return None;
    }
    let n = parts.len();
    let threads: usize = parts[n - 1].strip_suffix("threads")?.parse().ok()?;
    let memory_limit = MemoryLimit::parse(parts[n - 2]).ok()?;
    let backend: BackendKind = parts[n - 3].parse().ok()?;
    Some(LogName {
        workload: parts[..n - 3].join("_"),
        backend,
        memory_limit,
        threads,
    })
}

// ────────────────────────────────────────────────────────────────────────────────
// Work units
// ────────────────────────────────────────────────────────────────────────────────

/// Raw CSV cells of one record.
pub type Row = Vec<String>;

#[derive(Debug, Clone, PartialEq)]
pub enum UnitPayload {
    Rows(Vec<Row>),
    Query(String),
}

/// One atomic piece of work, measured as a whole.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkUnit {
    /// 1-based position within its run.
    pub index: u64,
    pub tag: String,
    pub payload: UnitPayload,
}

impl WorkUnit {
    pub fn rows(index: u64, tag: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            index,
            tag: tag.into(),
            payload: UnitPayload::Rows(rows),
        }
    }

    pub fn query(index: u64, tag: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            index,
            tag: tag.into(),
            payload: UnitPayload::Query(sql.into()),
        }
    }

    /// Row count for ingestion units, SQL byte length for queries.
    pub fn len(&self) -> usize {
        match &self.payload {
            UnitPayload::Rows(rows) => rows.len(),
            UnitPayload::Query(sql) => sql.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows a failed unit would have written; queries attempt none.
    pub fn rows_attempted(&self) -> u64 {
        match &self.payload {
            UnitPayload::Rows(rows) => rows.len() as u64,
            UnitPayload::Query(_) => 0,
        }
    }

    pub fn sql(&self) -> Option<&str> {
        match &self.payload {
            UnitPayload::Query(sql) => Some(sql),
            UnitPayload::Rows(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_limit_parse() {
        let m = MemoryLimit::parse("256MB").unwrap();
        assert_eq!(m.bytes(), 256 * 1024 * 1024);
        assert_eq!(m.slug(), "256mb");

        let g = MemoryLimit::parse(" 4 gb ").unwrap();
        assert_eq!(g.bytes(), 4 << 30);
        assert_eq!(g.as_str(), "4GB");

        assert_eq!(MemoryLimit::parse("1GiB").unwrap().bytes(), 1 << 30);
        assert_eq!(MemoryLimit::parse("512KB").unwrap().kib(), 512);
        assert_eq!(MemoryLimit::parse("1.5GB").unwrap().bytes(), 3 << 29);
    }

    #[test]
    fn test_memory_limit_rejects_garbage() {
        assert!(MemoryLimit::parse("").is_err());
        assert!(MemoryLimit::parse("GB").is_err());
        assert!(MemoryLimit::parse("12XB").is_err());
        assert!(MemoryLimit::parse("0MB").is_err());
    }

    #[test]
    fn test_canonical_name_round_trip() {
        let cfg = RunConfig::new(
            BackendKind::DuckDb,
            MemoryLimit::parse("256MB").unwrap(),
            2,
            10_000,
        )
        .unwrap();
        assert_eq!(cfg.canonical_name(), "duckdb_256mb_2threads");

        let parsed = parse_log_name("ingest_duckdb_256mb_2threads.jsonl").unwrap();
        assert_eq!(parsed.workload, "ingest");
        assert_eq!(parsed.backend, BackendKind::DuckDb);
        assert_eq!(parsed.memory_limit.bytes(), cfg.memory_limit.bytes());
        assert_eq!(parsed.threads, 2);

        assert_eq!(parse_log_name("duckdb_256mb_2threads").unwrap().workload, "");
        assert_eq!(
            parse_log_name("my_query_sqlite_1gb_4threads.jsonl").unwrap().workload,
            "my_query"
        );
        assert!(parse_log_name("notes.jsonl").is_none());
    }

    #[test]
    fn test_paths() {
        let cfg = RunConfig::new(BackendKind::Sqlite, MemoryLimit::parse("1GB").unwrap(), 4, 100).unwrap();
        assert_eq!(
            cfg.log_path(Path::new("logs"), "ingest"),
            PathBuf::from("logs/ingest_sqlite_1gb_4threads.jsonl")
        );
        assert_eq!(
            cfg.store_path(Path::new("db")),
            PathBuf::from("db/sqlite_1gb_4threads.sqlite")
        );
    }

    #[test]
    fn test_invalid_run_config() {
        let mem = MemoryLimit::parse("1GB").unwrap();
        assert!(RunConfig::new(BackendKind::Sqlite, mem.clone(), 0, 100).is_err());
        assert!(RunConfig::new(BackendKind::Sqlite, mem, 1, 0).is_err());
    }

    #[test]
    fn test_unit_len() {
        let rows = WorkUnit::rows(1, "ingest_chunk", vec![vec!["a".into()], vec!["b".into()]]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.rows_attempted(), 2);
        let q = WorkUnit::query(1, "point_lookup", "SELECT 1");
        assert_eq!(q.len(), 8);
        assert_eq!(q.rows_attempted(), 0);
        assert!(WorkUnit::rows(1, "x", vec![]).is_empty());
    }
}
