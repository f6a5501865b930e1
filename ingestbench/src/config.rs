//! Sweep configuration: which run configurations to enumerate and which
//! workload each run executes. Loadable from YAML or TOML.

use crate::sources::queries::DEFAULT_QUERY_SEED;
use crate::sources::streaming::DEFAULT_SAMPLE_ROWS;
use crate::sources::{BulkSpec, QuerySpec, StopFlag, StreamMode, StreamingSpec, WorkloadSpec};
use crate::{BackendKind, BenchError, BenchResult, MemoryLimit, RunConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BATCH_SIZE: usize = 10_000;
pub const DEFAULT_MEMORY_LIMITS: &[&str] = &["256MB", "512MB", "1GB", "4GB"];
pub const DEFAULT_THREADS: &[usize] = &[1, 2, 4];
pub const DEFAULT_TABLE: &str = "trips";

fn default_backends() -> Vec<BackendKind> {
    BackendKind::ALL.to_vec()
}

fn default_memory_limits() -> Vec<MemoryLimit> {
    DEFAULT_MEMORY_LIMITS
        .iter()
        .filter_map(|m| MemoryLimit::parse(m).ok())
        .collect()
}

fn default_threads() -> Vec<usize> {
    DEFAULT_THREADS.to_vec()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_delimiter() -> char {
    ','
}

fn default_sample_rows() -> usize {
    DEFAULT_SAMPLE_ROWS
}

fn default_seed() -> u64 {
    DEFAULT_QUERY_SEED
}

fn default_stream_mode() -> StreamMode {
    StreamMode::random(0.1, 1.0)
}

fn default_wait_secs() -> f64 {
    30.0
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_db_dir() -> PathBuf {
    PathBuf::from("db")
}

/// Configuration dimensions of a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPlan {
    #[serde(default = "default_backends")]
    pub backends: Vec<BackendKind>,
    #[serde(default = "default_memory_limits")]
    pub memory_limits: Vec<MemoryLimit>,
    #[serde(default = "default_threads")]
    pub threads: Vec<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for SweepPlan {
    fn default() -> Self {
        Self {
            backends: default_backends(),
            memory_limits: default_memory_limits(),
            threads: default_threads(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl SweepPlan {
    /// Cross product in `backends x memory_limits x threads` nesting order.
    pub fn configs(&self) -> BenchResult<Vec<RunConfig>> {
        if self.backends.is_empty() || self.memory_limits.is_empty() || self.threads.is_empty() {
            return Err(BenchError::Config(
                "sweep needs at least one backend, memory limit and thread count".into(),
            ));
        }
        let mut out =
            Vec::with_capacity(self.backends.len() * self.memory_limits.len() * self.threads.len());
        for backend in &self.backends {
            for memory in &self.memory_limits {
                for &threads in &self.threads {
                    out.push(RunConfig::new(*backend, memory.clone(), threads, self.batch_size)?);
                }
            }
        }
        Ok(out)
    }
}

/// Workload section of a sweep file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkloadFile {
    Ingest {
        input: PathBuf,
        #[serde(default = "default_table")]
        table: String,
        #[serde(default = "default_delimiter")]
        delimiter: char,
    },
    Stream {
        input: PathBuf,
        #[serde(default = "default_table")]
        table: String,
        #[serde(default = "default_delimiter")]
        delimiter: char,
        #[serde(default = "default_stream_mode")]
        pattern: StreamMode,
        #[serde(default = "default_sample_rows")]
        sample_rows: usize,
        #[serde(default)]
        max_rows: Option<u64>,
        #[serde(default)]
        max_seconds: Option<f64>,
        #[serde(default = "default_seed")]
        seed: u64,
    },
    Query {
        sample: PathBuf,
        #[serde(default = "default_table")]
        table: String,
        #[serde(default = "default_delimiter")]
        delimiter: char,
        #[serde(default)]
        rounds: Option<u64>,
        #[serde(default)]
        max_seconds: Option<f64>,
        #[serde(default = "default_seed")]
        seed: u64,
        #[serde(default)]
        preload: bool,
        #[serde(default)]
        create_indexes: bool,
        #[serde(default = "default_wait_secs")]
        wait_for_table_secs: f64,
        /// Attach DuckDB's JSON query profile to every query record.
        #[serde(default)]
        profile: bool,
    },
}

pub fn delimiter_byte(c: char) -> BenchResult<u8> {
    if c.is_ascii() && c != '\n' && c != '\r' && c != '"' {
        Ok(c as u8)
    } else {
        Err(BenchError::Config(format!("unsupported delimiter {:?}", c)))
    }
}

impl WorkloadFile {
    /// `stop` ends streaming and query runs early once set.
    pub fn to_spec(&self, stop: Option<StopFlag>) -> BenchResult<WorkloadSpec> {
        match self {
            WorkloadFile::Ingest {
                input,
                table,
                delimiter,
            } => Ok(WorkloadSpec::Bulk(BulkSpec {
                input: input.clone(),
                table: table.clone(),
                delimiter: delimiter_byte(*delimiter)?,
            })),
            WorkloadFile::Stream {
                input,
                table,
                delimiter,
                pattern,
                sample_rows,
                max_rows,
                max_seconds,
                seed,
            } => Ok(WorkloadSpec::Streaming(StreamingSpec {
                input: input.clone(),
                table: table.clone(),
                delimiter: delimiter_byte(*delimiter)?,
                mode: *pattern,
                sample_rows: *sample_rows,
                max_rows: *max_rows,
                max_seconds: *max_seconds,
                seed: *seed,
                stop,
            })),
            WorkloadFile::Query {
                sample,
                table,
                delimiter,
                rounds,
                max_seconds,
                seed,
                preload,
                create_indexes,
                wait_for_table_secs,
                profile,
            } => {
                if !(wait_for_table_secs.is_finite() && *wait_for_table_secs >= 0.0) {
                    return Err(BenchError::Config("wait_for_table_secs must be >= 0".into()));
                }
                Ok(WorkloadSpec::Query(QuerySpec {
                    sample: sample.clone(),
                    table: table.clone(),
                    delimiter: delimiter_byte(*delimiter)?,
                    rounds: *rounds,
                    max_seconds: *max_seconds,
                    seed: *seed,
                    preload: *preload,
                    create_indexes: *create_indexes,
                    wait_for_table: Duration::from_secs_f64(*wait_for_table_secs),
                    profile: *profile,
                    stop,
                }))
            }
        }
    }

    /// Input file the workload reads.
    pub fn input(&self) -> &Path {
        match self {
            WorkloadFile::Ingest { input, .. } | WorkloadFile::Stream { input, .. } => input,
            WorkloadFile::Query { sample, .. } => sample,
        }
    }
}

/// A complete sweep description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepFile {
    #[serde(default)]
    pub sweep: SweepPlan,
    pub workload: WorkloadFile,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_db_dir")]
    pub db_dir: PathBuf,
}

impl SweepFile {
    /// Load from YAML (`.yaml` / `.yml`) or TOML (`.toml`), chosen by extension.
    pub fn load(path: &Path) -> BenchResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| BenchError::Config(format!("read {}: {}", path.display(), e)))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            Some("toml") => Self::from_toml(&content),
            _ => Err(BenchError::Config(format!(
                "{}: expected a .yaml, .yml or .toml file",
                path.display()
            ))),
        }
    }

    pub fn from_yaml(content: &str) -> BenchResult<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| BenchError::Config(format!("sweep YAML: {}", e)))
    }

    pub fn from_toml(content: &str) -> BenchResult<Self> {
        toml::from_str(content).map_err(|e| BenchError::Config(format!("sweep TOML: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[test]
    fn test_configs_nesting_order() {
        let plan = SweepPlan {
            backends: vec![BackendKind::DuckDb, BackendKind::Sqlite],
            memory_limits: vec![MemoryLimit::parse("256MB").unwrap(), MemoryLimit::parse("1GB").unwrap()],
            threads: vec![1, 2, 4],
            batch_size: 500,
        };
        let names: Vec<String> = plan.configs().unwrap().iter().map(|c| c.canonical_name()).collect();
        assert_eq!(names.len(), 12);
        assert_eq!(names[0], "duckdb_256mb_1threads");
        assert_eq!(names[1], "duckdb_256mb_2threads");
        assert_eq!(names[3], "duckdb_1gb_1threads");
        assert_eq!(names[6], "sqlite_256mb_1threads");
        assert_eq!(names[11], "sqlite_1gb_4threads");
    }

    #[test]
    fn test_invalid_plans() {
        let mut plan = SweepPlan::default();
        plan.threads = vec![];
        assert!(plan.configs().is_err());

        let mut plan = SweepPlan::default();
        plan.threads = vec![1, 0];
        assert!(matches!(plan.configs(), Err(BenchError::Config(_))));

        let mut plan = SweepPlan::default();
        plan.batch_size = 0;
        assert!(plan.configs().is_err());
    }

    #[test]
    fn test_yaml_defaults() {
        let yaml = r#"
workload:
  kind: ingest
  input: data/trips.csv
"#;
        let file = SweepFile::from_yaml(yaml).unwrap();
        assert_eq!(file.sweep, SweepPlan::default());
        assert_eq!(file.log_dir, PathBuf::from("logs"));
        assert_eq!(file.sweep.configs().unwrap().len(), 2 * 4 * 3);
        match file.workload.to_spec(None).unwrap() {
            WorkloadSpec::Bulk(spec) => {
                assert_eq!(spec.table, "trips");
                assert_eq!(spec.delimiter, b',');
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_yaml_stream_pattern() {
        let yaml = r#"
sweep:
  backends: [sqlite]
  memory_limits: ["512 MB"]
  threads: [2]
workload:
  kind: stream
  input: data/trips.csv
  max_rows: 1000
  pattern:
    mode: fixed_rows
    rows: 25
    delay: 0.5
"#;
        let file = SweepFile::from_yaml(yaml).unwrap();
        let configs = file.sweep.configs().unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].canonical_name(), "sqlite_512mb_2threads");
        let stop: StopFlag = Arc::new(AtomicBool::new(false));
        match file.workload.to_spec(Some(stop.clone())).unwrap() {
            WorkloadSpec::Streaming(spec) => {
                assert_eq!(spec.mode, StreamMode::FixedRows { rows: 25, delay: 0.5 });
                assert!(spec.stop.as_ref().is_some_and(|s| Arc::ptr_eq(s, &stop)));
                assert_eq!(spec.max_rows, Some(1000));
                assert_eq!(spec.sample_rows, DEFAULT_SAMPLE_ROWS);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_toml_query() {
        let text = r#"
log_dir = "out/logs"

[sweep]
backends = ["duckdb"]
memory_limits = ["1GB", "4GB"]
threads = [1, 8]
batch_size = 2000

[workload]
kind = "query"
sample = "data/sample.csv"
rounds = 10
preload = true
delimiter = "|"
profile = true
"#;
        let file = SweepFile::from_toml(text).unwrap();
        assert_eq!(file.log_dir, PathBuf::from("out/logs"));
        assert_eq!(file.sweep.configs().unwrap().len(), 4);
        let stop: StopFlag = Arc::new(AtomicBool::new(false));
        match file.workload.to_spec(Some(stop)).unwrap() {
            WorkloadSpec::Query(spec) => {
                assert!(spec.profile);
                assert!(spec.stop.is_some());
                assert_eq!(spec.rounds, Some(10));
                assert_eq!(spec.seed, DEFAULT_QUERY_SEED);
                assert_eq!(spec.delimiter, b'|');
                assert!(spec.preload);
                assert_eq!(spec.wait_for_table, Duration::from_secs(30));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sweep.json");
        fs::write(&path, "{}").unwrap();
        assert!(matches!(SweepFile::load(&path), Err(BenchError::Config(_))));

        let path = dir.path().join("sweep.yml");
        fs::write(&path, "workload:\n  kind: query\n  sample: s.csv\n").unwrap();
        assert!(SweepFile::load(&path).is_ok());
    }

    #[test]
    fn test_bad_delimiter() {
        assert!(delimiter_byte('\t').is_ok());
        assert!(delimiter_byte('→').is_err());
    }
}
