//! ingestbench: instrumented ingestion and query benchmarks
//!
//! Usage:
//!   ingestbench ingest --input trips.csv --backend duckdb --memory-limit 1GB --threads 4
//!   ingestbench stream --input trips.csv --backend sqlite --mode fixed_rows --max-rows 5000
//!   ingestbench query  --sample sample.csv --backend duckdb --rounds 20 --preload --profile
//!   ingestbench sweep  --config sweep.yaml
//!   ingestbench sweep  --input trips.csv --memory-limits 256MB,1GB --threads 1,2,4
//!   ingestbench summarize --log-dir logs --export results

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use ingestbench::adapters::EngineFactory;
use ingestbench::config::{
    delimiter_byte, SweepFile, SweepPlan, WorkloadFile, DEFAULT_BATCH_SIZE, DEFAULT_TABLE,
};
use ingestbench::report::{self, ExportBundle};
use ingestbench::sources::queries::DEFAULT_QUERY_SEED;
use ingestbench::sources::streaming::DEFAULT_SAMPLE_ROWS;
use ingestbench::sources::{BulkSpec, QuerySpec, StopFlag, StreamMode, StreamingSpec, WorkloadSpec};
use ingestbench::sweep::SweepDriver;
use ingestbench::{BackendKind, BenchError, BenchResult, MemoryLimit, RunConfig};
use ingestbench_harness::EnvironmentInfo;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ingestbench", about = "Instrumented ingestion and query benchmarks for DuckDB and SQLite")]
#[command(version)]
struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bulk-load a CSV file in fixed-size batches.
    Ingest {
        /// CSV file to load.
        #[arg(long)]
        input: PathBuf,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Simulated streaming writes drawn from a CSV working set.
    Stream {
        #[arg(long)]
        input: PathBuf,
        /// random, fixed_rows or scheduled_pattern.
        #[arg(long, default_value = "random")]
        mode: StreamMode,
        #[arg(long)]
        max_rows: Option<u64>,
        #[arg(long)]
        max_seconds: Option<f64>,
        /// Largest batch in random mode.
        #[arg(long, default_value = "100")]
        max_batch: usize,
        #[arg(long, default_value = "0.1")]
        delay_min: f64,
        #[arg(long, default_value = "1.0")]
        delay_max: f64,
        /// Rows per batch in fixed_rows mode.
        #[arg(long, default_value = "10")]
        rows: usize,
        /// Delay in fixed_rows and scheduled_pattern modes.
        #[arg(long, default_value = "1.0")]
        delay: f64,
        #[arg(long, default_value_t = DEFAULT_SAMPLE_ROWS)]
        sample_rows: usize,
        #[arg(long, default_value_t = DEFAULT_QUERY_SEED)]
        seed: u64,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Randomized analytical queries against a table.
    Query {
        /// CSV sample the query profile is built from.
        #[arg(long)]
        sample: PathBuf,
        #[arg(long)]
        rounds: Option<u64>,
        #[arg(long)]
        max_seconds: Option<f64>,
        /// Create and fill the table from the sample first.
        #[arg(long)]
        preload: bool,
        #[arg(long)]
        create_indexes: bool,
        #[arg(long, default_value_t = DEFAULT_QUERY_SEED)]
        seed: u64,
        /// Seconds to wait for the table when not preloading.
        #[arg(long, default_value = "30")]
        wait_secs: f64,
        /// Log DuckDB's JSON query profile with every query record.
        #[arg(long)]
        profile: bool,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Run a workload across backends x memory limits x thread counts.
    Sweep {
        /// YAML or TOML sweep file.
        #[arg(long, conflicts_with = "input")]
        config: Option<PathBuf>,
        /// CSV file for a bulk ingestion sweep given by flags.
        #[arg(long, required_unless_present = "config")]
        input: Option<PathBuf>,
        #[arg(long, value_delimiter = ',', default_value = "duckdb,sqlite")]
        backends: Vec<BackendKind>,
        #[arg(long, value_delimiter = ',', default_value = "256MB,512MB,1GB,4GB")]
        memory_limits: Vec<MemoryLimit>,
        #[arg(long, value_delimiter = ',', default_value = "1,2,4")]
        threads: Vec<usize>,
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
        #[arg(long, default_value = DEFAULT_TABLE)]
        table: String,
        #[arg(long, default_value = ",")]
        delimiter: char,
        #[command(flatten)]
        out: OutputArgs,
    },
    /// Fold existing JSONL logs into summaries and a speedup table.
    Summarize {
        #[arg(long, default_value = "logs")]
        log_dir: PathBuf,
        /// Export directory for CSV + JSON results.
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

/// One run configuration plus where its files go.
#[derive(Args, Debug)]
struct RunArgs {
    #[arg(long, default_value = "duckdb")]
    backend: BackendKind,
    #[arg(long, default_value = "1GB")]
    memory_limit: MemoryLimit,
    #[arg(long, default_value = "1")]
    threads: usize,
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,
    #[arg(long, default_value = DEFAULT_TABLE)]
    table: String,
    #[arg(long, default_value = ",")]
    delimiter: char,
    #[command(flatten)]
    out: OutputArgs,
}

#[derive(Args, Debug)]
struct OutputArgs {
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
    #[arg(long, default_value = "db")]
    db_dir: PathBuf,
    /// Export directory for CSV + JSON results.
    #[arg(long)]
    export: Option<PathBuf>,
}

impl RunArgs {
    fn config(&self) -> BenchResult<RunConfig> {
        RunConfig::new(self.backend, self.memory_limit.clone(), self.threads, self.batch_size)
    }

    fn delimiter(&self) -> BenchResult<u8> {
        delimiter_byte(self.delimiter)
    }
}

fn main() -> BenchResult<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let stop = install_stop_handler()?;

    match cli.command {
        Command::Ingest { input, run } => {
            require_file(&input)?;
            let workload = WorkloadSpec::Bulk(BulkSpec {
                input,
                table: run.table.clone(),
                delimiter: run.delimiter()?,
            });
            run_sweep(workload, vec![run.config()?], &run.out, &stop)
        }
        Command::Stream {
            input,
            mode,
            max_rows,
            max_seconds,
            max_batch,
            delay_min,
            delay_max,
            rows,
            delay,
            sample_rows,
            seed,
            run,
        } => {
            require_file(&input)?;
            let mode = match mode {
                StreamMode::Random { .. } => StreamMode::Random {
                    max_batch,
                    delay_min,
                    delay_max,
                },
                StreamMode::FixedRows { .. } => StreamMode::FixedRows { rows, delay },
                StreamMode::ScheduledPattern { .. } => StreamMode::ScheduledPattern { delay },
            };
            if max_rows.is_none() && max_seconds.is_none() {
                tracing::warn!("no --max-rows or --max-seconds given, streaming until interrupted");
            }
            let workload = WorkloadSpec::Streaming(StreamingSpec {
                input,
                table: run.table.clone(),
                delimiter: run.delimiter()?,
                mode,
                sample_rows,
                max_rows,
                max_seconds,
                seed,
                stop: Some(stop.clone()),
            });
            run_sweep(workload, vec![run.config()?], &run.out, &stop)
        }
        Command::Query {
            sample,
            rounds,
            max_seconds,
            preload,
            create_indexes,
            seed,
            wait_secs,
            profile,
            run,
        } => {
            require_file(&sample)?;
            if !(wait_secs.is_finite() && wait_secs >= 0.0) {
                return Err(BenchError::Config("--wait-secs must be >= 0".into()));
            }
            let workload = WorkloadSpec::Query(QuerySpec {
                sample,
                table: run.table.clone(),
                delimiter: run.delimiter()?,
                rounds,
                max_seconds,
                seed,
                preload,
                create_indexes,
                wait_for_table: Duration::from_secs_f64(wait_secs),
                profile,
                stop: Some(stop.clone()),
            });
            run_sweep(workload, vec![run.config()?], &run.out, &stop)
        }
        Command::Sweep {
            config: Some(path),
            out,
            ..
        } => {
            let file = SweepFile::load(&path)?;
            require_file(file.workload.input())?;
            let out = OutputArgs {
                log_dir: file.log_dir.clone(),
                db_dir: file.db_dir.clone(),
                export: out.export,
            };
            let workload = file.workload.to_spec(Some(stop.clone()))?;
            run_sweep(workload, file.sweep.configs()?, &out, &stop)
        }
        Command::Sweep {
            config: None,
            input,
            backends,
            memory_limits,
            threads,
            batch_size,
            table,
            delimiter,
            out,
        } => {
            let input = input.ok_or_else(|| BenchError::Config("--input or --config is required".into()))?;
            require_file(&input)?;
            let plan = SweepPlan {
                backends,
                memory_limits,
                threads,
                batch_size,
            };
            let workload = WorkloadFile::Ingest {
                input,
                table,
                delimiter,
            };
            run_sweep(workload.to_spec(Some(stop.clone()))?, plan.configs()?, &out, &stop)
        }
        Command::Summarize { log_dir, export } => summarize(&log_dir, export.as_deref()),
    }
}

/// Ctrl-C ends the current run after the unit in flight and skips the
/// remaining configurations of the sweep.
fn install_stop_handler() -> BenchResult<StopFlag> {
    let stop: StopFlag = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    ctrlc::set_handler(move || {
        eprintln!("\n{} stop requested, finishing current unit", "INTERRUPT".yellow());
        flag.store(true, Ordering::SeqCst);
    })
    .map_err(|e| BenchError::Config(format!("cannot install Ctrl-C handler: {}", e)))?;
    Ok(stop)
}

fn require_file(path: &Path) -> BenchResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(BenchError::Config(format!("input file not found: {}", path.display())))
    }
}

fn run_sweep(
    workload: WorkloadSpec,
    configs: Vec<RunConfig>,
    out: &OutputArgs,
    stop: &StopFlag,
) -> BenchResult<()> {
    std::fs::create_dir_all(&out.log_dir).map_err(|e| {
        BenchError::Config(format!("cannot create log dir {}: {}", out.log_dir.display(), e))
    })?;

    let driver = SweepDriver::new(EngineFactory::new(&out.db_dir), workload, &out.log_dir)
        .with_stop(stop.clone());
    let sweep = driver.run(&configs);

    report::print_banner("ingestbench sweep report", &sweep.environment);
    let bundle = ExportBundle::from_sweep(&sweep);
    report::print_run_table(&bundle.runs);
    for row in &bundle.runs {
        report::print_type_breakdown(row);
    }
    report::print_speedup_table(&bundle.speedups);

    if sweep.failed() > 0 {
        println!(
            "\n  {} {} of {} runs failed",
            "WARN".yellow(),
            sweep.failed(),
            sweep.outcomes.len()
        );
    }

    if let Some(dir) = &out.export {
        report::export_all(&bundle, dir)?;
    }
    Ok(())
}

fn summarize(log_dir: &Path, export: Option<&Path>) -> BenchResult<()> {
    let (runs, speedups) = report::summarize_dir(log_dir)?;
    let bundle = ExportBundle {
        environment: EnvironmentInfo::collect(),
        runs,
        speedups,
    };

    report::print_banner("ingestbench log summary", &bundle.environment);
    report::print_run_table(&bundle.runs);
    for row in &bundle.runs {
        report::print_type_breakdown(row);
    }
    report::print_speedup_table(&bundle.speedups);

    if let Some(dir) = export {
        report::export_all(&bundle, dir)?;
    }
    Ok(())
}
