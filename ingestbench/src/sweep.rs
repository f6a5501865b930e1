//! Sweep driver: runs a workload once per configuration, strictly in order.
//!
//! A failed run (log, connection, schema, source or log-write failure) is
//! recorded in its [`RunOutcome`] and the sweep moves on to the next
//! configuration.

use crate::adapters::BackendFactory;
use crate::executor::{Executor, RunTotals};
use crate::sources::{stop_requested, StopFlag, WorkloadSpec};
use crate::{BenchResult, RunConfig};
use ingestbench_harness::{
    speedup_table, summarize_log, EnvironmentInfo, JsonlLogger, RunRate, RunSummary, SpeedupRow,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

/// Result of one configuration.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// Log prefix the run was written under.
    pub workload: String,
    pub config: RunConfig,
    pub canonical_name: String,
    pub log_path: PathBuf,
    pub wall_secs: f64,
    /// Totals of this invocation only; `None` if the run never started.
    #[serde(skip)]
    pub totals: Option<RunTotals>,
    /// Folded from the whole log file, including earlier invocations.
    pub summary: Option<RunSummary>,
    pub db_size_bytes: Option<u64>,
    pub error: Option<String>,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn average_rate(&self) -> f64 {
        self.summary.as_ref().map(|s| s.average_rate).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub environment: EnvironmentInfo,
    pub outcomes: Vec<RunOutcome>,
}

impl SweepReport {
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.succeeded()).count()
    }

    /// Speedup rows for every run that produced a summary.
    pub fn speedups(&self) -> Vec<SpeedupRow> {
        let rates: Vec<RunRate> = self
            .outcomes
            .iter()
            .filter(|o| o.summary.is_some())
            .map(|o| RunRate {
                workload: o.workload.clone(),
                backend: o.config.backend.to_string(),
                memory_limit: o.config.memory_limit.to_string(),
                threads: o.config.threads,
                average_rate: o.average_rate(),
            })
            .collect();
        speedup_table(&rates)
    }
}

pub struct SweepDriver<F: BackendFactory> {
    factory: F,
    workload: WorkloadSpec,
    log_dir: PathBuf,
    prefix: String,
    stop: Option<StopFlag>,
}

impl<F: BackendFactory> SweepDriver<F> {
    /// Logs go to `{log_dir}/{workload}_{canonical}.jsonl`.
    pub fn new(factory: F, workload: WorkloadSpec, log_dir: impl Into<PathBuf>) -> Self {
        let prefix = workload.name().to_string();
        Self {
            factory,
            workload,
            log_dir: log_dir.into(),
            prefix,
            stop: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Once the flag is set no further configuration is started.
    pub fn with_stop(mut self, stop: StopFlag) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn run(&self, configs: &[RunConfig]) -> SweepReport {
        let environment = EnvironmentInfo::collect();
        info!(
            env = %environment.fingerprint(),
            runs = configs.len(),
            workload = self.workload.name(),
            "sweep starting"
        );
        for w in &environment.warnings {
            warn!("{}", w);
        }

        let mut outcomes = Vec::with_capacity(configs.len());
        for (i, config) in configs.iter().enumerate() {
            if stop_requested(&self.stop) {
                warn!(skipped = configs.len() - i, "stop requested, skipping remaining runs");
                break;
            }
            info!(run = i + 1, of = configs.len(), config = %config.canonical_name(), "run starting");
            outcomes.push(self.run_one(config));
        }

        let report = SweepReport {
            environment,
            outcomes,
        };
        info!(runs = configs.len(), failed = report.failed(), "sweep finished");
        report
    }

    pub fn run_one(&self, config: &RunConfig) -> RunOutcome {
        let log_path = config.log_path(&self.log_dir, &self.prefix);
        let started = Instant::now();
        let mut outcome = RunOutcome {
            workload: self.prefix.clone(),
            config: config.clone(),
            canonical_name: config.canonical_name(),
            log_path: log_path.clone(),
            wall_secs: 0.0,
            totals: None,
            summary: None,
            db_size_bytes: None,
            error: None,
        };

        match self.execute_run(config, &log_path) {
            Ok((totals, size)) => {
                info!(
                    config = %outcome.canonical_name,
                    count = totals.count,
                    succeeded = totals.succeeded,
                    failed = totals.failed,
                    "run finished"
                );
                outcome.totals = Some(totals);
                outcome.db_size_bytes = size;
            }
            Err(e) => {
                error!(config = %outcome.canonical_name, error = %e, "run aborted");
                outcome.error = Some(e.to_string());
            }
        }
        outcome.wall_secs = started.elapsed().as_secs_f64();

        if log_path.exists() {
            match summarize_log(&log_path) {
                Ok(summary) => outcome.summary = Some(summary),
                Err(e) => warn!(path = %log_path.display(), error = %e, "cannot summarize log"),
            }
        }
        outcome
    }

    fn execute_run(&self, config: &RunConfig, log_path: &Path) -> BenchResult<(RunTotals, Option<u64>)> {
        config.validate()?;
        let logger = JsonlLogger::open(log_path)?;
        let mut backend = self.factory.connect(config)?;

        let result = self
            .workload
            .open(backend.as_mut(), config)
            .and_then(|mut source| {
                let mut executor = Executor::new(logger).with_stop(self.stop.clone());
                executor.drain(backend.as_mut(), source.as_mut())
            });

        let size = backend.db_size_bytes().ok();
        if let Err(e) = backend.close() {
            warn!(config = %config.canonical_name(), error = %e, "close failed");
        }
        result.map(|totals| (totals, size))
    }
}
