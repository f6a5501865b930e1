//! Instrumented executor.
//!
//! Drives one unit at a time through a backend, bracketing it with wall
//! clock, process CPU times and resource snapshots, and appends exactly one
//! record per non-empty unit to the run's log:
//!
//! ```text
//! Idle → PreSample → Executing → PostSample → Logged → Idle ... → Terminated
//! ```
//!
//! A failing unit becomes an ERROR record and the loop moves on. Only a
//! source error, a log write error or a stop request ends the run early.

use crate::adapters::Backend;
use crate::sources::{stop_requested, StopFlag, UnitSource};
use crate::{BenchError, BenchResult, UnitPayload, WorkUnit};
use ingestbench_harness::{
    logical_core_count, normalized_cpu_percent, process_cpu_times, CpuTimes, ExecutionRecord,
    JsonlLogger, ResourceDelta, ResourceSampler, ResourceSnapshot, RoundingPolicy, UnitKind,
    UnitObservation, SENTINEL,
};
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Idle,
    PreSample,
    Executing,
    PostSample,
    Logged,
    Terminated,
}

/// Running totals of one run. `count` and `elapsed` cover successful units.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunTotals {
    pub count: u64,
    pub elapsed: f64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl RunTotals {
    pub fn logged(&self) -> u64 {
        self.succeeded + self.failed
    }
}

/// What happened to one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStatus {
    Skipped,
    Succeeded,
    Failed,
}

struct PreSample {
    wall: Instant,
    cpu: Option<CpuTimes>,
    snapshot: ResourceSnapshot,
}

pub struct Executor {
    sampler: ResourceSampler,
    logger: JsonlLogger,
    policy: RoundingPolicy,
    cores: usize,
    state: ExecutorState,
    totals: RunTotals,
    stop: Option<StopFlag>,
}

impl Executor {
    pub fn new(logger: JsonlLogger) -> Self {
        Self::with_parts(ResourceSampler::new(), logger, RoundingPolicy::default())
    }

    pub fn with_parts(sampler: ResourceSampler, logger: JsonlLogger, policy: RoundingPolicy) -> Self {
        Self {
            sampler,
            logger,
            policy,
            cores: logical_core_count(),
            state: ExecutorState::Idle,
            totals: RunTotals::default(),
            stop: None,
        }
    }

    /// `drain` returns cleanly before the next unit once the flag is set.
    pub fn with_stop(mut self, stop: Option<StopFlag>) -> Self {
        self.stop = stop;
        self
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    pub fn totals(&self) -> &RunTotals {
        &self.totals
    }

    pub fn logger(&self) -> &JsonlLogger {
        &self.logger
    }

    fn transition(&mut self, next: ExecutorState) {
        trace!(from = ?self.state, to = ?next, "executor transition");
        self.state = next;
    }

    /// Execute and log one unit. Returns `Err` only when the record could
    /// not be written; the executor is then terminated.
    pub fn execute(&mut self, backend: &mut dyn Backend, unit: &WorkUnit) -> BenchResult<UnitStatus> {
        if self.state == ExecutorState::Terminated {
            return Err(BenchError::Config("executor already terminated".into()));
        }
        if unit.is_empty() {
            debug!(unit = unit.index, tag = %unit.tag, "empty unit skipped");
            self.totals.skipped += 1;
            return Ok(UnitStatus::Skipped);
        }

        self.transition(ExecutorState::PreSample);
        let pre = self.pre_sample();

        self.transition(ExecutorState::Executing);
        let result = backend.execute_unit(unit);

        self.transition(ExecutorState::PostSample);
        let raw_elapsed = pre.wall.elapsed().as_secs_f64();
        let post_cpu = process_cpu_times();
        let post_snapshot = self.sampler.sample();
        if post_snapshot.is_degraded() {
            warn!(
                unit = unit.index,
                error = post_snapshot.error.as_deref().unwrap_or(""),
                "resource sampling degraded"
            );
        }

        let elapsed = self.policy.elapsed(raw_elapsed);
        let cpu_percent = match (pre.cpu, post_cpu) {
            (Some(before), Ok(after)) => {
                let (user, system) = before.diff(&after);
                self.policy
                    .cpu(normalized_cpu_percent(user, system, raw_elapsed, self.cores))
            }
            (_, Err(e)) => {
                debug!(error = %e, "cpu probe failed");
                SENTINEL
            }
            (None, _) => SENTINEL,
        };
        let observation = UnitObservation {
            unit_index: unit.index,
            unit_type: unit.tag.clone(),
            time_taken_seconds: elapsed,
            cpu_percent,
            resource_delta: ResourceDelta::between(&pre.snapshot, &post_snapshot),
            system_metrics: post_snapshot,
        };

        let (record, status) = match result {
            Ok(outcome) => {
                let rate = self.policy.rate(outcome.count, elapsed);
                self.totals.count += outcome.count;
                self.totals.elapsed += elapsed;
                self.totals.succeeded += 1;
                info!(
                    unit = unit.index,
                    tag = %unit.tag,
                    count = outcome.count,
                    elapsed_s = elapsed,
                    rate,
                    cpu = cpu_percent,
                    "unit completed"
                );
                let record = match (outcome.kind, &unit.payload) {
                    (UnitKind::Query, UnitPayload::Query(sql)) => {
                        ExecutionRecord::query_success(observation, sql.clone(), outcome.count, rate)
                            .with_profile(backend.take_profile())
                    }
                    _ => ExecutionRecord::ingest_success(
                        observation,
                        outcome.count,
                        rate,
                        self.totals.count,
                        self.policy.elapsed(self.totals.elapsed),
                    ),
                };
                (record, UnitStatus::Succeeded)
            }
            Err(e) => {
                self.totals.failed += 1;
                warn!(unit = unit.index, tag = %unit.tag, error = %e, "unit failed");
                let record = ExecutionRecord::failure(
                    observation,
                    e.to_string(),
                    unit.rows_attempted(),
                    unit.sql().map(str::to_string),
                );
                (record, UnitStatus::Failed)
            }
        };

        if let Err(e) = self.logger.append(&record) {
            error!(path = %self.logger.path().display(), error = %e, "log write failed");
            self.transition(ExecutorState::Terminated);
            return Err(e.into());
        }
        self.transition(ExecutorState::Logged);
        self.transition(ExecutorState::Idle);
        Ok(status)
    }

    fn pre_sample(&mut self) -> PreSample {
        let snapshot = self.sampler.sample();
        let cpu = match process_cpu_times() {
            Ok(t) => Some(t),
            Err(e) => {
                debug!(error = %e, "cpu probe failed");
                None
            }
        };
        PreSample {
            wall: Instant::now(),
            cpu,
            snapshot,
        }
    }

    /// Run every unit of `source` and terminate. A source error aborts with
    /// [`BenchError::Source`], a log failure with [`BenchError::Log`].
    pub fn drain(&mut self, backend: &mut dyn Backend, source: &mut dyn UnitSource) -> BenchResult<RunTotals> {
        let result = self.drain_inner(backend, source);
        self.transition(ExecutorState::Terminated);
        result.map(|_| self.totals.clone())
    }

    fn drain_inner(&mut self, backend: &mut dyn Backend, source: &mut dyn UnitSource) -> BenchResult<()> {
        loop {
            if stop_requested(&self.stop) {
                info!(logged = self.totals.logged(), "stop requested, ending run");
                return Ok(());
            }
            let unit = match source.next_unit() {
                Ok(Some(unit)) => unit,
                Ok(None) => return Ok(()),
                Err(e) => {
                    error!(error = %e, "source failed, aborting run");
                    return Err(match e {
                        BenchError::Source(msg) => BenchError::Source(msg),
                        other => BenchError::Source(other.to_string()),
                    });
                }
            };
            self.execute(backend, &unit)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TableSchema;
    use crate::{BackendKind, Row};
    use ingestbench_harness::read_records;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Backend that fails on the listed unit sizes.
    struct FakeBackend {
        fail_len: Option<usize>,
        inserted: u64,
        profiled: bool,
    }

    impl Backend for FakeBackend {
        fn name(&self) -> &str {
            "fake"
        }
        fn kind(&self) -> BackendKind {
            BackendKind::Sqlite
        }
        fn prepare_table(&mut self, _schema: &TableSchema) -> BenchResult<()> {
            Ok(())
        }
        fn table_exists(&mut self, _table: &str) -> BenchResult<bool> {
            Ok(true)
        }
        fn create_indexes(&mut self, _table: &str, _columns: &[String]) -> BenchResult<()> {
            Ok(())
        }
        fn close(self: Box<Self>) -> BenchResult<()> {
            Ok(())
        }
        fn insert_rows(&mut self, rows: &[Row]) -> BenchResult<u64> {
            if Some(rows.len()) == self.fail_len {
                return Err(BenchError::Execution("constraint violated".into()));
            }
            self.inserted += rows.len() as u64;
            Ok(rows.len() as u64)
        }
        fn run_query(&mut self, sql: &str) -> BenchResult<u64> {
            if sql.contains("missing") {
                return Err(BenchError::Execution("no such table: missing".into()));
            }
            Ok(3)
        }
        fn take_profile(&mut self) -> Option<serde_json::Value> {
            self.profiled.then(|| serde_json::json!({"name": "PROJECTION"}))
        }
        fn db_size_bytes(&self) -> BenchResult<u64> {
            Ok(0)
        }
    }

    struct VecSource(VecDeque<BenchResult<WorkUnit>>);

    impl UnitSource for VecSource {
        fn next_unit(&mut self) -> BenchResult<Option<WorkUnit>> {
            self.0.pop_front().transpose()
        }
    }

    fn rows(n: usize) -> Vec<Row> {
        (0..n).map(|i| vec![i.to_string()]).collect()
    }

    fn executor(dir: &TempDir) -> Executor {
        Executor::new(JsonlLogger::open(dir.path().join("run.jsonl")).unwrap())
    }

    #[test]
    fn test_records_and_totals() {
        let dir = TempDir::new().unwrap();
        let mut exec = executor(&dir);
        let mut backend = FakeBackend { fail_len: Some(7), inserted: 0, profiled: false };
        let mut source = VecSource(
            vec![
                Ok(WorkUnit::rows(1, "ingest_chunk", rows(10))),
                Ok(WorkUnit::rows(2, "ingest_chunk", rows(7))),
                Ok(WorkUnit::rows(3, "ingest_chunk", rows(0))),
                Ok(WorkUnit::rows(4, "ingest_chunk", rows(5))),
            ]
            .into(),
        );
        let totals = exec.drain(&mut backend, &mut source).unwrap();
        assert_eq!(exec.state(), ExecutorState::Terminated);
        assert_eq!(totals.count, 15);
        assert_eq!(totals.succeeded, 2);
        assert_eq!(totals.failed, 1);
        assert_eq!(totals.skipped, 1);

        let log = read_records(dir.path().join("run.jsonl")).unwrap();
        let indices: Vec<u64> = log.records.iter().map(|r| r.unit_index).collect();
        assert_eq!(indices, vec![1, 2, 4]);

        let failed = &log.records[1];
        assert!(!failed.is_success());
        assert_eq!(failed.rows_attempted, Some(7));
        assert!(failed.error.as_deref().unwrap().contains("constraint violated"));

        let last = &log.records[2];
        assert_eq!(last.total_rows_ingested_so_far, Some(15));
        for r in log.records.iter().filter(|r| r.is_success()) {
            assert!(r.time_taken_seconds >= ingestbench_harness::EPSILON);
            let expected = RoundingPolicy::default().rate(r.count(), r.time_taken_seconds);
            assert_eq!(r.rate(), expected);
            assert!(r.cpu_percent == SENTINEL || (0.0..=100.0).contains(&r.cpu_percent));
        }
    }

    #[test]
    fn test_query_records() {
        let dir = TempDir::new().unwrap();
        let mut exec = executor(&dir);
        let mut backend = FakeBackend { fail_len: None, inserted: 0, profiled: false };
        exec.execute(&mut backend, &WorkUnit::query(1, "point_lookup", "SELECT 1")).unwrap();
        let status = exec
            .execute(&mut backend, &WorkUnit::query(2, "point_lookup", "SELECT * FROM missing"))
            .unwrap();
        assert_eq!(status, UnitStatus::Failed);
        assert_eq!(exec.state(), ExecutorState::Idle);

        let log = read_records(dir.path().join("run.jsonl")).unwrap();
        assert_eq!(log.records[0].row_count, Some(3));
        assert_eq!(log.records[0].query.as_deref(), Some("SELECT 1"));
        assert_eq!(log.records[0].kind(), UnitKind::Query);
        assert_eq!(log.records[1].rows_attempted, Some(0));
        assert_eq!(log.records[1].query.as_deref(), Some("SELECT * FROM missing"));
        assert_eq!(log.records[1].unit_type, "point_lookup");
    }

    #[test]
    fn test_source_error_aborts() {
        let dir = TempDir::new().unwrap();
        let mut exec = executor(&dir);
        let mut backend = FakeBackend { fail_len: None, inserted: 0, profiled: false };
        let mut source = VecSource(
            vec![
                Ok(WorkUnit::rows(1, "ingest_chunk", rows(4))),
                Err(BenchError::Io(std::io::Error::other("disk gone"))),
                Ok(WorkUnit::rows(2, "ingest_chunk", rows(4))),
            ]
            .into(),
        );
        let err = exec.drain(&mut backend, &mut source).unwrap_err();
        assert!(matches!(err, BenchError::Source(_)));
        assert_eq!(backend.inserted, 4);
        assert_eq!(exec.state(), ExecutorState::Terminated);
        assert!(exec.execute(&mut backend, &WorkUnit::rows(3, "x", rows(1))).is_err());
    }

    #[test]
    fn test_profile_attached_to_query_records_only() {
        let dir = TempDir::new().unwrap();
        let mut exec = executor(&dir);
        let mut backend = FakeBackend { fail_len: None, inserted: 0, profiled: true };
        exec.execute(&mut backend, &WorkUnit::query(1, "point_lookup", "SELECT 1")).unwrap();
        exec.execute(&mut backend, &WorkUnit::rows(2, "ingest_chunk", rows(3))).unwrap();

        let log = read_records(dir.path().join("run.jsonl")).unwrap();
        assert_eq!(log.records[0].profile.as_ref().unwrap()["name"], "PROJECTION");
        assert!(log.records[1].profile.is_none());
    }

    #[test]
    fn test_stop_flag_ends_drain_between_units() {
        let dir = TempDir::new().unwrap();
        let stop: StopFlag = Arc::new(AtomicBool::new(false));
        let mut exec = executor(&dir).with_stop(Some(stop.clone()));
        let mut backend = FakeBackend { fail_len: None, inserted: 0, profiled: false };
        exec.execute(&mut backend, &WorkUnit::rows(1, "ingest_chunk", rows(2))).unwrap();
        stop.store(true, Ordering::Relaxed);

        let mut source = VecSource(vec![Ok(WorkUnit::rows(2, "ingest_chunk", rows(2)))].into());
        let totals = exec.drain(&mut backend, &mut source).unwrap();
        assert_eq!(totals.succeeded, 1);
        assert_eq!(backend.inserted, 2);
        assert_eq!(exec.state(), ExecutorState::Terminated);
    }
}
