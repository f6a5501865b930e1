// Copyright 2025 ToonDB Authors
//
// Licensed under the Apache License, Version 2.0

//! Folding logs into run summaries and thread-scaling tables.

use crate::logger::{read_records, LogError};
use crate::record::{ExecutionRecord, EPSILON};
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Longest unit latency the histogram tracks exactly, in microseconds (24 h).
const MAX_TRACKED_MICROS: u64 = 86_400 * 1_000_000;

/// Per-unit latency percentiles, in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub count: u64,
    pub mean_secs: f64,
    pub p50_secs: f64,
    pub p95_secs: f64,
    pub p99_secs: f64,
    pub max_secs: f64,
}

impl LatencySummary {
    pub fn from_secs(samples: impl IntoIterator<Item = f64>) -> Self {
        let Ok(mut hist) = Histogram::<u64>::new_with_bounds(1, MAX_TRACKED_MICROS, 3) else {
            return Self::default();
        };
        for secs in samples {
            if !secs.is_finite() || secs < 0.0 {
                continue;
            }
            let micros = ((secs * 1e6).round() as u64).clamp(1, MAX_TRACKED_MICROS);
            let _ = hist.record(micros);
        }
        if hist.is_empty() {
            return Self::default();
        }
        let secs = |micros: u64| micros as f64 / 1e6;
        Self {
            count: hist.len(),
            mean_secs: hist.mean() / 1e6,
            p50_secs: secs(hist.value_at_quantile(0.50)),
            p95_secs: secs(hist.value_at_quantile(0.95)),
            p99_secs: secs(hist.value_at_quantile(0.99)),
            max_secs: secs(hist.max()),
        }
    }
}

/// Totals for one unit tag within a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeSummary {
    pub units: u64,
    pub failures: u64,
    pub total_count: u64,
    pub total_elapsed: f64,
    pub mean_elapsed: f64,
}

/// Aggregate view of one run's records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Rows ingested or returned by successful units.
    pub total_count: u64,
    /// Seconds spent in successful units.
    pub total_elapsed: f64,
    pub average_rate: f64,
    pub units_total: u64,
    pub units_succeeded: u64,
    pub units_failed: u64,
    /// Mean over successful units, excluding sentinel values.
    pub mean_cpu_percent: f64,
    pub latency: LatencySummary,
    pub by_type: BTreeMap<String, TypeSummary>,
    #[serde(default)]
    pub malformed_lines: usize,
}

impl RunSummary {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ExecutionRecord>) -> Self {
        let mut s = RunSummary::default();
        let mut cpu_sum = 0.0;
        let mut cpu_n = 0u64;
        let mut latencies = Vec::new();

        for r in records {
            s.units_total += 1;
            let entry = s.by_type.entry(r.unit_type.clone()).or_default();
            entry.units += 1;

            if !r.is_success() {
                s.units_failed += 1;
                entry.failures += 1;
                continue;
            }

            s.units_succeeded += 1;
            s.total_count += r.count();
            s.total_elapsed += r.time_taken_seconds;
            entry.total_count += r.count();
            entry.total_elapsed += r.time_taken_seconds;
            latencies.push(r.time_taken_seconds);
            if r.cpu_percent >= 0.0 {
                cpu_sum += r.cpu_percent;
                cpu_n += 1;
            }
        }

        for t in s.by_type.values_mut() {
            let ok = t.units - t.failures;
            if ok > 0 {
                t.mean_elapsed = t.total_elapsed / ok as f64;
            }
        }
        s.average_rate = average_rate(s.total_count, s.total_elapsed);
        if cpu_n > 0 {
            s.mean_cpu_percent = cpu_sum / cpu_n as f64;
        }
        s.latency = LatencySummary::from_secs(latencies);
        s
    }
}

/// `count / max(elapsed, EPSILON)`; `0` when nothing was counted.
pub fn average_rate(total_count: u64, total_elapsed: f64) -> f64 {
    if total_count == 0 {
        return 0.0;
    }
    let elapsed = if total_elapsed.is_finite() {
        total_elapsed.max(EPSILON)
    } else {
        EPSILON
    };
    total_count as f64 / elapsed
}

/// Summarize every record in a log file.
pub fn summarize_log(path: impl AsRef<Path>) -> Result<RunSummary, LogError> {
    let contents = read_records(path)?;
    let mut summary = RunSummary::from_records(&contents.records);
    summary.malformed_lines = contents.skipped_lines;
    Ok(summary)
}

/// One run's position in the configuration space and its rate. `workload`
/// is the log prefix (`ingest`, `stream`, `query`); empty when unprefixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRate {
    pub workload: String,
    pub backend: String,
    pub memory_limit: String,
    pub threads: usize,
    pub average_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedupRow {
    pub workload: String,
    pub backend: String,
    pub memory_limit: String,
    pub threads: usize,
    pub average_rate: f64,
    pub speedup: f64,
}

/// Speedup of each run relative to the single-thread run of the same
/// workload, backend and memory limit (or the fewest-thread run when no
/// single-thread run exists). The baseline row is exactly `1.0`; rows whose baseline rate
/// is zero report `0.0`.
pub fn speedup_table(runs: &[RunRate]) -> Vec<SpeedupRow> {
    let mut groups: BTreeMap<(String, String, String), Vec<&RunRate>> = BTreeMap::new();
    for r in runs {
        groups
            .entry((
                r.workload.clone(),
                r.backend.clone(),
                r.memory_limit.to_ascii_lowercase(),
            ))
            .or_default()
            .push(r);
    }

    let mut rows = Vec::with_capacity(runs.len());
    for (_, mut group) in groups {
        group.sort_by_key(|r| r.threads);
        let baseline_threads = group.iter().map(|r| r.threads).min().unwrap_or(1);
        let baseline_rate = group
            .iter()
            .find(|r| r.threads == baseline_threads)
            .map(|r| r.average_rate)
            .unwrap_or(0.0);

        for r in group {
            let speedup = if r.threads == baseline_threads {
                1.0
            } else if baseline_rate > 0.0 {
                r.average_rate / baseline_rate
            } else {
                0.0
            };
            rows.push(SpeedupRow {
                workload: r.workload.clone(),
                backend: r.backend.clone(),
                memory_limit: r.memory_limit.clone(),
                threads: r.threads,
                average_rate: r.average_rate,
                speedup,
            });
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::JsonlLogger;
    use crate::record::UnitObservation;
    use crate::sampler::{ResourceDelta, ResourceSnapshot};
    use tempfile::TempDir;

    fn obs(index: u64, tag: &str, elapsed: f64, cpu: f64) -> UnitObservation {
        UnitObservation {
            unit_index: index,
            unit_type: tag.to_string(),
            time_taken_seconds: elapsed,
            cpu_percent: cpu,
            system_metrics: ResourceSnapshot::unavailable("test"),
            resource_delta: ResourceDelta::unavailable(),
        }
    }

    fn ok(index: u64, rows: u64, elapsed: f64) -> ExecutionRecord {
        ExecutionRecord::ingest_success(obs(index, "ingest_chunk", elapsed, 20.0), rows, 0.0, 0, 0.0)
    }

    fn rate(workload: &str, backend: &str, threads: usize, average_rate: f64) -> RunRate {
        RunRate {
            workload: workload.into(),
            backend: backend.into(),
            memory_limit: "256MB".into(),
            threads,
            average_rate,
        }
    }

    fn failed(index: u64, rows: u64) -> ExecutionRecord {
        ExecutionRecord::failure(obs(index, "ingest_chunk", 0.01, 5.0), "x".into(), rows, None)
    }

    #[test]
    fn test_summary_totals() {
        let records = vec![ok(1, 10_000, 1.0), ok(2, 10_000, 1.0), failed(3, 10_000), ok(4, 5_000, 0.5)];
        let s = RunSummary::from_records(&records);
        assert_eq!(s.total_count, 25_000);
        assert!((s.total_elapsed - 2.5).abs() < 1e-12);
        assert!((s.average_rate - 10_000.0).abs() < 1e-9);
        assert_eq!(s.units_total, 4);
        assert_eq!(s.units_succeeded, 3);
        assert_eq!(s.units_failed, 1);
        assert_eq!(s.by_type["ingest_chunk"].failures, 1);
        assert!((s.mean_cpu_percent - 20.0).abs() < 1e-9);
        assert_eq!(s.latency.count, 3);
    }

    #[test]
    fn test_no_success_gives_zero_rate() {
        let s = RunSummary::from_records(&[failed(1, 10), failed(2, 10)]);
        assert_eq!(s.total_elapsed, 0.0);
        assert_eq!(s.average_rate, 0.0);
        assert!(!s.average_rate.is_nan());

        let empty = RunSummary::from_records(&[]);
        assert_eq!(empty.average_rate, 0.0);
        assert_eq!(empty.latency, LatencySummary::default());
    }

    #[test]
    fn test_sentinel_cpu_excluded() {
        let r = ExecutionRecord::ingest_success(obs(1, "ingest_chunk", 1.0, -1.0), 1, 1.0, 1, 1.0);
        let s = RunSummary::from_records(&[r, ok(2, 1, 1.0)]);
        assert!((s.mean_cpu_percent - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_latency_percentiles_ordered() {
        let l = LatencySummary::from_secs((1..=100).map(|i| i as f64 * 0.01));
        assert_eq!(l.count, 100);
        assert!(l.p50_secs <= l.p95_secs);
        assert!(l.p95_secs <= l.p99_secs);
        assert!(l.p99_secs <= l.max_secs);
        assert!((l.max_secs - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_summarize_log_accumulates_across_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.jsonl");
        for _ in 0..2 {
            let mut log = JsonlLogger::open(&path).unwrap();
            log.append(&ok(1, 100, 0.5)).unwrap();
            log.append(&ok(2, 100, 0.5)).unwrap();
        }
        let s = summarize_log(&path).unwrap();
        assert_eq!(s.total_count, 400);
        assert!((s.total_elapsed - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_speedup_baseline_exactly_one() {
        let rate = |threads, average_rate| RunRate {
            workload: "ingest".into(),
            backend: "duckdb".into(),
            memory_limit: "1GB".into(),
            threads,
            average_rate,
        };
        let rows = speedup_table(&[rate(4, 3000.0), rate(1, 1000.0), rate(2, 1800.0)]);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].threads, 1);
        assert_eq!(rows[0].speedup, 1.0);
        assert!((rows[1].speedup - 1.8).abs() < 1e-12);
        assert!((rows[2].speedup - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_speedup_groups_and_zero_baseline() {
        let runs = vec![
            rate("ingest", "sqlite", 1, 0.0),
            rate("ingest", "sqlite", 2, 50.0),
            rate("ingest", "duckdb", 2, 70.0),
        ];
        let rows = speedup_table(&runs);
        let duck: Vec<_> = rows.iter().filter(|r| r.backend == "duckdb").collect();
        assert_eq!(duck.len(), 1);
        assert_eq!(duck[0].speedup, 1.0);
        let sqlite2 = rows.iter().find(|r| r.backend == "sqlite" && r.threads == 2).unwrap();
        assert_eq!(sqlite2.speedup, 0.0);
    }

    #[test]
    fn test_speedup_keeps_workloads_apart() {
        let runs = vec![
            rate("query", "duckdb", 1, 10.0),
            rate("stream", "duckdb", 1, 1000.0),
            rate("stream", "duckdb", 2, 2000.0),
        ];
        let rows = speedup_table(&runs);
        assert_eq!(rows.len(), 3);
        let query = rows.iter().find(|r| r.workload == "query").unwrap();
        assert_eq!(query.speedup, 1.0);
        let stream2 = rows
            .iter()
            .find(|r| r.workload == "stream" && r.threads == 2)
            .unwrap();
        assert!((stream2.speedup - 2.0).abs() < 1e-12);
    }
}
