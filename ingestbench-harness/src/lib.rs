// Copyright 2025 ToonDB Authors
//
// Licensed under the Apache License, Version 2.0

//! Measurement primitives for ingestion and query benchmarks.
//!
//! This crate provides:
//! - Host resource snapshots (CPU, memory, disk I/O) and per-unit deltas
//! - Process CPU accounting normalized by core count
//! - The per-unit `ExecutionRecord` and its append-only JSON-lines log
//! - Run summaries with HDRHistogram latency percentiles and speedup tables
//!
//! Nothing here knows about a particular database engine.

pub mod cgroup;
pub mod cpu;
pub mod diskstats;
pub mod environment;
pub mod logger;
pub mod record;
pub mod sampler;
pub mod summary;

use thiserror::Error;

pub use cpu::{logical_core_count, normalized_cpu_percent, process_cpu_times, CpuTimes};
pub use diskstats::DiskIoCounters;
pub use environment::EnvironmentInfo;
pub use logger::{read_records, JsonlLogger, LogContents, LogError};
pub use record::{
    round_to, ExecutionRecord, RecordStatus, RoundingPolicy, UnitKind, UnitObservation, EPSILON,
};
pub use sampler::{MemorySource, ResourceDelta, ResourceSampler, ResourceSnapshot, SENTINEL};
pub use summary::{
    average_rate, speedup_table, summarize_log, LatencySummary, RunRate, RunSummary, SpeedupRow,
    TypeSummary,
};

/// A resource probe that could not produce a value.
#[derive(Debug, Error)]
pub enum SamplingError {
    #[error("cpu times: {0}")]
    CpuTimes(String),
    #[error("disk counters: {0}")]
    DiskCounters(String),
    #[error("{0} not supported on this platform")]
    Unsupported(&'static str),
}
