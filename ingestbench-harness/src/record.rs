// Copyright 2025 ToonDB Authors
//
// Licensed under the Apache License, Version 2.0

//! The per-unit log record and the rounding applied before it is written.

use crate::sampler::{ResourceDelta, ResourceSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Floor for logged elapsed time, in seconds.
pub const EPSILON: f64 = 1e-4;

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordStatus {
    Success,
    Error,
}

/// Which family of result fields a record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Ingest,
    Query,
}

/// Decimal places used for the logged numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundingPolicy {
    pub elapsed_decimals: u32,
    pub rate_decimals: u32,
    pub cpu_decimals: u32,
}

impl Default for RoundingPolicy {
    fn default() -> Self {
        Self {
            elapsed_decimals: 4,
            rate_decimals: 2,
            cpu_decimals: 2,
        }
    }
}

impl RoundingPolicy {
    /// Elapsed seconds as logged: floored to [`EPSILON`], rounded, floored again.
    pub fn elapsed(&self, raw_secs: f64) -> f64 {
        let floored = if raw_secs.is_nan() {
            EPSILON
        } else {
            raw_secs.max(EPSILON)
        };
        round_to(floored, self.elapsed_decimals).max(EPSILON)
    }

    /// Rate derived from the already-rounded elapsed so it can be recomputed
    /// from the log.
    pub fn rate(&self, count: u64, logged_elapsed: f64) -> f64 {
        round_to(count as f64 / logged_elapsed.max(EPSILON), self.rate_decimals)
    }

    pub fn cpu(&self, raw_percent: f64) -> f64 {
        round_to(raw_percent, self.cpu_decimals)
    }
}

/// Measurements shared by every record shape.
#[derive(Debug, Clone)]
pub struct UnitObservation {
    pub unit_index: u64,
    pub unit_type: String,
    pub time_taken_seconds: f64,
    pub cpu_percent: f64,
    pub system_metrics: ResourceSnapshot,
    pub resource_delta: ResourceDelta,
}

/// One JSON object per executed unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub timestamp: DateTime<Utc>,
    pub unit_index: u64,
    pub unit_type: String,
    pub status: RecordStatus,
    pub time_taken_seconds: f64,
    pub cpu_percent: f64,
    pub system_metrics: ResourceSnapshot,
    pub resource_delta: ResourceDelta,

    // ingestion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_ingested: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingestion_rate_rows_per_sec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_rows_ingested_so_far: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_time_taken_so_far: Option<f64>,

    // query
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_per_sec: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Engine query profile (DuckDB JSON profiling output), when enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<serde_json::Value>,

    // failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_attempted: Option<u64>,
}

impl ExecutionRecord {
    fn base(obs: UnitObservation, status: RecordStatus) -> Self {
        Self {
            timestamp: Utc::now(),
            unit_index: obs.unit_index,
            unit_type: obs.unit_type,
            status,
            time_taken_seconds: obs.time_taken_seconds,
            cpu_percent: obs.cpu_percent,
            system_metrics: obs.system_metrics,
            resource_delta: obs.resource_delta,
            rows_ingested: None,
            ingestion_rate_rows_per_sec: None,
            total_rows_ingested_so_far: None,
            total_time_taken_so_far: None,
            row_count: None,
            rows_per_sec: None,
            query: None,
            profile: None,
            error: None,
            rows_attempted: None,
        }
    }

    pub fn ingest_success(
        obs: UnitObservation,
        rows: u64,
        rate: f64,
        total_rows_so_far: u64,
        total_time_so_far: f64,
    ) -> Self {
        Self {
            rows_ingested: Some(rows),
            ingestion_rate_rows_per_sec: Some(rate),
            total_rows_ingested_so_far: Some(total_rows_so_far),
            total_time_taken_so_far: Some(total_time_so_far),
            ..Self::base(obs, RecordStatus::Success)
        }
    }

    pub fn query_success(obs: UnitObservation, sql: String, row_count: u64, rate: f64) -> Self {
        Self {
            row_count: Some(row_count),
            rows_per_sec: Some(rate),
            query: Some(sql),
            ..Self::base(obs, RecordStatus::Success)
        }
    }

    pub fn with_profile(mut self, profile: Option<serde_json::Value>) -> Self {
        self.profile = profile;
        self
    }

    pub fn failure(
        obs: UnitObservation,
        error: String,
        rows_attempted: u64,
        query: Option<String>,
    ) -> Self {
        Self {
            error: Some(error),
            rows_attempted: Some(rows_attempted),
            query,
            ..Self::base(obs, RecordStatus::Error)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RecordStatus::Success
    }

    pub fn kind(&self) -> UnitKind {
        if self.row_count.is_some() || self.query.is_some() {
            UnitKind::Query
        } else {
            UnitKind::Ingest
        }
    }

    /// Rows ingested or returned; `0` for failures.
    pub fn count(&self) -> u64 {
        if !self.is_success() {
            return 0;
        }
        self.rows_ingested.or(self.row_count).unwrap_or(0)
    }

    /// Logged rate; `0` for failures.
    pub fn rate(&self) -> f64 {
        self.ingestion_rate_rows_per_sec
            .or(self.rows_per_sec)
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn obs(index: u64, elapsed: f64) -> UnitObservation {
        UnitObservation {
            unit_index: index,
            unit_type: "ingest_chunk".to_string(),
            time_taken_seconds: elapsed,
            cpu_percent: 12.5,
            system_metrics: ResourceSnapshot::unavailable("test"),
            resource_delta: ResourceDelta::unavailable(),
        }
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.23456, 4), 1.2346);
        assert_eq!(round_to(2.5, 0), 3.0);
        assert_eq!(round_to(-1.0, 2), -1.0);
    }

    #[test]
    fn test_elapsed_floor() {
        let p = RoundingPolicy::default();
        assert_eq!(p.elapsed(0.0), EPSILON);
        assert_eq!(p.elapsed(-3.0), EPSILON);
        assert_eq!(p.elapsed(0.00004), EPSILON);
        assert_eq!(p.elapsed(f64::NAN), EPSILON);
        assert_eq!(p.elapsed(1.23456), 1.2346);
    }

    #[test]
    fn test_rate_uses_logged_elapsed() {
        let p = RoundingPolicy::default();
        let elapsed = p.elapsed(0.333333);
        assert_eq!(elapsed, 0.3333);
        assert_eq!(p.rate(10_000, elapsed), round_to(10_000.0 / 0.3333, 2));
    }

    #[test]
    fn test_ingest_record_shape() {
        let r = ExecutionRecord::ingest_success(obs(1, 0.5), 1000, 2000.0, 1000, 0.5);
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["status"], "SUCCESS");
        assert_eq!(v["unit_index"], 1);
        assert_eq!(v["rows_ingested"], 1000);
        assert!(v.get("error").is_none());
        assert!(v.get("row_count").is_none());
        assert_eq!(r.kind(), UnitKind::Ingest);
        assert_eq!(r.count(), 1000);
    }

    #[test]
    fn test_failure_record_shape() {
        let r = ExecutionRecord::failure(obs(2, 0.1), "boom".into(), 500, None);
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["status"], "ERROR");
        assert_eq!(v["rows_attempted"], 500);
        assert_eq!(v["error"], "boom");
        assert_eq!(r.count(), 0);
        assert_eq!(r.rate(), 0.0);
    }

    #[test]
    fn test_query_record_parses_back() {
        let r = ExecutionRecord::query_success(obs(3, 0.2), "SELECT 1".into(), 1, 5.0);
        let line = serde_json::to_string(&r).unwrap();
        let back: ExecutionRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(back.kind(), UnitKind::Query);
        assert_eq!(back.query.as_deref(), Some("SELECT 1"));
        assert_eq!(back, r);
        assert!(!line.contains("\"profile\""));
    }

    #[test]
    fn test_profile_kept_verbatim() {
        let profile = serde_json::json!({"result": 0.01, "children": [{"name": "SEQ_SCAN"}]});
        let r = ExecutionRecord::query_success(obs(4, 0.2), "SELECT 1".into(), 1, 5.0)
            .with_profile(Some(profile.clone()));
        let back: ExecutionRecord = serde_json::from_str(&serde_json::to_string(&r).unwrap()).unwrap();
        assert_eq!(back.profile, Some(profile));
    }

    proptest! {
        #[test]
        fn prop_logged_elapsed_at_least_epsilon(raw in -10.0f64..10_000.0) {
            let p = RoundingPolicy::default();
            prop_assert!(p.elapsed(raw) >= EPSILON);
        }

        #[test]
        fn prop_rate_reproducible(count in 1u64..10_000_000, raw in 0.0f64..1_000.0) {
            let p = RoundingPolicy::default();
            let elapsed = p.elapsed(raw);
            prop_assert_eq!(p.rate(count, elapsed), round_to(count as f64 / elapsed, 2));
        }
    }
}
