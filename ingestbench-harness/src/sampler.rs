// Copyright 2025 ToonDB Authors
//
// Licensed under the Apache License, Version 2.0

//! Point-in-time host resource snapshots and the per-unit disk I/O delta.

use crate::cgroup::{read_cgroup_memory, CgroupMemory};
use crate::diskstats::{read_disk_counters, DiskIoCounters};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::{trace, warn};

/// Value recorded in a percentage field when the probe failed.
pub const SENTINEL: f64 = -1.0;

/// Where the memory figures of a snapshot come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemorySource {
    Host,
    Cgroup,
}

/// Host resource state at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub timestamp: DateTime<Utc>,
    /// Host-wide CPU utilization since the previous refresh, or `-1`.
    pub cpu_percent: f64,
    /// Used memory as a percentage of the effective limit, or `-1`.
    pub memory_percent: f64,
    pub memory_used_bytes: u64,
    pub memory_available_bytes: u64,
    pub memory_source: MemorySource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_io: Option<DiskIoCounters>,
    /// Probe failures, joined. Absent when every probe succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResourceSnapshot {
    /// A snapshot carrying only sentinels and the given error.
    pub fn unavailable(error: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            cpu_percent: SENTINEL,
            memory_percent: SENTINEL,
            memory_used_bytes: 0,
            memory_available_bytes: 0,
            memory_source: MemorySource::Host,
            disk_io: None,
            error: Some(error.into()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// Disk I/O attributed to one unit of work (`post - pre`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceDelta {
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub read_ops: u64,
    pub write_ops: u64,
    /// `false` when the delta could not be computed; all counters are then zero.
    pub available: bool,
}

impl ResourceDelta {
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Difference between two snapshots.
    ///
    /// Unavailable (all zero) when either side lacks disk counters, the
    /// counter sets have different shapes, or any counter went backwards.
    pub fn between(pre: &ResourceSnapshot, post: &ResourceSnapshot) -> Self {
        match (&pre.disk_io, &post.disk_io) {
            (Some(a), Some(b)) => Self::from_counters(a, b),
            _ => Self::unavailable(),
        }
    }

    pub fn from_counters(pre: &DiskIoCounters, post: &DiskIoCounters) -> Self {
        let ops = match (pre.read_ops, pre.write_ops, post.read_ops, post.write_ops) {
            (Some(r0), Some(w0), Some(r1), Some(w1)) => Some((r0, w0, r1, w1)),
            (None, None, None, None) => None,
            _ => return Self::unavailable(),
        };

        let Some(read_bytes) = post.read_bytes.checked_sub(pre.read_bytes) else {
            return Self::unavailable();
        };
        let Some(write_bytes) = post.write_bytes.checked_sub(pre.write_bytes) else {
            return Self::unavailable();
        };
        let (read_ops, write_ops) = match ops {
            Some((r0, w0, r1, w1)) => match (r1.checked_sub(r0), w1.checked_sub(w0)) {
                (Some(r), Some(w)) => (r, w),
                _ => return Self::unavailable(),
            },
            None => (0, 0),
        };

        Self {
            read_bytes,
            write_bytes,
            read_ops,
            write_ops,
            available: true,
        }
    }
}

/// Takes [`ResourceSnapshot`]s. Holds the sysinfo state between calls so the
/// host CPU figure covers the interval since the previous sample.
pub struct ResourceSampler {
    system: System,
    cgroup_probe: fn() -> Option<CgroupMemory>,
}

impl ResourceSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        system.refresh_memory();
        Self {
            system,
            cgroup_probe: read_cgroup_memory,
        }
    }

    /// Sample CPU, memory and disk counters. Never fails; a failed probe
    /// leaves its sentinel in place and appends to `error`.
    pub fn sample(&mut self) -> ResourceSnapshot {
        let mut errors: Vec<String> = Vec::new();

        self.system.refresh_cpu_usage();
        let cpu_percent = if self.system.cpus().is_empty() {
            errors.push("cpu: no processors reported".to_string());
            SENTINEL
        } else {
            let usage = self.system.global_cpu_usage() as f64;
            if usage.is_finite() {
                usage
            } else {
                errors.push("cpu: non-finite utilization".to_string());
                SENTINEL
            }
        };

        self.system.refresh_memory();
        let host_total = self.system.total_memory();
        let host_available = self.system.available_memory();
        let (memory_percent, memory_used_bytes, memory_available_bytes, memory_source) =
            match (self.cgroup_probe)() {
                Some(cg) if host_total == 0 || cg.limit_bytes < host_total => (
                    cg.percent(),
                    cg.usage_bytes,
                    cg.available_bytes(),
                    MemorySource::Cgroup,
                ),
                _ if host_total == 0 => {
                    errors.push("memory: host total reported as zero".to_string());
                    (SENTINEL, 0, 0, MemorySource::Host)
                }
                _ => {
                    let used = host_total.saturating_sub(host_available);
                    (
                        used as f64 / host_total as f64 * 100.0,
                        used,
                        host_available,
                        MemorySource::Host,
                    )
                }
            };

        let disk_io = match read_disk_counters() {
            Ok(c) => Some(c),
            Err(e) => {
                errors.push(e.to_string());
                None
            }
        };

        let error = if errors.is_empty() {
            None
        } else {
            let joined = errors.join("; ");
            warn!(error = %joined, "resource sample degraded");
            Some(joined)
        };

        let snapshot = ResourceSnapshot {
            timestamp: Utc::now(),
            cpu_percent,
            memory_percent,
            memory_used_bytes,
            memory_available_bytes,
            memory_source,
            disk_io,
            error,
        };
        trace!(?snapshot, "resource sample");
        snapshot
    }
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_with(disk_io: Option<DiskIoCounters>) -> ResourceSnapshot {
        ResourceSnapshot {
            timestamp: Utc::now(),
            cpu_percent: 10.0,
            memory_percent: 40.0,
            memory_used_bytes: 4,
            memory_available_bytes: 6,
            memory_source: MemorySource::Host,
            disk_io,
            error: None,
        }
    }

    fn counters(rb: u64, wb: u64, ops: Option<(u64, u64)>) -> DiskIoCounters {
        DiskIoCounters {
            read_bytes: rb,
            write_bytes: wb,
            read_ops: ops.map(|o| o.0),
            write_ops: ops.map(|o| o.1),
        }
    }

    #[test]
    fn test_identity_delta_is_zero() {
        let s = snapshot_with(Some(counters(100, 200, Some((3, 4)))));
        let d = ResourceDelta::between(&s, &s);
        assert!(d.available);
        assert_eq!(
            (d.read_bytes, d.write_bytes, d.read_ops, d.write_ops),
            (0, 0, 0, 0)
        );
    }

    #[test]
    fn test_forward_delta() {
        let pre = snapshot_with(Some(counters(100, 200, Some((3, 4)))));
        let post = snapshot_with(Some(counters(1124, 8392, Some((5, 10)))));
        let d = ResourceDelta::between(&pre, &post);
        assert!(d.available);
        assert_eq!(d.read_bytes, 1024);
        assert_eq!(d.write_bytes, 8192);
        assert_eq!(d.read_ops, 2);
        assert_eq!(d.write_ops, 6);
    }

    #[test]
    fn test_missing_side_is_unavailable() {
        let with = snapshot_with(Some(counters(1, 1, None)));
        let without = snapshot_with(None);
        assert_eq!(ResourceDelta::between(&with, &without), ResourceDelta::unavailable());
        assert_eq!(ResourceDelta::between(&without, &with), ResourceDelta::unavailable());
    }

    #[test]
    fn test_shape_mismatch_is_unavailable() {
        let pre = snapshot_with(Some(counters(1, 1, Some((1, 1)))));
        let post = snapshot_with(Some(counters(2, 2, None)));
        assert!(!ResourceDelta::between(&pre, &post).available);
    }

    #[test]
    fn test_regression_is_unavailable() {
        let pre = snapshot_with(Some(counters(500, 500, Some((9, 9)))));
        let post = snapshot_with(Some(counters(400, 600, Some((10, 10)))));
        let d = ResourceDelta::between(&pre, &post);
        assert!(!d.available);
        assert_eq!(d.write_bytes, 0);

        let post_ops = snapshot_with(Some(counters(600, 600, Some((8, 10)))));
        assert!(!ResourceDelta::between(&pre, &post_ops).available);
    }

    #[test]
    fn test_bytes_only_counters() {
        let pre = snapshot_with(Some(counters(10, 10, None)));
        let post = snapshot_with(Some(counters(30, 50, None)));
        let d = ResourceDelta::between(&pre, &post);
        assert!(d.available);
        assert_eq!((d.read_bytes, d.write_bytes), (20, 40));
        assert_eq!((d.read_ops, d.write_ops), (0, 0));
    }

    #[test]
    fn test_sampler_never_panics() {
        let mut sampler = ResourceSampler::new();
        let a = sampler.sample();
        let b = sampler.sample();
        assert!(a.cpu_percent == SENTINEL || (0.0..=100.0).contains(&a.cpu_percent));
        assert!(b.memory_percent == SENTINEL || b.memory_percent >= 0.0);
        assert!(b.timestamp >= a.timestamp);
    }

    #[test]
    fn test_cgroup_limit_preferred_when_smaller() {
        fn tiny_cgroup() -> Option<CgroupMemory> {
            Some(CgroupMemory {
                limit_bytes: 1024,
                usage_bytes: 256,
            })
        }
        let mut sampler = ResourceSampler::new();
        sampler.cgroup_probe = tiny_cgroup;
        let s = sampler.sample();
        assert_eq!(s.memory_source, MemorySource::Cgroup);
        assert_eq!(s.memory_used_bytes, 256);
        assert_eq!(s.memory_available_bytes, 768);
        assert!((s.memory_percent - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_unavailable_snapshot_serializes_sentinels() {
        let s = ResourceSnapshot::unavailable("probe failed");
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["cpu_percent"], -1.0);
        assert_eq!(v["memory_percent"], -1.0);
        assert_eq!(v["memory_source"], "host");
        assert!(v.get("disk_io").is_none());
        assert_eq!(v["error"], "probe failed");
    }
}
