// Copyright 2025 ToonDB Authors
//
// Licensed under the Apache License, Version 2.0

//! Host-wide disk I/O counters.
//!
//! On Linux the counters come from `/proc/diskstats`, summed over whole block
//! devices (a device is whole when `/sys/block/<name>` exists, which excludes
//! partitions and avoids double counting). Other platforms fall back to the
//! byte totals sysinfo exposes; operation counts are then absent.

use crate::SamplingError;
use serde::{Deserialize, Serialize};

const SECTOR_SIZE: u64 = 512;

/// Cumulative disk I/O counters since boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiskIoCounters {
    pub read_bytes: u64,
    pub write_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_ops: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_ops: Option<u64>,
}

/// Sum the counters of every device accepted by `is_whole_device`.
///
/// Returns `None` when no line matched.
pub fn parse_diskstats<F>(content: &str, is_whole_device: F) -> Option<DiskIoCounters>
where
    F: Fn(&str) -> bool,
{
    let mut total = DiskIoCounters {
        read_ops: Some(0),
        write_ops: Some(0),
        ..Default::default()
    };
    let mut matched = false;

    for line in content.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 {
            continue;
        }
        let name = fields[2];
        if !is_whole_device(name) {
            continue;
        }
        let num = |i: usize| fields[i].parse::<u64>().ok();
        let (Some(reads), Some(sectors_read), Some(writes), Some(sectors_written)) =
            (num(3), num(5), num(7), num(9))
        else {
            continue;
        };

        matched = true;
        total.read_bytes = total.read_bytes.wrapping_add(sectors_read * SECTOR_SIZE);
        total.write_bytes = total.write_bytes.wrapping_add(sectors_written * SECTOR_SIZE);
        total.read_ops = total.read_ops.map(|n| n.wrapping_add(reads));
        total.write_ops = total.write_ops.map(|n| n.wrapping_add(writes));
    }

    matched.then_some(total)
}

/// Read the current host disk counters.
#[cfg(target_os = "linux")]
pub fn read_disk_counters() -> Result<DiskIoCounters, SamplingError> {
    let content = std::fs::read_to_string("/proc/diskstats")
        .map_err(|e| SamplingError::DiskCounters(format!("/proc/diskstats: {}", e)))?;
    parse_diskstats(&content, |name| {
        std::path::Path::new("/sys/block").join(name).exists()
    })
    .ok_or_else(|| SamplingError::DiskCounters("no block devices found".into()))
}

#[cfg(not(target_os = "linux"))]
pub fn read_disk_counters() -> Result<DiskIoCounters, SamplingError> {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    if disks.list().is_empty() {
        return Err(SamplingError::DiskCounters("no disks reported".into()));
    }
    let mut total = DiskIoCounters::default();
    for disk in disks.list() {
        let usage = disk.usage();
        total.read_bytes = total.read_bytes.wrapping_add(usage.total_read_bytes);
        total.write_bytes = total.write_bytes.wrapping_add(usage.total_written_bytes);
    }
    Ok(total)
}
