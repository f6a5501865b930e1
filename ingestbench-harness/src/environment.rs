// Copyright 2025 ToonDB Authors
//
// Licensed under the Apache License, Version 2.0

//! Host description recorded next to each sweep so results from different
//! machines are not compared blindly.

use crate::cgroup::read_cgroup_memory;
use crate::cpu::logical_core_count;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::process::Command;
use sysinfo::System;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub os: String,
    /// Kernel release (Linux) or product version (macOS)
    pub os_version: String,
    pub cpu_model: String,
    pub logical_cores: usize,
    pub ram_bytes: u64,
    /// Memory limit of the enclosing cgroup, if one is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cgroup_memory_limit_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_governor: Option<String>,
    pub build_profile: String,
    pub harness_version: String,
    pub collected_at: DateTime<Utc>,
    /// Settings likely to add variance between runs
    pub warnings: Vec<String>,
}

impl EnvironmentInfo {
    pub fn collect() -> Self {
        let mut warnings = Vec::new();

        let mut system = System::new();
        system.refresh_memory();
        let ram_bytes = system.total_memory();

        let cgroup_memory_limit_bytes = read_cgroup_memory()
            .map(|m| m.limit_bytes)
            .filter(|limit| ram_bytes == 0 || *limit < ram_bytes);
        if let Some(limit) = cgroup_memory_limit_bytes {
            warnings.push(format!(
                "running under a cgroup memory limit of {} MiB; memory figures are container-relative",
                limit / (1024 * 1024)
            ));
        }

        let cpu_governor = get_cpu_governor();
        if let Some(ref gov) = cpu_governor {
            if gov != "performance" {
                warnings.push(format!(
                    "CPU governor is '{}', should be 'performance' for reproducible results",
                    gov
                ));
            }
        }

        let build_profile = if cfg!(debug_assertions) {
            "debug".to_string()
        } else {
            "release".to_string()
        };
        if build_profile == "debug" {
            warnings.push("harness built in debug mode; its own overhead inflates CPU figures".to_string());
        }

        Self {
            os: std::env::consts::OS.to_string(),
            os_version: get_os_version(),
            cpu_model: get_cpu_model(),
            logical_cores: logical_core_count(),
            ram_bytes,
            cgroup_memory_limit_bytes,
            cpu_governor,
            build_profile,
            harness_version: env!("CARGO_PKG_VERSION").to_string(),
            collected_at: Utc::now(),
            warnings,
        }
    }

    /// Short identifier for grouping results by machine.
    pub fn fingerprint(&self) -> String {
        format!(
            "{}-{}-{}c-{}g",
            self.os,
            self.cpu_model.replace(' ', "_"),
            self.logical_cores,
            self.ram_bytes / (1024 * 1024 * 1024),
        )
    }
}

fn get_os_version() -> String {
    if cfg!(target_os = "macos") {
        Command::new("sw_vers")
            .args(["-productVersion"])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    } else {
        System::kernel_version().unwrap_or_else(|| "unknown".to_string())
    }
}

fn get_cpu_model() -> String {
    if cfg!(target_os = "linux") {
        std::fs::read_to_string("/proc/cpuinfo")
            .ok()
            .and_then(|s| {
                s.lines()
                    .find(|l| l.starts_with("model name"))
                    .and_then(|l| l.split(':').nth(1))
                    .map(|s| s.trim().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string())
    } else if cfg!(target_os = "macos") {
        Command::new("sysctl")
            .args(["-n", "machdep.cpu.brand_string"])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    } else {
        "unknown".to_string()
    }
}

fn get_cpu_governor() -> Option<String> {
    if cfg!(target_os = "linux") {
        std::fs::read_to_string("/sys/devices/system/cpu/cpu0/cpufreq/scaling_governor")
            .ok()
            .map(|s| s.trim().to_string())
    } else {
        None
    }
}
