// Copyright 2025 ToonDB Authors
//
// Licensed under the Apache License, Version 2.0

//! Container memory accounting (cgroup v2, then v1).
//!
//! When the harness runs inside a memory-limited container the host figures
//! from sysinfo describe the wrong machine; the cgroup limit and usage are
//! what the engine actually competes for.

use std::path::Path;

/// Memory usage and limit of the enclosing cgroup, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CgroupMemory {
    pub limit_bytes: u64,
    pub usage_bytes: u64,
}

impl CgroupMemory {
    pub fn percent(&self) -> f64 {
        if self.limit_bytes == 0 {
            return -1.0;
        }
        self.usage_bytes as f64 / self.limit_bytes as f64 * 100.0
    }

    pub fn available_bytes(&self) -> u64 {
        self.limit_bytes.saturating_sub(self.usage_bytes)
    }
}

/// Probe the default cgroup mount.
pub fn read_cgroup_memory() -> Option<CgroupMemory> {
    read_cgroup_memory_at(Path::new("/sys/fs/cgroup"))
}

/// Probe a cgroup filesystem rooted at `root`.
///
/// Returns `None` when no limit is configured (`max`, or the v1 "unlimited"
/// sentinel close to `i64::MAX`) or the files cannot be read.
pub fn read_cgroup_memory_at(root: &Path) -> Option<CgroupMemory> {
    let v2_max = root.join("memory.max");
    if v2_max.exists() {
        let limit = parse_limit(&read_first_line(&v2_max)?)?;
        let usage = read_first_line(&root.join("memory.current"))?.parse().ok()?;
        return Some(CgroupMemory {
            limit_bytes: limit,
            usage_bytes: usage,
        });
    }

    let v1 = root.join("memory");
    let v1_limit = v1.join("memory.limit_in_bytes");
    if v1_limit.exists() {
        let limit = parse_limit(&read_first_line(&v1_limit)?)?;
        let usage = read_first_line(&v1.join("memory.usage_in_bytes"))?
            .parse()
            .ok()?;
        return Some(CgroupMemory {
            limit_bytes: limit,
            usage_bytes: usage,
        });
    }

    None
}

fn read_first_line(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| s.lines().next().map(|l| l.trim().to_string()))
}

fn parse_limit(raw: &str) -> Option<u64> {
    if raw == "max" {
        return None;
    }
    let limit: u64 = raw.parse().ok()?;
    // cgroup v1 reports "no limit" as a page-aligned value near i64::MAX.
    if limit == 0 || limit >= (i64::MAX as u64) / 2 {
        return None;
    }
    Some(limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_v2_limited() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("memory.max"), "268435456\n").unwrap();
        std::fs::write(dir.path().join("memory.current"), "67108864\n").unwrap();

        let mem = read_cgroup_memory_at(dir.path()).unwrap();
        assert_eq!(mem.limit_bytes, 256 * 1024 * 1024);
        assert!((mem.percent() - 25.0).abs() < 1e-9);
        assert_eq!(mem.available_bytes(), 192 * 1024 * 1024);
    }

    #[test]
    fn test_v2_unlimited() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("memory.max"), "max\n").unwrap();
        std::fs::write(dir.path().join("memory.current"), "1024\n").unwrap();
        assert!(read_cgroup_memory_at(dir.path()).is_none());
    }

    #[test]
    fn test_v1_limited_and_unlimited() {
        let dir = TempDir::new().unwrap();
        let v1 = dir.path().join("memory");
        std::fs::create_dir_all(&v1).unwrap();
        std::fs::write(v1.join("memory.limit_in_bytes"), "1073741824").unwrap();
        std::fs::write(v1.join("memory.usage_in_bytes"), "536870912").unwrap();
        let mem = read_cgroup_memory_at(dir.path()).unwrap();
        assert!((mem.percent() - 50.0).abs() < 1e-9);

        std::fs::write(v1.join("memory.limit_in_bytes"), "9223372036854771712").unwrap();
        assert!(read_cgroup_memory_at(dir.path()).is_none());
    }

    #[test]
    fn test_missing_root() {
        let dir = TempDir::new().unwrap();
        assert!(read_cgroup_memory_at(&dir.path().join("nope")).is_none());
    }
}
