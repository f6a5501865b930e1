// Copyright 2025 ToonDB Authors
//
// Licensed under the Apache License, Version 2.0

//! Process CPU-time accounting and the normalized CPU percentage.
//!
//! The harness attributes CPU cost to a single unit of work by bracketing it
//! with two reads of the process user/system times. The raw figure
//! `(user + system) / wall` exceeds 100% whenever the engine runs worker
//! threads, so it is divided by the logical core count to make runs on
//! different machines comparable.

use crate::SamplingError;
use serde::{Deserialize, Serialize};

/// Cumulative CPU time consumed by this process, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CpuTimes {
    pub user_secs: f64,
    pub system_secs: f64,
}

impl CpuTimes {
    /// `(user_diff, system_diff)` between `self` (earlier) and `later`.
    pub fn diff(&self, later: &CpuTimes) -> (f64, f64) {
        (
            later.user_secs - self.user_secs,
            later.system_secs - self.system_secs,
        )
    }
}

/// Read user and system CPU time of the current process.
#[cfg(unix)]
pub fn process_cpu_times() -> Result<CpuTimes, SamplingError> {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
    // SAFETY: `usage` is a valid, writable rusage buffer for the duration of the call.
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if rc != 0 {
        return Err(SamplingError::CpuTimes(
            std::io::Error::last_os_error().to_string(),
        ));
    }
    // SAFETY: getrusage returned 0, so the struct is initialized.
    let usage = unsafe { usage.assume_init() };
    Ok(CpuTimes {
        user_secs: timeval_secs(usage.ru_utime),
        system_secs: timeval_secs(usage.ru_stime),
    })
}

#[cfg(not(unix))]
pub fn process_cpu_times() -> Result<CpuTimes, SamplingError> {
    Err(SamplingError::Unsupported("process cpu times"))
}

#[cfg(unix)]
fn timeval_secs(tv: libc::timeval) -> f64 {
    tv.tv_sec as f64 + tv.tv_usec as f64 / 1e6
}

/// Number of logical cores visible to this process (never 0).
pub fn logical_core_count() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1)
}

/// `100 * (user_diff + system_diff) / wall_secs / cores`, clamped to `[0, 100]`.
///
/// Clock anomalies (non-positive wall time, negative CPU diff from a counter
/// reset, non-finite inputs) yield `0.0` rather than a negative or undefined
/// value.
pub fn normalized_cpu_percent(user_diff: f64, system_diff: f64, wall_secs: f64, cores: usize) -> f64 {
    if wall_secs.is_nan() || wall_secs <= 0.0 || cores == 0 {
        return 0.0;
    }
    let busy = user_diff + system_diff;
    if !busy.is_finite() || user_diff < 0.0 || system_diff < 0.0 {
        return 0.0;
    }
    let pct = 100.0 * busy / wall_secs / cores as f64;
    if pct.is_finite() {
        pct.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_single_core_saturation() {
        assert_eq!(normalized_cpu_percent(0.5, 0.5, 1.0, 1), 100.0);
    }

    #[test]
    fn test_divides_by_cores() {
        // Two fully busy threads on a four-core machine.
        let pct = normalized_cpu_percent(1.5, 0.5, 1.0, 4);
        assert!((pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_anomalies_are_zero() {
        assert_eq!(normalized_cpu_percent(0.1, 0.1, 0.0, 4), 0.0);
        assert_eq!(normalized_cpu_percent(0.1, 0.1, -1.0, 4), 0.0);
        assert_eq!(normalized_cpu_percent(-0.3, 0.1, 1.0, 4), 0.0);
        assert_eq!(normalized_cpu_percent(0.1, 0.1, 1.0, 0), 0.0);
        assert_eq!(normalized_cpu_percent(f64::NAN, 0.1, 1.0, 2), 0.0);
    }

    #[cfg(unix)]
    #[test]
    fn test_process_cpu_times_monotonic() {
        let before = process_cpu_times().unwrap();
        let mut acc = 0u64;
        for i in 0..2_000_000u64 {
            acc = acc.wrapping_add(i * i);
        }
        std::hint::black_box(acc);
        let after = process_cpu_times().unwrap();
        let (u, s) = before.diff(&after);
        assert!(u >= 0.0);
        assert!(s >= 0.0);
    }

    #[test]
    fn test_logical_core_count_positive() {
        assert!(logical_core_count() >= 1);
    }

    proptest! {
        #[test]
        fn prop_normalized_cpu_in_range(
            user in 0.0f64..1_000.0,
            system in 0.0f64..1_000.0,
            wall in 1e-6f64..1_000.0,
            cores in 1usize..256,
        ) {
            let pct = normalized_cpu_percent(user, system, wall, cores);
            prop_assert!((0.0..=100.0).contains(&pct));
        }

        #[test]
        fn prop_never_negative(
            user in -1_000.0f64..1_000.0,
            system in -1_000.0f64..1_000.0,
            wall in -10.0f64..10.0,
            cores in 0usize..64,
        ) {
            prop_assert!(normalized_cpu_percent(user, system, wall, cores) >= 0.0);
        }
    }
}
