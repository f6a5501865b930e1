//! Simulated sensor-style writes: small batches drawn with replacement from
//! a working set, separated by a delay.

use super::{load_sample, stop_requested, StopFlag, StreamingSpec, UnitSource};
use crate::{BenchError, BenchResult, Row, WorkUnit};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const DEFAULT_SAMPLE_ROWS: usize = 5_000;

/// Batch sizing and pacing of a streaming run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StreamMode {
    /// Batch size uniform in `1..=max_batch`, delay uniform in the range.
    Random {
        max_batch: usize,
        delay_min: f64,
        delay_max: f64,
    },
    FixedRows { rows: usize, delay: f64 },
    /// `(minutes since start % 12) + 1` rows per batch.
    ScheduledPattern { delay: f64 },
}

/// Delays feed `Duration::from_secs_f64`, so they must be finite and >= 0.
fn is_delay(secs: f64) -> bool {
    secs.is_finite() && secs >= 0.0
}

impl StreamMode {
    pub fn random(delay_min: f64, delay_max: f64) -> Self {
        StreamMode::Random {
            max_batch: 100,
            delay_min,
            delay_max,
        }
    }

    pub fn fixed_rows() -> Self {
        StreamMode::FixedRows { rows: 10, delay: 1.0 }
    }

    pub fn scheduled_pattern() -> Self {
        StreamMode::ScheduledPattern { delay: 1.0 }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            StreamMode::Random { .. } => "stream_random",
            StreamMode::FixedRows { .. } => "stream_fixed_rows",
            StreamMode::ScheduledPattern { .. } => "stream_scheduled_pattern",
        }
    }

    fn validate(&self) -> BenchResult<()> {
        match *self {
            StreamMode::Random {
                max_batch,
                delay_min,
                delay_max,
            } => {
                if max_batch == 0 {
                    return Err(BenchError::Config("max batch must be at least 1".into()));
                }
                if !(is_delay(delay_min) && is_delay(delay_max) && delay_max >= delay_min) {
                    return Err(BenchError::Config(format!(
                        "invalid delay range [{}, {}]",
                        delay_min, delay_max
                    )));
                }
            }
            StreamMode::FixedRows { rows, delay } => {
                if rows == 0 || !is_delay(delay) {
                    return Err(BenchError::Config("invalid fixed_rows parameters".into()));
                }
            }
            StreamMode::ScheduledPattern { delay } => {
                if !is_delay(delay) {
                    return Err(BenchError::Config("invalid scheduled_pattern delay".into()));
                }
            }
        }
        Ok(())
    }
}

impl FromStr for StreamMode {
    type Err = BenchError;

    /// Mode name with its default parameters.
    fn from_str(s: &str) -> BenchResult<Self> {
        match s {
            "random" => Ok(StreamMode::random(0.1, 1.0)),
            "fixed_rows" => Ok(StreamMode::fixed_rows()),
            "scheduled_pattern" => Ok(StreamMode::scheduled_pattern()),
            other => Err(BenchError::Config(format!("unknown stream mode '{}'", other))),
        }
    }
}

pub struct StreamingSource {
    header: Vec<String>,
    working_set: Vec<Row>,
    mode: StreamMode,
    max_rows: Option<u64>,
    max_seconds: Option<f64>,
    stop: Option<StopFlag>,
    rng: ChaCha8Rng,
    started: Option<Instant>,
    next_index: u64,
    emitted_rows: u64,
    pending_delay: Option<Duration>,
}

impl StreamingSource {
    pub fn open(spec: &StreamingSpec) -> BenchResult<Self> {
        spec.mode.validate()?;
        if spec.sample_rows == 0 {
            return Err(BenchError::Config("sample rows must be at least 1".into()));
        }
        let (header, working_set) = load_sample(&spec.input, spec.delimiter, spec.sample_rows)?;
        info!(
            path = %spec.input.display(),
            rows = working_set.len(),
            mode = spec.mode.tag(),
            "streaming working set loaded"
        );
        Ok(Self::from_rows(
            header,
            working_set,
            spec.mode,
            spec.max_rows,
            spec.max_seconds,
            spec.seed,
            spec.stop.clone(),
        ))
    }

    pub fn from_rows(
        header: Vec<String>,
        working_set: Vec<Row>,
        mode: StreamMode,
        max_rows: Option<u64>,
        max_seconds: Option<f64>,
        seed: u64,
        stop: Option<StopFlag>,
    ) -> Self {
        Self {
            header,
            working_set,
            mode,
            max_rows,
            max_seconds,
            stop,
            rng: ChaCha8Rng::seed_from_u64(seed),
            started: None,
            next_index: 1,
            emitted_rows: 0,
            pending_delay: None,
        }
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn working_set(&self) -> &[Row] {
        &self.working_set
    }

    pub fn emitted_rows(&self) -> u64 {
        self.emitted_rows
    }

    fn elapsed(&self) -> Duration {
        self.started.map(|s| s.elapsed()).unwrap_or_default()
    }

    fn finished(&self) -> bool {
        if stop_requested(&self.stop) {
            debug!("stream stop requested");
            return true;
        }
        if let Some(max) = self.max_rows {
            if self.emitted_rows >= max {
                return true;
            }
        }
        if let Some(max) = self.max_seconds {
            if self.started.is_some() && self.elapsed().as_secs_f64() >= max {
                return true;
            }
        }
        false
    }

    /// Sleep in short slices so a stop request is noticed promptly.
    fn pause(&self, delay: Duration) {
        let deadline = Instant::now() + delay;
        loop {
            let now = Instant::now();
            if now >= deadline || stop_requested(&self.stop) {
                return;
            }
            std::thread::sleep((deadline - now).min(Duration::from_millis(100)));
        }
    }

    fn next_batch_plan(&mut self) -> (usize, Duration) {
        match self.mode {
            StreamMode::Random {
                max_batch,
                delay_min,
                delay_max,
            } => {
                let rows = self.rng.gen_range(1..=max_batch);
                let delay = if delay_max > delay_min {
                    self.rng.gen_range(delay_min..=delay_max)
                } else {
                    delay_min
                };
                (rows, Duration::from_secs_f64(delay))
            }
            StreamMode::FixedRows { rows, delay } => (rows, Duration::from_secs_f64(delay)),
            StreamMode::ScheduledPattern { delay } => {
                let minutes = self.elapsed().as_secs() / 60;
                ((minutes % 12) as usize + 1, Duration::from_secs_f64(delay))
            }
        }
    }
}

impl UnitSource for StreamingSource {
    fn next_unit(&mut self) -> BenchResult<Option<WorkUnit>> {
        if self.finished() {
            return Ok(None);
        }
        if let Some(delay) = self.pending_delay.take() {
            self.pause(delay);
            if self.finished() {
                return Ok(None);
            }
        }
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }

        let (mut rows, delay) = self.next_batch_plan();
        if let Some(max) = self.max_rows {
            rows = rows.min(max.saturating_sub(self.emitted_rows) as usize);
        }
        let batch: Vec<Row> = (0..rows)
            .filter_map(|_| self.working_set.choose(&mut self.rng).cloned())
            .collect();

        self.pending_delay = Some(delay);
        self.emitted_rows += batch.len() as u64;
        let unit = WorkUnit::rows(self.next_index, self.mode.tag(), batch);
        self.next_index += 1;
        Ok(Some(unit))
    }
}
