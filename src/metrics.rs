//! Per-stage timings and tick counters for the capture loop.
//! Each stage keeps its most recent samples (1024 by default); summaries report
//! p50/p95/p99 over that window.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

/// Times one pipeline stage; call [`stop`](StageTimer::stop) when the stage succeeded.
/// Dropping it without stopping records nothing.
#[must_use = "a stage timer records only when stopped"]
pub struct StageTimer {
    stage: &'static str,
    started: Instant,
    registry: Arc<MetricsRegistry>,
}

impl StageTimer {
    pub fn stop(self) -> Duration {
        let elapsed = self.started.elapsed();
        self.registry.record(self.stage, elapsed);
        elapsed
    }
}

/// Most recent samples of one stage, in microseconds.
struct Window {
    samples: VecDeque<f64>,
    limit: usize,
}

impl Window {
    fn push(&mut self, us: f64) {
        if self.samples.len() == self.limit {
            self.samples.pop_front();
        }
        self.samples.push_back(us);
    }

    fn summarize(&self) -> StageSummary {
        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let at = |q: f64| -> f64 {
            match sorted.len() {
                0 => 0.0,
                n => sorted[((n - 1) as f64 * q).round() as usize],
            }
        };
        StageSummary {
            p50_us: at(0.50),
            p95_us: at(0.95),
            p99_us: at(0.99),
            count: sorted.len(),
        }
    }
}

/// Timings and counters shared by the pipeline workers.
pub struct MetricsRegistry {
    stages: Mutex<HashMap<&'static str, Window>>,
    counters: Mutex<HashMap<&'static str, u64>>,
    window: usize,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::with_window(1024)
    }

    /// Keep at most `window` samples per stage.
    pub fn with_window(window: usize) -> Self {
        Self {
            stages: Mutex::new(HashMap::new()),
            counters: Mutex::new(HashMap::new()),
            window: window.max(1),
        }
    }

    pub fn record(&self, stage: &'static str, elapsed: Duration) {
        let us = elapsed.as_secs_f64() * 1e6;
        self.stages
            .lock()
            .entry(stage)
            .or_insert_with(|| Window {
                samples: VecDeque::with_capacity(self.window),
                limit: self.window,
            })
            .push(us);
        tracing::trace!(stage, elapsed_us = us, "stage timed");
    }

    pub fn timer(self: &Arc<Self>, stage: &'static str) -> StageTimer {
        StageTimer {
            stage,
            started: Instant::now(),
            registry: Arc::clone(self),
        }
    }

    pub fn increment(&self, name: &'static str) {
        *self.counters.lock().entry(name).or_default() += 1;
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }

    /// Percentiles of every stage timed so far.
    pub fn summary(&self) -> HashMap<&'static str, StageSummary> {
        self.stages
            .lock()
            .iter()
            .map(|(&stage, window)| (stage, window.summarize()))
            .collect()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StageSummary {
    pub p50_us: f64,
    pub p95_us: f64,
    pub p99_us: f64,
    pub count: usize,
}

/// Stage and counter names.
pub mod metric_names {
    pub const CAPTURE_DONE: &str = "t_capture_done";
    pub const OCR_DONE: &str = "t_ocr_done";
    pub const TRANSLATE_DONE: &str = "t_translate_done";
    pub const TICK_DONE: &str = "t_tick_done";

    pub const TICKS: &str = "ticks";
    pub const TICKS_UNCHANGED: &str = "ticks_unchanged";
    pub const TICKS_FAILED: &str = "ticks_failed";
    pub const FRAMES_DELIVERED: &str = "frames_delivered";
    pub const FRAMES_CLEARED: &str = "frames_cleared";
    pub const TRANSLATIONS_DEGRADED: &str = "translations_degraded";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn summary_percentiles() {
        let registry = MetricsRegistry::new();
        for n in 1..=100 {
            registry.record(metric_names::TICK_DONE, ms(n));
        }
        let s = registry.summary()[metric_names::TICK_DONE];
        assert_eq!(s.count, 100);
        assert!((s.p50_us - 50_000.0).abs() <= 1_000.0);
        assert!((s.p99_us - 99_000.0).abs() <= 1_000.0);
        assert!(s.p50_us <= s.p95_us && s.p95_us <= s.p99_us);
    }

    #[test]
    fn window_drops_oldest_samples() {
        let registry = MetricsRegistry::with_window(3);
        for n in [900, 1, 2, 3] {
            registry.record(metric_names::OCR_DONE, ms(n));
        }
        let s = registry.summary()[metric_names::OCR_DONE];
        assert_eq!(s.count, 3);
        assert_eq!(s.p99_us, 3_000.0);
    }

    #[test]
    fn counters_start_at_zero() {
        let registry = MetricsRegistry::new();
        assert_eq!(registry.counter(metric_names::TICKS), 0);
        registry.increment(metric_names::TICKS);
        registry.increment(metric_names::TICKS);
        assert_eq!(registry.counter(metric_names::TICKS), 2);
    }

    #[test]
    fn only_stopped_timers_record() {
        let registry = Arc::new(MetricsRegistry::new());
        registry.timer(metric_names::CAPTURE_DONE).stop();
        drop(registry.timer(metric_names::OCR_DONE));

        let summary = registry.summary();
        assert_eq!(summary[metric_names::CAPTURE_DONE].count, 1);
        assert!(!summary.contains_key(metric_names::OCR_DONE));
    }
}
