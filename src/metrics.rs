//! Solve-loop metrics
//!
//! In-process counters for observability: scans, attempts, outcomes, and
//! error-kind tallies, plus attempt-latency percentiles over a fixed-size
//! ring buffer. Counters are recorded by the pipeline but never read back
//! by it; control flow does not depend on anything here.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{OnceLock, RwLock};
use std::time::Duration;

/// Maximum number of attempt-duration samples kept for percentiles
const MAX_HISTOGRAM_SAMPLES: usize = 1000;

/// Thread-safe metrics collector using atomics and RwLocks
#[derive(Debug)]
pub struct Metrics {
    /// Detector scans performed
    pub scans_total: AtomicU64,
    /// Scans that found a challenge
    pub challenges_detected_total: AtomicU64,
    /// Scans where markers for more than one variant matched
    pub ambiguous_detections_total: AtomicU64,
    /// Attempts spent (failed mid-pipeline or actuated)
    pub attempts_total: AtomicU64,
    /// Solve runs that ended in `Solved`
    pub solved_total: AtomicU64,
    /// Solve runs that ended in `GaveUp`
    pub gave_up_total: AtomicU64,
    /// Component errors converted into retry-or-give-up decisions
    pub errors_total: AtomicU64,

    /// Errors broken down by kind
    errors_by_kind: RwLock<HashMap<String, u64>>,
    /// Attempt durations for percentile calculation
    attempt_durations: RwLock<RingBuffer<Duration>>,
}

/// Memory-efficient ring buffer for histogram samples
#[derive(Debug)]
struct RingBuffer<T> {
    data: Vec<T>,
    capacity: usize,
    /// Position of next write (wraps around)
    write_pos: usize,
}

impl<T: Clone + Ord> RingBuffer<T> {
    fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            write_pos: 0,
        }
    }

    fn push(&mut self, value: T) {
        if self.data.len() < self.capacity {
            self.data.push(value);
        } else {
            self.data[self.write_pos] = value;
        }
        self.write_pos = (self.write_pos + 1) % self.capacity;
    }

    /// Calculate percentile (0.0 to 1.0) over retained samples
    fn percentile(&self, p: f64) -> Option<T> {
        if self.data.is_empty() {
            return None;
        }
        let mut sorted = self.data.clone();
        sorted.sort();
        let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
        sorted.get(idx).cloned()
    }
}

/// Point-in-time copy of the counters, cheap to log or serialize
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Detector scans performed
    pub scans: u64,
    /// Scans that found a challenge
    pub challenges_detected: u64,
    /// Ambiguous scans resolved by tie-break
    pub ambiguous_detections: u64,
    /// Attempts spent
    pub attempts: u64,
    /// Runs ending in success
    pub solved: u64,
    /// Runs ending in give-up
    pub gave_up: u64,
    /// Component errors recorded
    pub errors: u64,
    /// Error tallies by kind
    pub errors_by_kind: HashMap<String, u64>,
    /// Median attempt duration in milliseconds, if any samples exist
    pub attempt_p50_ms: Option<u64>,
    /// 95th percentile attempt duration in milliseconds
    pub attempt_p95_ms: Option<u64>,
}

impl Metrics {
    /// Create a new Metrics instance
    pub fn new() -> Self {
        Self {
            scans_total: AtomicU64::new(0),
            challenges_detected_total: AtomicU64::new(0),
            ambiguous_detections_total: AtomicU64::new(0),
            attempts_total: AtomicU64::new(0),
            solved_total: AtomicU64::new(0),
            gave_up_total: AtomicU64::new(0),
            errors_total: AtomicU64::new(0),
            errors_by_kind: RwLock::new(HashMap::new()),
            attempt_durations: RwLock::new(RingBuffer::new(MAX_HISTOGRAM_SAMPLES)),
        }
    }

    /// Record a detector scan and whether it found a challenge
    pub fn record_scan(&self, found: bool) {
        self.scans_total.fetch_add(1, Ordering::Relaxed);
        if found {
            self.challenges_detected_total
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a scan where multiple variants matched
    pub fn record_ambiguous_detection(&self) {
        self.ambiguous_detections_total
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Record one spent attempt with its duration
    pub fn record_attempt(&self, duration: Duration) {
        self.attempts_total.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut durations) = self.attempt_durations.write() {
            durations.push(duration);
        }
    }

    /// Record a run outcome
    pub fn record_outcome(&self, solved: bool) {
        if solved {
            self.solved_total.fetch_add(1, Ordering::Relaxed);
        } else {
            self.gave_up_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a component error by kind
    pub fn record_error(&self, kind: &str) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut breakdown) = self.errors_by_kind.write() {
            *breakdown.entry(kind.to_string()).or_insert(0) += 1;
        }
    }

    /// Copy the current counter values
    pub fn snapshot(&self) -> MetricsSnapshot {
        let errors_by_kind = self
            .errors_by_kind
            .read()
            .map(|m| m.clone())
            .unwrap_or_default();
        let (p50, p95) = self
            .attempt_durations
            .read()
            .map(|d| {
                (
                    d.percentile(0.5).map(|v| v.as_millis() as u64),
                    d.percentile(0.95).map(|v| v.as_millis() as u64),
                )
            })
            .unwrap_or((None, None));

        MetricsSnapshot {
            scans: self.scans_total.load(Ordering::Relaxed),
            challenges_detected: self.challenges_detected_total.load(Ordering::Relaxed),
            ambiguous_detections: self.ambiguous_detections_total.load(Ordering::Relaxed),
            attempts: self.attempts_total.load(Ordering::Relaxed),
            solved: self.solved_total.load(Ordering::Relaxed),
            gave_up: self.gave_up_total.load(Ordering::Relaxed),
            errors: self.errors_total.load(Ordering::Relaxed),
            errors_by_kind,
            attempt_p50_ms: p50,
            attempt_p95_ms: p95,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Global metrics instance, shared by all solver instances in-process
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Get or initialize the global metrics instance
pub fn global_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = Metrics::new();

        metrics.record_scan(true);
        metrics.record_scan(false);
        assert_eq!(metrics.scans_total.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.challenges_detected_total.load(Ordering::Relaxed), 1);

        metrics.record_attempt(Duration::from_millis(40));
        metrics.record_error("client_transport");
        metrics.record_outcome(false);

        let snap = metrics.snapshot();
        assert_eq!(snap.attempts, 1);
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.gave_up, 1);
        assert_eq!(snap.errors_by_kind.get("client_transport"), Some(&1));
    }

    #[test]
    fn test_attempt_percentiles() {
        let metrics = Metrics::new();
        for ms in [10u64, 20, 30, 40, 50, 60, 70, 80, 90, 100] {
            metrics.record_attempt(Duration::from_millis(ms));
        }
        let snap = metrics.snapshot();
        // Rounded-index rank: (9 * 0.5).round() = 5 -> the sixth sample.
        assert_eq!(snap.attempt_p50_ms, Some(60));
        assert_eq!(snap.attempt_p95_ms, Some(100));
    }

    #[test]
    fn test_percentile_with_exact_median() {
        let metrics = Metrics::new();
        for ms in [10u64, 20, 30, 40, 50, 60, 70, 80, 90] {
            metrics.record_attempt(Duration::from_millis(ms));
        }
        // Odd sample count lands on an exact index: (8 * 0.5) = 4.
        assert_eq!(metrics.snapshot().attempt_p50_ms, Some(50));
    }

    #[test]
    fn test_ring_buffer_wraps() {
        let mut buffer = RingBuffer::new(4);
        for i in 0..10u64 {
            buffer.push(i);
        }
        // Only the last 4 samples are retained.
        assert_eq!(buffer.data.len(), 4);
        assert_eq!(buffer.percentile(0.0), Some(6));
        assert_eq!(buffer.percentile(1.0), Some(9));
    }

    #[test]
    fn test_global_metrics_shared() {
        let a = global_metrics() as *const Metrics;
        let b = global_metrics() as *const Metrics;
        assert_eq!(a, b);
    }
}
