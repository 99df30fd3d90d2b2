//! Metrics collaborator
//!
//! The store only ever writes metrics. Deployments plug in their own sink;
//! `MetricsRegistry` keeps everything in memory for tests and the inspection
//! tool, `NoopMetrics` discards everything.

use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::Mutex;

/// Write-only metrics sink
pub trait Metrics: Send + Sync {
    /// Add `delta` to a monotonic counter
    fn increment(&self, name: &str, delta: u64);

    /// Set a gauge (also used for in-flight counts)
    fn gauge(&self, name: &str, value: i64);

    /// Record one observation in a histogram
    fn histogram(&self, name: &str, value: u64);

    /// Record the latency and outcome of a monitored operation
    fn timing(&self, name: &str, elapsed: Duration, success: bool);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn increment(&self, _name: &str, _delta: u64) {}
    fn gauge(&self, _name: &str, _value: i64) {}
    fn histogram(&self, _name: &str, _value: u64) {}
    fn timing(&self, _name: &str, _elapsed: Duration, _success: bool) {}
}

/// Outcome counts and latencies of one monitored operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TimingSummary {
    pub successes: u64,
    pub failures: u64,
    pub total: Duration,
}

/// In-memory metrics registry
///
/// All state sits behind one mutex; contention is irrelevant at the rates
/// the store reports at.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    inner: Mutex<RegistryState>,
}

#[derive(Debug, Default)]
struct RegistryState {
    counters: BTreeMap<String, u64>,
    gauges: BTreeMap<String, i64>,
    histograms: BTreeMap<String, Vec<u64>>,
    timings: BTreeMap<String, TimingSummary>,
}

impl MetricsRegistry {
    /// Create a new registry with nothing recorded
    pub fn new() -> Self {
        Self::default()
    }

    /// Current counter value (0 if never incremented)
    pub fn counter(&self, name: &str) -> u64 {
        self.inner.lock().counters.get(name).copied().unwrap_or(0)
    }

    /// Last value set for a gauge
    pub fn gauge_value(&self, name: &str) -> Option<i64> {
        self.inner.lock().gauges.get(name).copied()
    }

    /// Every observation recorded for a histogram, in order
    pub fn histogram_values(&self, name: &str) -> Vec<u64> {
        self.inner
            .lock()
            .histograms
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Summary of a timed operation
    pub fn timing_summary(&self, name: &str) -> TimingSummary {
        self.inner
            .lock()
            .timings
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Drop all histogram observations (histograms are re-emitted per report)
    pub fn clear_histograms(&self) {
        self.inner.lock().histograms.clear();
    }
}

impl Metrics for MetricsRegistry {
    fn increment(&self, name: &str, delta: u64) {
        *self
            .inner
            .lock()
            .counters
            .entry(name.to_string())
            .or_insert(0) += delta;
    }

    fn gauge(&self, name: &str, value: i64) {
        self.inner.lock().gauges.insert(name.to_string(), value);
    }

    fn histogram(&self, name: &str, value: u64) {
        self.inner
            .lock()
            .histograms
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    fn timing(&self, name: &str, elapsed: Duration, success: bool) {
        let mut inner = self.inner.lock();
        let summary = inner.timings.entry(name.to_string()).or_default();
        if success {
            summary.successes += 1;
        } else {
            summary.failures += 1;
        }
        summary.total += elapsed;
    }
}
