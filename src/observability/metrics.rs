//! Per-operation metrics.
//!
//! Provides counters, gauges, and histograms, and [`OperationMetrics`], the
//! bundle the [`Monitor`](super::Monitor) keeps for every named operation.
//! Unlike the ledger, these are all-time figures: they are not subject to
//! FIFO eviction and only [`Monitor::clear`](super::Monitor::clear) resets
//! them.

use crate::error::FailureKind;
use crate::types::Outcome;
use core::fmt;
use serde::Serialize;

/// A monotonically increasing counter.
#[derive(Debug, Clone)]
pub struct Counter {
    name: String,
    value: u64,
}

impl Counter {
    /// Creates a new counter with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: 0,
        }
    }

    /// Returns the counter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.value
    }

    /// Increments the counter by 1.
    pub fn inc(&mut self) {
        self.value = self.value.saturating_add(1);
    }

    /// Resets the counter to zero.
    pub fn reset(&mut self) {
        self.value = 0;
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// A gauge that can increase or decrease.
#[derive(Debug, Clone)]
pub struct Gauge {
    name: String,
    value: i64,
}

impl Gauge {
    /// Creates a new gauge with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: 0,
        }
    }

    /// Returns the current value.
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.value
    }

    /// Increments the gauge by 1.
    pub fn inc(&mut self) {
        self.value = self.value.saturating_add(1);
    }

    /// Decrements the gauge by 1, never below zero.
    pub fn dec(&mut self) {
        if self.value > 0 {
            self.value -= 1;
        }
    }

    /// Sets the gauge to zero.
    pub fn reset(&mut self) {
        self.value = 0;
    }
}

impl fmt::Display for Gauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Latency bucket bounds, in milliseconds.
pub const LATENCY_BUCKETS_MS: [f64; 10] = [
    1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0,
];

/// A histogram for tracking value distributions.
#[derive(Debug, Clone)]
pub struct Histogram {
    name: String,
    /// Bucket upper bounds.
    buckets: Vec<f64>,
    /// Counts per bucket (includes +Inf bucket at end).
    counts: Vec<u64>,
    sum: f64,
    count: u64,
}

impl Histogram {
    /// Creates a new histogram with the given bucket boundaries.
    ///
    /// Buckets should be sorted in ascending order. An implicit +Inf bucket
    /// is added automatically.
    #[must_use]
    pub fn new(name: impl Into<String>, buckets: Vec<f64>) -> Self {
        let count_len = buckets.len() + 1;
        Self {
            name: name.into(),
            buckets,
            counts: vec![0; count_len],
            sum: 0.0,
            count: 0,
        }
    }

    /// Creates a histogram with the default latency buckets (milliseconds).
    #[must_use]
    pub fn with_latency_buckets(name: impl Into<String>) -> Self {
        Self::new(name, LATENCY_BUCKETS_MS.to_vec())
    }

    /// Records a value.
    pub fn observe(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
        let index = self
            .buckets
            .iter()
            .position(|&bound| value <= bound)
            .unwrap_or(self.buckets.len());
        self.counts[index] += 1;
    }

    /// Sum of all observed values.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Number of observations.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Mean of observed values, zero when empty.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    /// Bucket upper bounds.
    #[must_use]
    pub fn buckets(&self) -> &[f64] {
        &self.buckets
    }

    /// Counts per bucket; the last entry is the +Inf bucket.
    #[must_use]
    pub fn bucket_counts(&self) -> &[u64] {
        &self.counts
    }

    /// Resets the histogram.
    pub fn reset(&mut self) {
        self.counts.fill(0);
        self.sum = 0.0;
        self.count = 0;
    }
}

impl fmt::Display for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} count={} sum={:.2}", self.name, self.count, self.sum)
    }
}

/// All-time counts for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct OperationCounters {
    /// Invocations started or recorded.
    pub calls: u64,
    /// Settles that were failures of any kind.
    pub failures: u64,
    /// Failures that were cancellations.
    pub cancellations: u64,
    /// Invocations started but not yet settled.
    pub in_flight: i64,
}

/// The metric bundle kept per operation.
#[derive(Debug, Clone)]
pub struct OperationMetrics {
    calls: Counter,
    failures: Counter,
    cancellations: Counter,
    in_flight: Gauge,
    latency_ms: Histogram,
}

impl Default for OperationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationMetrics {
    /// Creates empty metrics.
    #[must_use]
    pub fn new() -> Self {
        Self {
            calls: Counter::new("calls"),
            failures: Counter::new("failures"),
            cancellations: Counter::new("cancellations"),
            in_flight: Gauge::new("in_flight"),
            latency_ms: Histogram::with_latency_buckets("latency_ms"),
        }
    }

    /// Notes an invocation that has started but not settled.
    pub fn start(&mut self) {
        self.calls.inc();
        self.in_flight.inc();
    }

    /// Notes a settle of an invocation previously passed to [`start`](Self::start).
    pub fn finish(&mut self, outcome: &Outcome) {
        self.in_flight.dec();
        self.observe(outcome);
    }

    /// Notes a settle with no matching [`start`](Self::start).
    pub fn record(&mut self, outcome: &Outcome) {
        self.calls.inc();
        self.observe(outcome);
    }

    fn observe(&mut self, outcome: &Outcome) {
        self.latency_ms.observe(outcome.duration_ms());
        if let Some(failure) = outcome.failure() {
            self.failures.inc();
            if failure.kind() == FailureKind::Cancelled {
                self.cancellations.inc();
            }
        }
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn counters(&self) -> OperationCounters {
        OperationCounters {
            calls: self.calls.value(),
            failures: self.failures.value(),
            cancellations: self.cancellations.value(),
            in_flight: self.in_flight.value(),
        }
    }

    /// The latency histogram.
    #[must_use]
    pub fn latency(&self) -> &Histogram {
        &self.latency_ms
    }

    /// Resets every metric.
    pub fn reset(&mut self) {
        self.calls.reset();
        self.failures.reset();
        self.cancellations.reset();
        self.in_flight.reset();
        self.latency_ms.reset();
    }
}

impl fmt::Display for OperationMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.calls)?;
        writeln!(f, "{}", self.failures)?;
        writeln!(f, "{}", self.cancellations)?;
        writeln!(f, "{}", self.in_flight)?;
        write!(f, "{}", self.latency_ms)
    }
}
