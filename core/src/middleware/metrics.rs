//! Produced/consumed/error counters.
//!
//! Counters are lock-free atomics that only ever grow. Each increment is also
//! forwarded to the [`metrics`] facade so a Prometheus exporter can scrape
//! them. Raw latencies go to histograms; the percentile fields of
//! [`MetricsSnapshot`] are filled in by whatever collector aggregates those
//! histograms, never computed here.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Counter name for produced messages.
pub const PRODUCED_TOTAL: &str = "messaging_messages_produced_total";
/// Counter name for consumed messages.
pub const CONSUMED_TOTAL: &str = "messaging_messages_consumed_total";
/// Counter name for produce/consume failures.
pub const ERRORS_TOTAL: &str = "messaging_errors_total";
/// Counter name for messages skipped by the dedupe window.
pub const DUPLICATES_TOTAL: &str = "messaging_duplicates_suppressed_total";
/// Histogram name for publish latency.
pub const PUBLISH_DURATION: &str = "messaging_publish_duration_seconds";
/// Histogram name for fetch latency.
pub const FETCH_DURATION: &str = "messaging_fetch_duration_seconds";

/// Register metric descriptions with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(PRODUCED_TOTAL, "Total number of messages produced");
    describe_counter!(CONSUMED_TOTAL, "Total number of messages consumed");
    describe_counter!(ERRORS_TOTAL, "Total number of produce/consume errors");
    describe_counter!(
        DUPLICATES_TOTAL,
        "Total number of consumed messages skipped as duplicates"
    );
    describe_histogram!(PUBLISH_DURATION, "Time taken to publish a message");
    describe_histogram!(FETCH_DURATION, "Time spent waiting for a message");
}

/// Latency percentiles reported by an external collector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencyPercentiles {
    /// Median
    pub p50: Duration,
    /// 95th percentile
    pub p95: Duration,
    /// 99th percentile
    pub p99: Duration,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Messages produced
    pub produced: u64,
    /// Messages consumed
    pub consumed: u64,
    /// Errors observed
    pub errors: u64,
    /// Last percentiles recorded by the collector
    pub latency: LatencyPercentiles,
}

/// Shared messaging counters.
#[derive(Debug, Default)]
pub struct Metrics {
    produced: AtomicU64,
    consumed: AtomicU64,
    errors: AtomicU64,
    latency: Mutex<LatencyPercentiles>,
}

impl Metrics {
    /// Create zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one produced message.
    pub fn inc_produced(&self) {
        self.produced.fetch_add(1, Ordering::Relaxed);
        counter!(PRODUCED_TOTAL).increment(1);
    }

    /// Count one consumed message.
    pub fn inc_consumed(&self) {
        self.consumed.fetch_add(1, Ordering::Relaxed);
        counter!(CONSUMED_TOTAL).increment(1);
    }

    /// Count one error.
    pub fn inc_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        counter!(ERRORS_TOTAL).increment(1);
    }

    /// Count one message skipped by the dedupe window.
    pub fn inc_duplicates(&self) {
        counter!(DUPLICATES_TOTAL).increment(1);
    }

    /// Record a publish latency sample.
    pub fn observe_publish(&self, elapsed: Duration) {
        histogram!(PUBLISH_DURATION).record(elapsed.as_secs_f64());
    }

    /// Record a fetch latency sample.
    pub fn observe_fetch(&self, elapsed: Duration) {
        histogram!(FETCH_DURATION).record(elapsed.as_secs_f64());
    }

    /// Store percentiles computed by an external collector.
    pub fn record_percentiles(&self, latency: LatencyPercentiles) {
        *self.latency.lock().unwrap_or_else(PoisonError::into_inner) = latency;
    }

    /// Read the current counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            produced: self.produced.load(Ordering::Relaxed),
            consumed: self.consumed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            latency: *self.latency.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }
}
