//! Delivery middleware: duplicate suppression, counters and tracing.

pub mod dedupe;
pub mod metrics;
pub mod trace;

pub use dedupe::Dedupe;
pub use self::metrics::{LatencyPercentiles, Metrics, MetricsSnapshot, describe_metrics};
pub use trace::{NoopTracer, SpanTracer, Tracer, noop_tracer};
