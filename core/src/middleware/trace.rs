//! Pluggable tracing for produce/consume paths.
//!
//! A [`Tracer`] opens a span per operation; the span ends when it is dropped.
//! [`NoopTracer`] is the default and costs nothing.

use std::sync::Arc;
use tracing::Span;

/// Span factory injected into producers and consumers.
pub trait Tracer: Send + Sync {
    /// Start a span for `operation` (e.g. `"publish"`) against `destination`.
    fn start(&self, operation: &'static str, destination: &str) -> Span;
}

/// Tracer that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {
    fn start(&self, _operation: &'static str, _destination: &str) -> Span {
        Span::none()
    }
}

/// Tracer backed by `tracing` spans.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpanTracer;

impl Tracer for SpanTracer {
    fn start(&self, operation: &'static str, destination: &str) -> Span {
        tracing::info_span!("messaging", operation, destination)
    }
}

/// The default tracer.
#[must_use]
pub fn noop_tracer() -> Arc<dyn Tracer> {
    Arc::new(NoopTracer)
}
