//! Data-plane producer.
//!
//! Wraps a [`BrokerSender`] with close tracking, cancellation, counters and
//! tracing. Batching (linger/byte thresholds) and acknowledgment policy are
//! configured on the sender; `write` resolves once the broker has accepted
//! the message under that policy.

use crate::error::{MessagingError, Result, TransportError};
use crate::message::{Headers, Message};
use crate::middleware::{Metrics, Tracer, noop_tracer};
use crate::transport::BrokerSender;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Tenant-agnostic message producer.
///
/// Safe for concurrent use once constructed. `close` must be called at most
/// once, after in-flight writes have drained.
///
/// # Example
///
/// ```rust,ignore
/// let producer = Producer::new(sender).with_metrics(metrics.clone());
/// let topic = namer.name_for(&tenant, domains::INFER_REQUESTS_V1);
///
/// producer
///     .write(&cancel, topic.as_str(), b"req-1", &headers, &payload)
///     .await?;
/// ```
pub struct Producer<S> {
    sender: S,
    closed: AtomicBool,
    metrics: Arc<Metrics>,
    tracer: Arc<dyn Tracer>,
}

impl<S: BrokerSender> Producer<S> {
    /// Wrap a sender with fresh counters and the no-op tracer.
    #[must_use]
    pub fn new(sender: S) -> Self {
        Self {
            sender,
            closed: AtomicBool::new(false),
            metrics: Arc::new(Metrics::new()),
            tracer: noop_tracer(),
        }
    }

    /// Share counters with other components.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replace the tracer.
    #[must_use]
    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }

    /// The counters this producer updates.
    #[must_use]
    pub const fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Send one message built from its parts.
    ///
    /// # Errors
    ///
    /// See [`Producer::send`].
    pub async fn write(
        &self,
        cancel: &CancellationToken,
        topic: &str,
        key: &[u8],
        headers: &Headers,
        payload: &[u8],
    ) -> Result<()> {
        let message = Message::new(key, payload, headers.clone());
        self.send(cancel, topic, &message).await
    }

    /// Send one message to `topic`.
    ///
    /// No retry is attempted; a [`MessagingError::Publish`] is retryable at
    /// the caller's discretion.
    ///
    /// # Errors
    ///
    /// - [`MessagingError::Closed`] after [`Producer::close`]
    /// - [`MessagingError::Canceled`] if `cancel` fires first
    /// - [`MessagingError::Publish`] on broker or network failure
    pub async fn send(
        &self,
        cancel: &CancellationToken,
        topic: &str,
        message: &Message,
    ) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(MessagingError::Closed("producer"));
        }
        if cancel.is_cancelled() {
            return Err(MessagingError::Canceled);
        }

        let started = Instant::now();
        let span = self.tracer.start("publish", topic);
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(MessagingError::Canceled),
            outcome = self.sender.send(topic, message).instrument(span) => outcome,
        };

        match outcome {
            Ok(()) => {
                self.metrics.inc_produced();
                self.metrics.observe_publish(started.elapsed());
                tracing::debug!(
                    topic,
                    key = %message.key_str(),
                    bytes = message.value.len(),
                    "Message published"
                );
                Ok(())
            },
            Err(TransportError::Closed) => {
                tracing::debug!(topic, "Sender closed underneath producer");
                Err(MessagingError::Closed("producer"))
            },
            Err(error) => {
                self.metrics.inc_errors();
                tracing::error!(topic, error = %error, "Failed to publish message");
                Err(publish_error(topic, &error))
            },
        }
    }

    /// Flush and release the sender.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Closed`] if already closed, or
    /// [`MessagingError::Publish`] if buffered messages could not be flushed.
    /// Buffered messages may span topics, so the error names none.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(MessagingError::Closed("producer"));
        }
        tracing::info!("Closing producer");
        self.sender
            .close()
            .await
            .map_err(|error| {
                tracing::error!(error = %error, "Failed to flush producer on close");
                MessagingError::Publish {
                    topic: FLUSH_TARGET.to_string(),
                    reason: format!("flush on close failed: {error}"),
                }
            })
    }
}

const FLUSH_TARGET: &str = "buffered messages";

fn publish_error(topic: &str, error: &TransportError) -> MessagingError {
    MessagingError::Publish {
        topic: topic.to_string(),
        reason: error.to_string(),
    }
}
