//! Data-plane consumer.
//!
//! Bound at construction to one topic and one consumer group. Group
//! membership, rebalancing and the start position (earliest retained offset
//! on first join) belong to the [`BrokerReceiver`].

use crate::error::{MessagingError, Result, TransportError};
use crate::message::Message;
use crate::middleware::{Dedupe, Metrics, Tracer, noop_tracer};
use crate::transport::BrokerReceiver;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Stream of fetched messages.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<Message>> + Send>>;

/// Tenant-agnostic message consumer.
pub struct Consumer<R> {
    receiver: R,
    closed: AtomicBool,
    metrics: Arc<Metrics>,
    tracer: Arc<dyn Tracer>,
    dedupe: Option<Arc<Dedupe>>,
}

impl<R: BrokerReceiver> Consumer<R> {
    /// Wrap a receiver with fresh counters, the no-op tracer and no dedupe.
    #[must_use]
    pub fn new(receiver: R) -> Self {
        tracing::info!(
            topic = receiver.topic(),
            group = receiver.group(),
            "Consumer bound"
        );
        Self {
            receiver,
            closed: AtomicBool::new(false),
            metrics: Arc::new(Metrics::new()),
            tracer: noop_tracer(),
            dedupe: None,
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

    /// Skip messages whose key was already delivered within the dedupe window.
    #[must_use]
    pub fn with_dedupe(mut self, dedupe: Arc<Dedupe>) -> Self {
        self.dedupe = Some(dedupe);
        self
    }

    /// The bound topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        self.receiver.topic()
    }

    /// The consumer group.
    #[must_use]
    pub fn group(&self) -> &str {
        self.receiver.group()
    }

    /// The counters this consumer updates.
    #[must_use]
    pub const fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Wait for the next message.
    ///
    /// When a dedupe window is attached, duplicates are consumed from the
    /// broker and skipped; the call keeps waiting for the next new key.
    ///
    /// # Errors
    ///
    /// - [`MessagingError::Closed`] after [`Consumer::close`] or once the
    ///   receiver itself was shut down
    /// - [`MessagingError::Canceled`] if `cancel` fires first
    /// - [`MessagingError::Fetch`] on broker or network failure
    pub async fn fetch(&self, cancel: &CancellationToken) -> Result<Message> {
        loop {
            let message = self.fetch_one(cancel).await?;
            match &self.dedupe {
                Some(dedupe) if !dedupe.allow(&message.key_str()) => {
                    self.metrics.inc_duplicates();
                    tracing::debug!(
                        topic = self.topic(),
                        key = %message.key_str(),
                        "Skipping duplicate message"
                    );
                },
                _ => return Ok(message),
            }
        }
    }

    async fn fetch_one(&self, cancel: &CancellationToken) -> Result<Message> {
        if self.closed.load(Ordering::Acquire) {
            return Err(MessagingError::Closed("consumer"));
        }
        if cancel.is_cancelled() {
            return Err(MessagingError::Canceled);
        }

        let started = Instant::now();
        let span = self.tracer.start("fetch", self.topic());
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(MessagingError::Canceled),
            outcome = self.receiver.receive().instrument(span) => outcome,
        };

        match outcome {
            Ok(message) => {
                self.metrics.inc_consumed();
                self.metrics.observe_fetch(started.elapsed());
                tracing::debug!(
                    topic = self.topic(),
                    key = %message.key_str(),
                    headers = message.headers.len(),
                    "Message fetched"
                );
                Ok(message)
            },
            Err(TransportError::Closed) => {
                tracing::debug!(topic = self.topic(), "Receiver closed underneath consumer");
                Err(MessagingError::Closed("consumer"))
            },
            Err(error) => {
                self.metrics.inc_errors();
                tracing::error!(topic = self.topic(), error = %error, "Failed to fetch message");
                Err(self.fetch_error(&error))
            },
        }
    }

    /// Release the receiver.
    ///
    /// A second call returns [`MessagingError::Closed`], which callers may ignore.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Closed`] if already closed, or
    /// [`MessagingError::Fetch`] if the receiver failed to shut down cleanly.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(MessagingError::Closed("consumer"));
        }
        tracing::info!(topic = self.topic(), group = self.group(), "Closing consumer");
        self.receiver
            .close()
            .await
            .map_err(|error| self.fetch_error(&error))
    }

    fn fetch_error(&self, error: &TransportError) -> MessagingError {
        MessagingError::Fetch {
            topic: self.topic().to_string(),
            reason: error.to_string(),
        }
    }
}

impl<R: BrokerReceiver + 'static> Consumer<R> {
    /// Turn the consumer into a stream of messages.
    ///
    /// Transport errors are yielded and the stream keeps going; it ends when
    /// `cancel` fires or the consumer is closed.
    #[must_use]
    pub fn into_stream(self, cancel: CancellationToken) -> MessageStream {
        let stream = async_stream::stream! {
            loop {
                match self.fetch(&cancel).await {
                    Err(MessagingError::Canceled | MessagingError::Closed(_)) => break,
                    result => yield result,
                }
            }
            tracing::debug!(topic = self.topic(), "Consumer stream ended");
        };
        Box::pin(stream)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::message::Headers;
    use crate::transport::TransportFuture;
    use futures::StreamExt;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays queued outcomes, then blocks forever.
    #[derive(Default)]
    struct QueuedReceiver {
        queue: Mutex<VecDeque<std::result::Result<Message, TransportError>>>,
    }

    impl QueuedReceiver {
        fn with(outcomes: Vec<std::result::Result<Message, TransportError>>) -> Self {
            Self {
                queue: Mutex::new(outcomes.into()),
            }
        }
    }

    impl BrokerReceiver for QueuedReceiver {
        fn topic(&self) -> &str {
            "llm.acme.infer.results.v1"
        }

        fn group(&self) -> &str {
            "llm-server"
        }

        fn receive(&self) -> TransportFuture<'_, Message> {
            Box::pin(async move {
                let next = self.queue.lock().unwrap().pop_front();
                match next {
                    Some(outcome) => outcome,
                    None => std::future::pending().await,
                }
            })
        }

        fn close(&self) -> TransportFuture<'_, ()> {
            Box::pin(async { Ok(()) })
        }
    }

    fn message(key: &str) -> Message {
        Message::new(key, "{}", Headers::new())
    }

    #[tokio::test]
    async fn fetch_returns_message_and_counts_it() {
        let consumer = Consumer::new(QueuedReceiver::with(vec![Ok(message("req-1"))]));

        let fetched = consumer.fetch(&CancellationToken::new()).await.unwrap();
        assert_eq!(fetched.key, b"req-1");
        assert_eq!(consumer.metrics().snapshot().consumed, 1);
    }

    #[tokio::test]
    async fn dedupe_skips_repeated_keys_within_window() {
        let consumer = Consumer::new(QueuedReceiver::with(vec![
            Ok(message("a")),
            Ok(message("a")),
            Ok(message("b")),
        ]))
        .with_dedupe(Arc::new(Dedupe::new(Duration::from_secs(60))));
        let cancel = CancellationToken::new();

        assert_eq!(consumer.fetch(&cancel).await.unwrap().key, b"a");
        assert_eq!(consumer.fetch(&cancel).await.unwrap().key, b"b");
        assert_eq!(consumer.metrics().snapshot().consumed, 3);
    }

    #[tokio::test]
    async fn transport_failure_is_a_fetch_error_naming_the_topic() {
        let consumer = Consumer::new(QueuedReceiver::with(vec![Err(
            TransportError::Unavailable("leader not available".to_string()),
        )]));

        let result = consumer.fetch(&CancellationToken::new()).await;
        assert!(matches!(
            result,
            Err(MessagingError::Fetch { ref topic, .. }) if topic == "llm.acme.infer.results.v1"
        ));
        assert_eq!(consumer.metrics().snapshot().errors, 1);
    }

    #[tokio::test]
    async fn closed_receiver_reads_as_closed_consumer() {
        let consumer = Consumer::new(QueuedReceiver::with(vec![Err(TransportError::Closed)]));

        assert_eq!(
            consumer.fetch(&CancellationToken::new()).await,
            Err(MessagingError::Closed("consumer"))
        );
        assert_eq!(consumer.metrics().snapshot().errors, 0);
    }

    #[tokio::test]
    async fn already_canceled_token_fails_without_receiving() {
        let consumer = Consumer::new(QueuedReceiver::with(vec![Ok(message("kept"))]));
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(consumer.fetch(&cancel).await, Err(MessagingError::Canceled));
        assert_eq!(consumer.receiver.queue.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stream_passes_errors_through_and_stops_on_cancel() {
        let consumer = Consumer::new(QueuedReceiver::with(vec![
            Ok(message("a")),
            Err(TransportError::Unavailable("blip".to_string())),
            Ok(message("b")),
        ]));
        let cancel = CancellationToken::new();
        let mut stream = consumer.into_stream(cancel.clone());

        assert_eq!(stream.next().await.unwrap().unwrap().key, b"a");
        assert!(matches!(
            stream.next().await.unwrap(),
            Err(MessagingError::Fetch { .. })
        ));
        assert_eq!(stream.next().await.unwrap().unwrap().key, b"b");

        cancel.cancel();
        assert!(stream.next().await.is_none());
    }
}
