//! Inbound Kafka transport.

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer as _, StreamConsumer};
use rdkafka::message::{Headers as _, Message as _};
use tenant_messaging_core::config::MessagingConfig;
use tenant_messaging_core::error::{MessagingError, TransportError};
use tenant_messaging_core::message::{Message, normalize_headers};
use tenant_messaging_core::transport::{BrokerReceiver, TransportFuture};

/// Kafka-compatible [`BrokerReceiver`] bound to one topic and consumer group.
///
/// A group joining for the first time starts from the earliest retained
/// offset, so no backlog is skipped. Offsets are auto-committed, but only
/// for messages already handed to the caller (at-least-once).
///
/// # Example
///
/// ```no_run
/// use tenant_messaging_redpanda::KafkaReceiver;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let receiver = KafkaReceiver::builder()
///     .brokers("localhost:9092")
///     .topic("llm.acme.infer.requests.v1")
///     .group_id("inference-workers")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct KafkaReceiver {
    consumer: StreamConsumer,
    topic: String,
    group: String,
}

impl KafkaReceiver {
    /// Create a new builder.
    #[must_use]
    pub fn builder() -> KafkaReceiverBuilder {
        KafkaReceiverBuilder::default()
    }

    /// Build a receiver for `topic` from the shared messaging configuration.
    ///
    /// # Errors
    ///
    /// See [`KafkaReceiverBuilder::build`].
    pub fn from_config(config: &MessagingConfig, topic: &str) -> Result<Self, MessagingError> {
        Self::builder()
            .brokers(config.bootstrap_servers())
            .topic(topic)
            .group_id(config.consumer_group.clone())
            .min_bytes(config.consumer_min_bytes)
            .max_bytes(config.consumer_max_bytes)
            .build()
    }
}

/// Builder for [`KafkaReceiver`].
#[derive(Default)]
pub struct KafkaReceiverBuilder {
    brokers: Option<String>,
    topic: Option<String>,
    group_id: Option<String>,
    min_bytes: Option<usize>,
    max_bytes: Option<usize>,
    session_timeout_ms: Option<u32>,
}

impl KafkaReceiverBuilder {
    /// Comma-separated broker addresses.
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// The topic to consume.
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// The consumer group to join.
    #[must_use]
    pub fn group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Minimum bytes the broker accumulates before answering a fetch.
    ///
    /// Default: 1
    #[must_use]
    pub const fn min_bytes(mut self, min_bytes: usize) -> Self {
        self.min_bytes = Some(min_bytes);
        self
    }

    /// Maximum bytes returned by one fetch.
    ///
    /// Default: 10 MiB
    #[must_use]
    pub const fn max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    /// Group session timeout in milliseconds.
    ///
    /// Default: 6000
    #[must_use]
    pub const fn session_timeout_ms(mut self, session_timeout_ms: u32) -> Self {
        self.session_timeout_ms = Some(session_timeout_ms);
        self
    }

    /// Build the [`KafkaReceiver`] and subscribe to the topic.
    ///
    /// # Errors
    ///
    /// - [`MessagingError::Config`] if brokers, topic or group are missing
    /// - [`MessagingError::Connection`] if the client cannot be created or subscribed
    pub fn build(self) -> Result<KafkaReceiver, MessagingError> {
        let required = |value: Option<String>, what: &str| {
            value
                .filter(|value| !value.is_empty())
                .ok_or_else(|| MessagingError::Config(format!("{what} not configured")))
        };
        let brokers = required(self.brokers, "Brokers")?;
        let topic = required(self.topic, "Topic")?;
        let group = required(self.group_id, "Consumer group")?;
        let min_bytes = self.min_bytes.unwrap_or(1);
        let max_bytes = self.max_bytes.unwrap_or(10 << 20);

        if min_bytes > max_bytes {
            return Err(MessagingError::Config(format!(
                "min bytes ({min_bytes}) exceeds max bytes ({max_bytes})"
            )));
        }

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("group.id", &group)
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false") // Stored once handed to the caller
            .set("enable.partition.eof", "false")
            .set("fetch.min.bytes", min_bytes.to_string())
            .set("fetch.max.bytes", max_bytes.to_string())
            .set("topic.metadata.refresh.interval.ms", "1000")
            .set(
                "session.timeout.ms",
                self.session_timeout_ms.unwrap_or(6000).to_string(),
            )
            .create()
            .map_err(|e| MessagingError::Connection(format!("Failed to create consumer: {e}")))?;

        consumer.subscribe(&[topic.as_str()]).map_err(|e| {
            MessagingError::Connection(format!("Failed to subscribe to '{topic}': {e}"))
        })?;

        tracing::info!(
            brokers = %brokers,
            topic = %topic,
            consumer_group = %group,
            auto_offset_reset = "earliest",
            min_bytes,
            max_bytes,
            "KafkaReceiver subscribed"
        );

        Ok(KafkaReceiver {
            consumer,
            topic,
            group,
        })
    }
}

impl BrokerReceiver for KafkaReceiver {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn group(&self) -> &str {
        &self.group
    }

    fn receive(&self) -> TransportFuture<'_, Message> {
        Box::pin(async move {
            let borrowed = self
                .consumer
                .recv()
                .await
                .map_err(|e| TransportError::Unavailable(format!("Failed to receive message: {e}")))?;

            let headers = borrowed
                .headers()
                .map(|headers| {
                    normalize_headers(headers.iter().map(|header| (header.key, header.value)))
                })
                .unwrap_or_default();
            let message = Message::new(
                borrowed.key().unwrap_or_default(),
                borrowed.payload().unwrap_or_default(),
                headers,
            );

            tracing::trace!(
                topic = borrowed.topic(),
                partition = borrowed.partition(),
                offset = borrowed.offset(),
                "Received record"
            );

            if let Err(e) = self.consumer.store_offset_from_message(&borrowed) {
                tracing::warn!(
                    topic = borrowed.topic(),
                    partition = borrowed.partition(),
                    offset = borrowed.offset(),
                    error = %e,
                    "Failed to store offset (message may be redelivered)"
                );
            }

            Ok(message)
        })
    }

    fn close(&self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            self.consumer.unsubscribe();
            tracing::debug!(topic = %self.topic, group = %self.group, "Left consumer group");
            Ok(())
        })
    }
}
