//! Outbound Kafka transport.

use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer as _};
use rdkafka::util::Timeout;
use std::time::Duration;
use tenant_messaging_core::config::MessagingConfig;
use tenant_messaging_core::error::{MessagingError, TransportError};
use tenant_messaging_core::message::Message;
use tenant_messaging_core::transport::{BrokerSender, TransportFuture};

/// Kafka-compatible [`BrokerSender`].
///
/// Messages are buffered client-side for up to `linger` or until
/// `batch_bytes` accumulate, whichever comes first. Every send waits for
/// acknowledgment from all in-sync replicas (`acks=all`).
///
/// # Example
///
/// ```no_run
/// use tenant_messaging_redpanda::KafkaSender;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let sender = KafkaSender::builder()
///     .brokers("localhost:9092")
///     .linger(Duration::from_millis(10))
///     .batch_bytes(128 << 10)
///     .compression("lz4")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct KafkaSender {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaSender {
    /// Create a new builder.
    #[must_use]
    pub fn builder() -> KafkaSenderBuilder {
        KafkaSenderBuilder::default()
    }

    /// Build a sender from the shared messaging configuration.
    ///
    /// # Errors
    ///
    /// See [`KafkaSenderBuilder::build`].
    pub fn from_config(config: &MessagingConfig) -> Result<Self, MessagingError> {
        Self::builder()
            .brokers(config.bootstrap_servers())
            .linger(config.linger)
            .batch_bytes(config.batch_bytes)
            .compression(config.compression.clone())
            .idempotent(config.idempotent)
            .timeout(config.send_timeout)
            .build()
    }
}

/// Builder for [`KafkaSender`].
#[derive(Default)]
pub struct KafkaSenderBuilder {
    brokers: Option<String>,
    linger: Option<Duration>,
    batch_bytes: Option<usize>,
    compression: Option<String>,
    idempotent: bool,
    timeout: Option<Duration>,
}

impl KafkaSenderBuilder {
    /// Comma-separated broker addresses.
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Maximum time to buffer before flushing a batch.
    ///
    /// Default: 10ms
    #[must_use]
    pub const fn linger(mut self, linger: Duration) -> Self {
        self.linger = Some(linger);
        self
    }

    /// Batch size that triggers a flush.
    ///
    /// Default: 128 KiB
    #[must_use]
    pub const fn batch_bytes(mut self, batch_bytes: usize) -> Self {
        self.batch_bytes = Some(batch_bytes);
        self
    }

    /// Compression codec: "none", "gzip", "snappy", "lz4", "zstd".
    ///
    /// Default: "none"
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Ask the client for idempotent production.
    #[must_use]
    pub const fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    /// Upper bound on one send, acknowledgment included.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the [`KafkaSender`].
    ///
    /// # Errors
    ///
    /// - [`MessagingError::Config`] if brokers are not set or a value is out of range
    /// - [`MessagingError::Connection`] if the client cannot be created
    pub fn build(self) -> Result<KafkaSender, MessagingError> {
        let brokers = self
            .brokers
            .filter(|brokers| !brokers.is_empty())
            .ok_or_else(|| MessagingError::Config("Brokers not configured".to_string()))?;
        let linger = self.linger.unwrap_or(Duration::from_millis(10));
        let batch_bytes = self.batch_bytes.unwrap_or(128 << 10);
        let compression = self.compression.unwrap_or_else(|| "none".to_string());
        let timeout = self.timeout.unwrap_or(Duration::from_secs(5));

        if batch_bytes == 0 {
            return Err(MessagingError::Config("batch bytes must be > 0".to_string()));
        }
        if timeout.is_zero() {
            return Err(MessagingError::Config("send timeout must be > 0".to_string()));
        }

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("acks", "all")
            .set("linger.ms", linger.as_millis().to_string())
            .set("batch.size", batch_bytes.to_string())
            .set("compression.type", &compression)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("enable.idempotence", self.idempotent.to_string())
            .create()
            .map_err(|e| MessagingError::Connection(format!("Failed to create producer: {e}")))?;

        tracing::info!(
            brokers = %brokers,
            acks = "all",
            linger_ms = linger.as_millis(),
            batch_bytes,
            compression = %compression,
            idempotent = self.idempotent,
            "KafkaSender created successfully"
        );

        Ok(KafkaSender { producer, timeout })
    }
}

impl BrokerSender for KafkaSender {
    fn send<'a>(&'a self, topic: &'a str, message: &'a Message) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let mut headers = OwnedHeaders::new_with_capacity(message.headers.len());
            for (key, value) in &message.headers {
                headers = headers.insert(Header {
                    key: key.as_str(),
                    value: Some(value.as_bytes()),
                });
            }

            let record = FutureRecord::to(topic)
                .key(&message.key)
                .payload(&message.value)
                .headers(headers);

            match self.producer.send(record, Timeout::After(self.timeout)).await {
                Ok((partition, offset)) => {
                    tracing::trace!(topic, partition, offset, "Record acknowledged");
                    Ok(())
                },
                Err((kafka_error, _)) => Err(TransportError::Unavailable(kafka_error.to_string())),
            }
        })
    }

    fn close(&self) -> TransportFuture<'_, ()> {
        let producer = self.producer.clone();
        let timeout = self.timeout;
        Box::pin(async move {
            // flush() blocks on librdkafka; keep it off the async workers.
            tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout)))
                .await
                .map_err(|e| TransportError::Unavailable(format!("flush task failed: {e}")))?
                .map_err(|e| TransportError::Unavailable(format!("flush failed: {e}")))
        })
    }
}
