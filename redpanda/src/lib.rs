//! Redpanda/Kafka broker transport for tenant-aware messaging.
//!
//! This crate implements the [`BrokerSender`] and [`BrokerReceiver`] traits
//! from `tenant-messaging-core` on top of rdkafka, so any Kafka-compatible
//! broker (Redpanda, Apache Kafka, MSK, ...) can carry the data plane.
//!
//! # Delivery Semantics
//!
//! - **Producer**: `acks=all`, batched by `linger.ms` / `batch.size`
//! - **Consumer**: consumer-group membership and rebalancing owned by the
//!   broker; first join starts from the earliest retained offset
//! - **At-least-once**: offsets are stored only after a message has been
//!   handed to the caller, so a crash can redeliver but never skip
//!
//! # Example
//!
//! ```no_run
//! use tenant_messaging_core::{CancellationToken, Consumer, Headers, MessagingConfig, Producer, TopicNamer};
//! use tenant_messaging_core::topic::domains;
//! use tenant_messaging_redpanda::{KafkaReceiver, KafkaSender};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MessagingConfig::from_env()?;
//! let topic = TopicNamer::new(config.tenancy.clone()).name("acme", domains::INFER_REQUESTS_V1);
//!
//! let producer = Producer::new(KafkaSender::from_config(&config)?);
//! let consumer = Consumer::new(KafkaReceiver::from_config(&config, topic.as_str())?);
//!
//! let cancel = CancellationToken::new();
//! producer.write(&cancel, topic.as_str(), b"req-1", &Headers::new(), b"{}").await?;
//! let message = consumer.fetch(&cancel).await?;
//! assert_eq!(message.key, b"req-1");
//! # Ok(())
//! # }
//! ```
//!
//! [`BrokerSender`]: tenant_messaging_core::transport::BrokerSender
//! [`BrokerReceiver`]: tenant_messaging_core::transport::BrokerReceiver

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod receiver;
mod sender;

pub use receiver::{KafkaReceiver, KafkaReceiverBuilder};
pub use sender::{KafkaSender, KafkaSenderBuilder};
