//! Transport abstraction at the collaborator edge.
//!
//! The broker and the control-plane server are opaque dependencies. This
//! module defines the only primitives the messaging layer needs from them;
//! connection management, partition assignment, rebalancing and offset
//! commits all stay inside the adapter.
//!
//! # Implementations
//!
//! - `KafkaSender` / `KafkaReceiver` (crate `tenant-messaging-redpanda`)
//! - `NatsControlTransport` (crate `tenant-messaging-nats`)
//! - `InMemoryBroker` / `InMemoryControlPlane` (crate `tenant-messaging-testing`)
//!
//! # Dyn Compatibility
//!
//! Methods return boxed futures instead of `async fn` so the traits can be
//! used as `Arc<dyn BrokerSender>` and friends.

use crate::error::TransportError;
use crate::message::Message;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Boxed future returned by transport primitives.
pub type TransportFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// Outbound half of the broker.
pub trait BrokerSender: Send + Sync {
    /// Send one message and resolve once the broker accepted it under the
    /// adapter's durability settings.
    fn send<'a>(&'a self, topic: &'a str, message: &'a Message) -> TransportFuture<'a, ()>;

    /// Flush buffered messages and release client resources.
    fn close(&self) -> TransportFuture<'_, ()>;
}

/// Inbound half of the broker, bound to one topic and one consumer group.
pub trait BrokerReceiver: Send + Sync {
    /// The bound topic.
    fn topic(&self) -> &str;

    /// The consumer group.
    fn group(&self) -> &str;

    /// Wait for the next message.
    ///
    /// Dropping the returned future must not lose a message.
    fn receive(&self) -> TransportFuture<'_, Message>;

    /// Leave the group and release client resources.
    fn close(&self) -> TransportFuture<'_, ()>;
}

/// Request/reply and durable publish for operational signaling.
pub trait ControlTransport: Send + Sync {
    /// Send a request and wait up to `timeout` for the first reply.
    fn request<'a>(
        &'a self,
        subject: &'a str,
        payload: &'a [u8],
        timeout: Duration,
    ) -> TransportFuture<'a, Vec<u8>>;

    /// Publish to a persistent stream and resolve once it is stored.
    fn publish_durable<'a>(&'a self, subject: &'a str, payload: &'a [u8])
    -> TransportFuture<'a, ()>;

    /// Release the connection.
    fn close(&self) -> TransportFuture<'_, ()>;
}

impl<T: BrokerSender + ?Sized> BrokerSender for Arc<T> {
    fn send<'a>(&'a self, topic: &'a str, message: &'a Message) -> TransportFuture<'a, ()> {
        (**self).send(topic, message)
    }

    fn close(&self) -> TransportFuture<'_, ()> {
        (**self).close()
    }
}

impl<T: BrokerReceiver + ?Sized> BrokerReceiver for Arc<T> {
    fn topic(&self) -> &str {
        (**self).topic()
    }

    fn group(&self) -> &str {
        (**self).group()
    }

    fn receive(&self) -> TransportFuture<'_, Message> {
        (**self).receive()
    }

    fn close(&self) -> TransportFuture<'_, ()> {
        (**self).close()
    }
}

impl<T: ControlTransport + ?Sized> ControlTransport for Arc<T> {
    fn request<'a>(
        &'a self,
        subject: &'a str,
        payload: &'a [u8],
        timeout: Duration,
    ) -> TransportFuture<'a, Vec<u8>> {
        (**self).request(subject, payload, timeout)
    }

    fn publish_durable<'a>(
        &'a self,
        subject: &'a str,
        payload: &'a [u8],
    ) -> TransportFuture<'a, ()> {
        (**self).publish_durable(subject, payload)
    }

    fn close(&self) -> TransportFuture<'_, ()> {
        (**self).close()
    }
}
