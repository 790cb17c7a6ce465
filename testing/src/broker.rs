//! In-memory broker.
//!
//! Every topic is an append-only log. Each `(topic, group)` pair owns one
//! offset starting at zero, so a new group reads the whole backlog and
//! receivers sharing a group compete for messages, as on a real broker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tenant_messaging_core::error::TransportError;
use tenant_messaging_core::message::Message;
use tenant_messaging_core::transport::{BrokerReceiver, BrokerSender, TransportFuture};
use tokio::sync::Notify;

#[derive(Default)]
struct State {
    logs: HashMap<String, Vec<Message>>,
    offsets: HashMap<(String, String), usize>,
    unavailable: bool,
    failing_sends: usize,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    appended: Notify,
}

/// In-memory broker for fast, deterministic tests.
///
/// # Example
///
/// ```
/// use tenant_messaging_core::{CancellationToken, Consumer, Headers, Producer};
/// use tenant_messaging_testing::InMemoryBroker;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let broker = InMemoryBroker::new();
/// let producer = Producer::new(broker.sender());
/// let consumer = Consumer::new(broker.receiver("llm.main.infer.requests.v1", "workers"));
///
/// let cancel = CancellationToken::new();
/// producer.write(&cancel, "llm.main.infer.requests.v1", b"req-1", &Headers::new(), b"{}").await?;
/// assert_eq!(consumer.fetch(&cancel).await?.key, b"req-1");
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl InMemoryBroker {
    /// Create an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A sender writing into this broker.
    #[must_use]
    pub fn sender(&self) -> InMemorySender {
        InMemorySender {
            broker: self.clone(),
            closed: AtomicBool::new(false),
        }
    }

    /// A receiver bound to `topic` as a member of `group`.
    #[must_use]
    pub fn receiver(&self, topic: impl Into<String>, group: impl Into<String>) -> InMemoryReceiver {
        InMemoryReceiver {
            broker: self.clone(),
            topic: topic.into(),
            group: group.into(),
            closed: AtomicBool::new(false),
        }
    }

    /// Everything written to `topic` so far, in order.
    #[must_use]
    pub fn messages(&self, topic: &str) -> Vec<Message> {
        self.lock().logs.get(topic).cloned().unwrap_or_default()
    }

    /// Number of messages written to `topic`.
    #[must_use]
    pub fn len(&self, topic: &str) -> usize {
        self.lock().logs.get(topic).map_or(0, Vec::len)
    }

    /// Names of every topic written to.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.lock().logs.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Make every send fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Make the next `count` sends fail.
    pub fn fail_next_sends(&self, count: usize) {
        self.lock().failing_sends = count;
    }

    #[allow(clippy::unwrap_used)] // Test infrastructure
    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.shared.state.lock().unwrap()
    }
}

/// Outbound half of [`InMemoryBroker`].
pub struct InMemorySender {
    broker: InMemoryBroker,
    closed: AtomicBool,
}

impl BrokerSender for InMemorySender {
    fn send<'a>(&'a self, topic: &'a str, message: &'a Message) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            if self.closed.load(Ordering::Acquire) {
                return Err(TransportError::Closed);
            }
            {
                let mut state = self.broker.lock();
                if state.unavailable {
                    return Err(TransportError::Unavailable("broker unavailable".to_string()));
                }
                if state.failing_sends > 0 {
                    state.failing_sends -= 1;
                    return Err(TransportError::Unavailable("injected send failure".to_string()));
                }
                state
                    .logs
                    .entry(topic.to_string())
                    .or_default()
                    .push(message.clone());
            }
            self.broker.shared.appended.notify_waiters();
            Ok(())
        })
    }

    fn close(&self) -> TransportFuture<'_, ()> {
        self.closed.store(true, Ordering::Release);
        Box::pin(async { Ok(()) })
    }
}

/// Inbound half of [`InMemoryBroker`], bound to one topic and group.
pub struct InMemoryReceiver {
    broker: InMemoryBroker,
    topic: String,
    group: String,
    closed: AtomicBool,
}

impl InMemoryReceiver {
    /// Take the next message for this group, if one is already written.
    fn poll_log(&self) -> Option<Message> {
        let mut state = self.broker.lock();
        let next = state
            .offsets
            .get(&(self.topic.clone(), self.group.clone()))
            .copied()
            .unwrap_or(0);
        let message = state.logs.get(&self.topic)?.get(next)?.clone();
        state
            .offsets
            .insert((self.topic.clone(), self.group.clone()), next + 1);
        Some(message)
    }
}

impl BrokerReceiver for InMemoryReceiver {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn group(&self) -> &str {
        &self.group
    }

    fn receive(&self) -> TransportFuture<'_, Message> {
        Box::pin(async move {
            loop {
                let appended = self.broker.shared.appended.notified();
                tokio::pin!(appended);
                // Register before checking the log so a concurrent append is not missed.
                appended.as_mut().enable();

                if self.closed.load(Ordering::Acquire) {
                    return Err(TransportError::Closed);
                }
                if let Some(message) = self.poll_log() {
                    return Ok(message);
                }
                appended.await;
            }
        })
    }

    fn close(&self) -> TransportFuture<'_, ()> {
        self.closed.store(true, Ordering::Release);
        self.broker.shared.appended.notify_waiters();
        Box::pin(async { Ok(()) })
    }
}
