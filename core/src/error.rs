//! Error taxonomy for tenant-aware messaging.
//!
//! Every failure is returned to the immediate caller. Nothing in this crate
//! retries: whether a retry is safe depends on the idempotency of the caller's
//! operation, which only the caller knows. [`MessagingError::is_retryable`]
//! tells the caller which failures are transient.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the messaging layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessagingError {
    /// Invalid or missing configuration at construction time.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The transport could not be created or connected.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Multi-tenant mode and no tenant identifier was supplied.
    #[error("Missing tenant identifier in multi-tenant mode")]
    MissingTenant,

    /// Failed to publish a message to a topic or subject.
    #[error("Publish failed for '{topic}': {reason}")]
    Publish {
        /// The topic or subject that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to fetch a message from a topic.
    #[error("Fetch failed for topic '{topic}': {reason}")]
    Fetch {
        /// The topic being consumed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// A control-plane request failed for a reason other than a timeout.
    #[error("Control plane request to '{subject}' failed: {reason}")]
    ControlPlane {
        /// The subject of the request
        subject: String,
        /// The reason for failure
        reason: String,
    },

    /// No responder answered a heartbeat in time.
    #[error("Heartbeat on '{subject}' timed out after {timeout:?}")]
    HeartbeatTimeout {
        /// The heartbeat subject
        subject: String,
        /// The bound that elapsed
        timeout: Duration,
    },

    /// The caller's cancellation token fired.
    #[error("Operation canceled")]
    Canceled,

    /// The handle was used after `close()`.
    #[error("{0} is closed")]
    Closed(&'static str),
}

impl MessagingError {
    /// Whether the caller may retry the failed operation.
    ///
    /// Transport-level failures are transient. Configuration, tenancy,
    /// cancellation and use-after-close errors are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Publish { .. }
                | Self::Fetch { .. }
                | Self::ControlPlane { .. }
                | Self::HeartbeatTimeout { .. }
        )
    }
}

/// Errors reported by transport adapters.
///
/// Adapters know nothing about topics or tenants; the core attaches that
/// context when mapping into [`MessagingError`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport gave up waiting for a reply.
    #[error("request timed out")]
    Timeout,

    /// Nobody is listening on the requested subject.
    #[error("no responders")]
    NoResponders,

    /// The underlying connection or client has been closed.
    #[error("transport closed")]
    Closed,

    /// Broker or network failure.
    #[error("{0}")]
    Unavailable(String),
}

/// Result alias for messaging operations.
pub type Result<T> = std::result::Result<T, MessagingError>;
