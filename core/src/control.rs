//! Control-plane signaling.
//!
//! Operational traffic (liveness probes, control events) lives in its own,
//! always tenant-scoped subject space, `ctrl.<tenant>.*`, separate from the
//! data-plane topics.

use crate::config::MessagingConfig;
use crate::error::{MessagingError, Result, TransportError};
use crate::tenancy::TenantId;
use crate::topic::{HEARTBEAT_SUBJECT, control_subject};
use crate::transport::ControlTransport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default bound on a heartbeat round trip.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(1);

/// Every control subject, across tenants.
const CONTROL_SUBJECTS: &str = "ctrl.>";

/// Body of a heartbeat request.
pub const HEARTBEAT_PAYLOAD: &[u8] = b"{}";

/// Heartbeats and durable control events for one connection.
///
/// # Example
///
/// ```rust,ignore
/// let control = ControlPlane::new(transport);
///
/// match control.heartbeat(&cancel, &tenant).await {
///     Ok(()) => {}
///     Err(MessagingError::HeartbeatTimeout { .. }) => tracing::warn!("no workers answered"),
///     Err(e) => return Err(e),
/// }
/// control.publish(&cancel, &tenant, "models.evicted", b"{\"model\":\"phi\"}").await?;
/// ```
pub struct ControlPlane<T> {
    transport: T,
    heartbeat_timeout: Duration,
    closed: AtomicBool,
}

impl<T: ControlTransport> ControlPlane<T> {
    /// Wrap a transport with the default one second heartbeat bound.
    #[must_use]
    pub const fn new(transport: T) -> Self {
        Self {
            transport,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            closed: AtomicBool::new(false),
        }
    }

    /// Wrap a transport with the configured `HEARTBEAT_TIMEOUT_MS` bound.
    #[must_use]
    pub fn from_config(transport: T, config: &MessagingConfig) -> Self {
        Self::new(transport).with_heartbeat_timeout(config.heartbeat_timeout)
    }

    /// Override the heartbeat bound.
    #[must_use]
    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    /// The heartbeat bound in effect.
    #[must_use]
    pub const fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_timeout
    }

    /// Probe worker liveness on `ctrl.<tenant>.workers.heartbeat`.
    ///
    /// Returns within the heartbeat bound whether or not any worker answers.
    /// A timeout is expected when no worker is running and should not be
    /// fatal to a larger control loop.
    ///
    /// # Errors
    ///
    /// - [`MessagingError::HeartbeatTimeout`] if nobody answered in time
    /// - [`MessagingError::ControlPlane`] on any other transport failure
    /// - [`MessagingError::Canceled`] / [`MessagingError::Closed`], the latter
    ///   also when the transport itself has shut down
    pub async fn heartbeat(&self, cancel: &CancellationToken, tenant: &TenantId) -> Result<()> {
        self.ensure_open(cancel)?;
        let subject = control_subject(tenant, HEARTBEAT_SUBJECT);
        let timeout = self.heartbeat_timeout;

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(MessagingError::Canceled),
            outcome = tokio::time::timeout(
                timeout,
                self.transport.request(&subject, HEARTBEAT_PAYLOAD, timeout),
            ) => outcome,
        };

        match outcome {
            Ok(Ok(_reply)) => {
                tracing::trace!(subject = %subject, "Heartbeat answered");
                Ok(())
            },
            Ok(Err(TransportError::Timeout | TransportError::NoResponders)) | Err(_) => {
                tracing::debug!(subject = %subject, ?timeout, "Heartbeat timed out");
                Err(MessagingError::HeartbeatTimeout { subject, timeout })
            },
            Ok(Err(TransportError::Closed)) => {
                tracing::debug!(subject = %subject, "Transport closed underneath control plane");
                Err(MessagingError::Closed("control plane"))
            },
            Ok(Err(error)) => {
                tracing::warn!(subject = %subject, error = %error, "Heartbeat failed");
                Err(MessagingError::ControlPlane {
                    subject,
                    reason: error.to_string(),
                })
            },
        }
    }

    /// Durably publish a control event to `ctrl.<tenant>.<subject>`.
    ///
    /// The event is stored in a persistent stream, so it is not lost when no
    /// consumer is online at publish time.
    ///
    /// # Errors
    ///
    /// - [`MessagingError::Publish`] if the stream did not acknowledge it
    /// - [`MessagingError::Canceled`] / [`MessagingError::Closed`], the latter
    ///   also when the transport itself has shut down
    pub async fn publish(
        &self,
        cancel: &CancellationToken,
        tenant: &TenantId,
        subject: &str,
        payload: &[u8],
    ) -> Result<()> {
        self.ensure_open(cancel)?;
        let subject = control_subject(tenant, subject);

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(MessagingError::Canceled),
            outcome = self.transport.publish_durable(&subject, payload) => outcome,
        };

        outcome.map_err(|error| match error {
            TransportError::Closed => {
                tracing::debug!(subject = %subject, "Transport closed underneath control plane");
                MessagingError::Closed("control plane")
            },
            error => {
                tracing::error!(subject = %subject, error = %error, "Failed to publish control event");
                MessagingError::Publish {
                    topic: subject.clone(),
                    reason: error.to_string(),
                }
            },
        })?;
        tracing::debug!(subject = %subject, bytes = payload.len(), "Control event published");
        Ok(())
    }

    /// Release the connection. Later calls fail with [`MessagingError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Closed`] if already closed, or
    /// [`MessagingError::ControlPlane`] if the transport failed to shut down.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(MessagingError::Closed("control plane"));
        }
        tracing::info!("Closing control plane");
        self.transport
            .close()
            .await
            .map_err(|error| MessagingError::ControlPlane {
                subject: CONTROL_SUBJECTS.to_string(),
                reason: format!("close failed: {error}"),
            })
    }

    fn ensure_open(&self, cancel: &CancellationToken) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(MessagingError::Closed("control plane"));
        }
        if cancel.is_cancelled() {
            return Err(MessagingError::Canceled);
        }
        Ok(())
    }
}
