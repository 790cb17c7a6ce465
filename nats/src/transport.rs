//! [`ControlTransport`] over NATS core request/reply and JetStream.

use async_nats::client::RequestErrorKind;
use async_nats::jetstream::{self, stream};
use async_nats::{Client, ConnectOptions};
use bytes::Bytes;
use futures::StreamExt;
use std::time::Duration;
use tenant_messaging_core::config::MessagingConfig;
use tenant_messaging_core::control::HEARTBEAT_PAYLOAD;
use tenant_messaging_core::error::{MessagingError, TransportError};
use tenant_messaging_core::tenancy::TenantId;
use tenant_messaging_core::topic::{CONTROL_PREFIX, HEARTBEAT_SUBJECT, control_subject};
use tenant_messaging_core::transport::{ControlTransport, TransportFuture};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// NATS connection used for control-plane signaling.
///
/// Requests go through core NATS (first reply wins); durable publishes go
/// through JetStream and resolve once the server acknowledged storage.
#[derive(Clone)]
pub struct NatsControlTransport {
    client: Client,
    jetstream: jetstream::Context,
}

impl NatsControlTransport {
    /// Connect to the NATS server at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Connection`] if the server is unreachable.
    pub async fn connect(url: &str) -> Result<Self, MessagingError> {
        let client = ConnectOptions::new()
            .connection_timeout(CONNECT_TIMEOUT)
            .connect(url)
            .await
            .map_err(|e| MessagingError::Connection(format!("Failed to connect to {url}: {e}")))?;

        tracing::info!(url, "Connected to control plane");
        Ok(Self::from_client(client))
    }

    /// Connect using `NATS_URL` from the shared messaging configuration.
    ///
    /// # Errors
    ///
    /// See [`NatsControlTransport::connect`].
    pub async fn from_config(config: &MessagingConfig) -> Result<Self, MessagingError> {
        Self::connect(&config.control_plane_url).await
    }

    /// Wrap an existing client.
    #[must_use]
    pub fn from_client(client: Client) -> Self {
        let jetstream = jetstream::new(client.clone());
        Self { client, jetstream }
    }

    /// The underlying client.
    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }

    /// Get or create a JetStream stream capturing every `ctrl.>` subject.
    ///
    /// Durable publishes fail with no responders until some stream covers
    /// their subject, so call this once during startup.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::ControlPlane`] if the stream cannot be created.
    pub async fn ensure_control_stream(&self, name: &str) -> Result<(), MessagingError> {
        let subjects = format!("{CONTROL_PREFIX}.>");
        self.jetstream
            .get_or_create_stream(stream::Config {
                name: name.to_string(),
                subjects: vec![subjects.clone()],
                ..Default::default()
            })
            .await
            .map_err(|e| MessagingError::ControlPlane {
                subject: subjects.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(stream = name, subjects = %subjects, "Control stream ready");
        Ok(())
    }

    /// Answer heartbeat requests for `tenant` until `cancel` fires.
    ///
    /// This is the worker side of [`ControlPlane::heartbeat`]: every request on
    /// `ctrl.<tenant>.workers.heartbeat` gets a `{}` reply.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::ControlPlane`] if the subscription fails.
    ///
    /// [`ControlPlane::heartbeat`]: tenant_messaging_core::ControlPlane::heartbeat
    pub async fn serve_heartbeats(
        &self,
        tenant: &TenantId,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>, MessagingError> {
        let subject = control_subject(tenant, HEARTBEAT_SUBJECT);
        let mut subscriber = self.client.subscribe(subject.clone()).await.map_err(|e| {
            MessagingError::ControlPlane {
                subject: subject.clone(),
                reason: e.to_string(),
            }
        })?;
        let client = self.client.clone();

        tracing::info!(subject = %subject, "Serving heartbeats");

        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    request = subscriber.next() => {
                        let Some(request) = request else { break };
                        let Some(reply) = request.reply else { continue };
                        if let Err(e) = client
                            .publish(reply, Bytes::from_static(HEARTBEAT_PAYLOAD))
                            .await
                        {
                            tracing::warn!(subject = %subject, error = %e, "Failed to answer heartbeat");
                        }
                    }
                }
            }
            if let Err(e) = subscriber.unsubscribe().await {
                tracing::debug!(subject = %subject, error = %e, "Unsubscribe failed");
            }
            tracing::info!(subject = %subject, "Stopped serving heartbeats");
        }))
    }
}

fn request_error(error: &async_nats::RequestError) -> TransportError {
    match error.kind() {
        RequestErrorKind::TimedOut => TransportError::Timeout,
        RequestErrorKind::NoResponders => TransportError::NoResponders,
        RequestErrorKind::Other => TransportError::Unavailable(error.to_string()),
    }
}

impl ControlTransport for NatsControlTransport {
    fn request<'a>(
        &'a self,
        subject: &'a str,
        payload: &'a [u8],
        timeout: Duration,
    ) -> TransportFuture<'a, Vec<u8>> {
        Box::pin(async move {
            let request = self
                .client
                .request(subject.to_string(), Bytes::copy_from_slice(payload));
            let reply = tokio::time::timeout(timeout, request)
                .await
                .map_err(|_| TransportError::Timeout)?
                .map_err(|e| request_error(&e))?;
            Ok(reply.payload.to_vec())
        })
    }

    fn publish_durable<'a>(
        &'a self,
        subject: &'a str,
        payload: &'a [u8],
    ) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let ack = self
                .jetstream
                .publish(subject.to_string(), Bytes::copy_from_slice(payload))
                .await
                .map_err(|e| TransportError::Unavailable(e.to_string()))?
                .await
                .map_err(|e| TransportError::Unavailable(e.to_string()))?;

            tracing::trace!(subject, stream = %ack.stream, sequence = ack.sequence, "Stored");
            Ok(())
        })
    }

    fn close(&self) -> TransportFuture<'_, ()> {
        Box::pin(async move {
            self.client
                .flush()
                .await
                .map_err(|e| TransportError::Unavailable(format!("flush failed: {e}")))
        })
    }
}
