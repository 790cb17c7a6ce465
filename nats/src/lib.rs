//! NATS control-plane transport for tenant-aware messaging.
//!
//! Implements [`ControlTransport`] on top of async-nats:
//!
//! - **Heartbeats**: core NATS request/reply on `ctrl.<tenant>.workers.heartbeat`,
//!   answered by whichever worker replies first
//! - **Control events**: JetStream publish, acknowledged once stored
//!
//! Workers run [`NatsControlTransport::serve_heartbeats`] to answer liveness
//! probes; publishers call [`NatsControlTransport::ensure_control_stream`]
//! once so durable publishes have a backing stream.
//!
//! # Example
//!
//! ```no_run
//! use tenant_messaging_core::{CancellationToken, ControlPlane, TenantId};
//! use tenant_messaging_nats::NatsControlTransport;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = NatsControlTransport::connect("nats://localhost:4222").await?;
//! transport.ensure_control_stream("CONTROL").await?;
//!
//! let control = ControlPlane::new(transport);
//! let tenant = TenantId::new("acme")?;
//! let cancel = CancellationToken::new();
//! control.publish(&cancel, &tenant, "models.loaded", b"{}").await?;
//! # Ok(())
//! # }
//! ```
//!
//! [`ControlTransport`]: tenant_messaging_core::transport::ControlTransport

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod transport;

pub use transport::NatsControlTransport;
