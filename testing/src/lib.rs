//! # Tenant Messaging Testing
//!
//! In-memory transports for testing code built on `tenant-messaging-core`
//! without a broker or a control-plane server.
//!
//! This crate provides:
//! - [`InMemoryBroker`]: per-topic logs with consumer-group offsets
//! - [`InMemoryControlPlane`]: scripted request/reply and a durable publish log
//! - Failure injection on both, for exercising error paths
//!
//! ## Example
//!
//! ```
//! use tenant_messaging_core::{CancellationToken, ControlPlane, MessagingError, TenantId};
//! use tenant_messaging_testing::InMemoryControlPlane;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = InMemoryControlPlane::new();
//! transport.respond_on("ctrl.acme.workers.heartbeat", b"{}".to_vec());
//!
//! let control = ControlPlane::new(transport.clone());
//! let tenant = TenantId::new("acme")?;
//! control.heartbeat(&CancellationToken::new(), &tenant).await?;
//! # Ok(())
//! # }
//! ```

mod broker;
mod control;

pub use broker::{InMemoryBroker, InMemoryReceiver, InMemorySender};
pub use control::InMemoryControlPlane;
