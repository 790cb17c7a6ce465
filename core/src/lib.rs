//! # Tenant Messaging Core
//!
//! Tenant-aware routing and delivery safety on top of a publish/subscribe
//! broker used by a multi-tenant inference platform.
//!
//! This crate does not implement a broker. It defines how a multi-tenant
//! application names, produces, consumes and de-duplicates messages, and how
//! it signals on the control plane. Brokers plug in through the traits in
//! [`transport`].
//!
//! ## Data Flow
//!
//! ```text
//!   inbound request (X-Tenant-Id)
//!            │
//!            ▼
//!   ┌─────────────────┐      ┌─────────────────┐
//!   │ TenantResolver  │─────►│   TopicNamer    │  llm.<tenant>.<domain>
//!   └─────────────────┘      └────────┬────────┘
//!                                     │
//!                                     ▼
//!                            ┌─────────────────┐
//!                            │    Producer     │──► broker
//!                            └─────────────────┘      │
//!                                                     ▼
//!                            ┌─────────────────┐
//!                            │    Consumer     │──► Dedupe ──► business logic
//!                            └─────────────────┘
//!
//!   ControlPlane: ctrl.<tenant>.workers.heartbeat, ctrl.<tenant>.<subject>
//! ```
//!
//! Every path updates the shared [`middleware::Metrics`] counters.
//!
//! ## Example
//!
//! ```
//! use tenant_messaging_core::config::TenancyConfig;
//! use tenant_messaging_core::tenancy::TenantResolver;
//! use tenant_messaging_core::topic::{TopicNamer, domains};
//!
//! let tenancy = TenancyConfig::multi();
//! let resolver = TenantResolver::new(tenancy.clone());
//! let namer = TopicNamer::new(tenancy);
//!
//! let tenant = resolver.resolve(Some("acme")).unwrap();
//! let topic = namer.name_for(&tenant, domains::INFER_REQUESTS_V1);
//! assert_eq!(topic.as_str(), "llm.acme.infer.requests.v1");
//! ```

pub mod config;
pub mod consumer;
pub mod control;
pub mod error;
pub mod message;
pub mod middleware;
pub mod producer;
pub mod tenancy;
pub mod topic;
pub mod transport;

pub use config::{MessagingConfig, TenancyConfig, TenancyMode};
pub use consumer::{Consumer, MessageStream};
pub use control::ControlPlane;
pub use error::{MessagingError, Result, TransportError};
pub use message::{Headers, Message};
pub use producer::Producer;
pub use tenancy::{TenantContext, TenantId, TenantResolver};
pub use topic::{TopicName, TopicNamer};

// Cancellation tokens appear in every blocking signature.
pub use tokio_util::sync::CancellationToken;
