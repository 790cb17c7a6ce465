//! Topic and subject naming.
//!
//! Names are part of the wire contract and must stay bit-exact:
//!
//! - data plane: `llm.<tenant>.<domain>`
//! - control plane: `ctrl.<tenant>.<subject>`
//!
//! Naming is a pure function of the tenancy settings and its arguments, safe
//! to call from any number of tasks without synchronization.

use crate::config::{TenancyConfig, TenancyMode};
use crate::tenancy::TenantId;
use std::fmt;

/// Prefix of every data-plane topic.
pub const TOPIC_PREFIX: &str = "llm";

/// Prefix of every control-plane subject.
pub const CONTROL_PREFIX: &str = "ctrl";

/// Subject suffix workers answer liveness probes on.
pub const HEARTBEAT_SUBJECT: &str = "workers.heartbeat";

/// Well-known logical message families.
pub mod domains {
    /// Inference requests
    pub const INFER_REQUESTS_V1: &str = "infer.requests.v1";
    /// Inference results
    pub const INFER_RESULTS_V1: &str = "infer.results.v1";
    /// Documents queued for embedding
    pub const EMBEDDINGS_INGEST_V1: &str = "embeddings.ingest.v1";
    /// Memory subsystem events
    pub const MEM_EVENTS_V1: &str = "mem.events.v1";
}

/// A fully-qualified data-plane topic name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicName(String);

impl TopicName {
    /// The topic as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the name, returning the owned string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for TopicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TopicName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derives topic names from tenancy settings.
///
/// # Example
///
/// ```
/// use tenant_messaging_core::config::TenancyConfig;
/// use tenant_messaging_core::topic::{TopicNamer, domains};
///
/// let namer = TopicNamer::new(TenancyConfig::multi());
/// let topic = namer.name("acme", domains::INFER_REQUESTS_V1);
/// assert_eq!(topic.as_str(), "llm.acme.infer.requests.v1");
/// ```
#[derive(Debug, Clone)]
pub struct TopicNamer {
    tenancy: TenancyConfig,
}

impl TopicNamer {
    /// Create a namer bound to the process tenancy settings.
    #[must_use]
    pub const fn new(tenancy: TenancyConfig) -> Self {
        Self { tenancy }
    }

    /// Name the topic for `domain` as seen by `tenant`.
    ///
    /// In multi mode a non-empty `tenant` is used as given. Otherwise the
    /// configured default tenant is used and `tenant` is ignored.
    #[must_use]
    pub fn name(&self, tenant: &str, domain: &str) -> TopicName {
        let tenant = match self.tenancy.mode() {
            TenancyMode::Multi if !tenant.is_empty() => tenant,
            _ => self.tenancy.default_tenant(),
        };
        TopicName(format!("{TOPIC_PREFIX}.{tenant}.{domain}"))
    }

    /// Name the topic for an already resolved tenant.
    #[must_use]
    pub fn name_for(&self, tenant: &TenantId, domain: &str) -> TopicName {
        self.name(tenant.as_str(), domain)
    }
}

/// Control-plane subject `ctrl.<tenant>.<subject>`.
#[must_use]
pub fn control_subject(tenant: &TenantId, subject: &str) -> String {
    format!("{CONTROL_PREFIX}.{tenant}.{subject}")
}
