//! Tenant identification for inbound requests.
//!
//! [`TenantResolver::resolve`] must run before any per-request topic naming so
//! that multi-tenant requests without a tenant are rejected before a single
//! message is produced.

use crate::config::{TenancyConfig, TenancyMode};
use crate::error::{MessagingError, Result};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::fmt;

/// Header carrying the tenant on inbound requests.
pub const TENANT_HEADER: &str = "X-Tenant-Id";

/// Opaque, non-empty identifier of a logical customer namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Wrap a tenant identifier.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::MissingTenant`] if `id` is empty.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(MessagingError::MissingTenant);
        }
        Ok(Self(id))
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TenantId {
    type Error = MessagingError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TenantId> for String {
    fn from(tenant: TenantId) -> Self {
        tenant.0
    }
}

/// Derives the effective tenant for an inbound request.
#[derive(Debug, Clone)]
pub struct TenantResolver {
    tenancy: TenancyConfig,
}

impl TenantResolver {
    /// Create a resolver bound to the process tenancy settings.
    #[must_use]
    pub const fn new(tenancy: TenancyConfig) -> Self {
        Self { tenancy }
    }

    /// Resolve the tenant for a request.
    ///
    /// In multi mode the header is returned verbatim; format checks are left
    /// to the caller. In single mode the header is ignored and the configured
    /// default tenant is returned.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::MissingTenant`] in multi mode when the header
    /// is absent or empty.
    pub fn resolve(&self, tenant_header: Option<&str>) -> Result<TenantId> {
        match self.tenancy.mode() {
            TenancyMode::Multi => match tenant_header {
                Some(tenant) if !tenant.is_empty() => TenantId::new(tenant),
                _ => {
                    tracing::warn!(header = TENANT_HEADER, "Rejecting request without tenant");
                    Err(MessagingError::MissingTenant)
                },
            },
            TenancyMode::Single => TenantId::new(self.tenancy.default_tenant()),
        }
    }

    /// The tenancy settings this resolver applies.
    #[must_use]
    pub const fn tenancy(&self) -> &TenancyConfig {
        &self.tenancy
    }
}

/// Per-tenant plan and quota information carried alongside requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    /// Tenant identifier
    pub id: TenantId,
    /// Billing or service plan name
    pub plan: String,
    /// Named quotas (e.g. `requests_per_minute`)
    #[serde(default)]
    pub quotas: HashMap<String, i64>,
}

/// Stable partition key for a tenant's traffic to one model at one priority.
///
/// Lowercase hex SHA-1 of `tenant|model|priority`, 40 characters. The producer never applies
/// it on its own; callers that want per-tenant partitioning pass it as the
/// message key.
#[must_use]
pub fn partition_key(tenant: &str, model: &str, priority: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(tenant.as_bytes());
    hasher.update(b"|");
    hasher.update(model.as_bytes());
    hasher.update(b"|");
    hasher.update(priority.as_bytes());
    hex::encode(hasher.finalize())
}
