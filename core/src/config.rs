//! Configuration for tenant-aware messaging.
//!
//! All values are read once, when components are constructed. There is no
//! hot reload. [`MessagingConfig::from_lookup`] is the pure loader so tests
//! never have to mutate the process environment; [`MessagingConfig::from_env`]
//! wires it to `std::env`.

use crate::error::{MessagingError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Tenant used when none is configured.
pub const DEFAULT_TENANT_FALLBACK: &str = "main";

/// Whether traffic is isolated per tenant or funneled through one default tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenancyMode {
    /// Every request maps to the configured default tenant.
    #[default]
    Single,
    /// Every request must carry its own tenant identifier.
    Multi,
}

impl FromStr for TenancyMode {
    type Err = MessagingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "single" => Ok(Self::Single),
            "multi" => Ok(Self::Multi),
            other => Err(MessagingError::Config(format!(
                "unknown tenancy mode '{other}' (expected 'single' or 'multi')"
            ))),
        }
    }
}

impl fmt::Display for TenancyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => f.write_str("single"),
            Self::Multi => f.write_str("multi"),
        }
    }
}

/// Process-wide tenancy settings, passed explicitly to the namer and resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenancyConfig {
    mode: TenancyMode,
    default_tenant: String,
}

impl TenancyConfig {
    /// Build tenancy settings. An absent or empty default tenant becomes `"main"`.
    #[must_use]
    pub fn new(mode: TenancyMode, default_tenant: Option<String>) -> Self {
        let default_tenant = default_tenant
            .filter(|tenant| !tenant.is_empty())
            .unwrap_or_else(|| DEFAULT_TENANT_FALLBACK.to_string());
        Self {
            mode,
            default_tenant,
        }
    }

    /// Single-tenant mode with the given default tenant.
    #[must_use]
    pub fn single(default_tenant: impl Into<String>) -> Self {
        Self::new(TenancyMode::Single, Some(default_tenant.into()))
    }

    /// Multi-tenant mode with the fallback default tenant.
    #[must_use]
    pub fn multi() -> Self {
        Self::new(TenancyMode::Multi, None)
    }

    /// The configured mode.
    #[must_use]
    pub const fn mode(&self) -> TenancyMode {
        self.mode
    }

    /// The tenant used whenever no per-request tenant applies.
    #[must_use]
    pub fn default_tenant(&self) -> &str {
        &self.default_tenant
    }
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self::new(TenancyMode::Single, None)
    }
}

/// Complete messaging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Tenancy mode and default tenant
    pub tenancy: TenancyConfig,
    /// Broker bootstrap addresses
    pub brokers: Vec<String>,
    /// Control-plane server URL
    pub control_plane_url: String,
    /// Dedupe window
    pub dedupe_ttl: Duration,
    /// Maximum time a producer buffers before flushing
    pub linger: Duration,
    /// Batch size threshold that triggers a flush
    pub batch_bytes: usize,
    /// Compression codec: none, gzip, snappy, lz4, zstd
    pub compression: String,
    /// Request idempotent production from the broker client
    pub idempotent: bool,
    /// Upper bound on a single send, including broker acknowledgment
    pub send_timeout: Duration,
    /// Consumer group for data-plane consumers
    pub consumer_group: String,
    /// Minimum bytes the broker accumulates before answering a fetch
    pub consumer_min_bytes: usize,
    /// Maximum bytes returned by a single fetch
    pub consumer_max_bytes: usize,
    /// Bound on a control-plane heartbeat
    pub heartbeat_timeout: Duration,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            tenancy: TenancyConfig::default(),
            brokers: vec!["localhost:9092".to_string()],
            control_plane_url: "nats://localhost:4222".to_string(),
            dedupe_ttl: Duration::from_secs(60),
            linger: Duration::from_millis(10),
            batch_bytes: 128 << 10,
            compression: "none".to_string(),
            idempotent: false,
            send_timeout: Duration::from_secs(5),
            consumer_group: "llm-server".to_string(),
            consumer_min_bytes: 1,
            consumer_max_bytes: 10 << 20,
            heartbeat_timeout: Duration::from_secs(1),
        }
    }
}

impl MessagingConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Config`] if a variable is set but cannot be
    /// parsed, or if the resulting configuration fails [`Self::validate`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Unset and empty keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Config`] if a value cannot be parsed, or if
    /// the resulting configuration fails [`Self::validate`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let mode = get("TENANCY_MODE")
            .map(|raw| raw.parse::<TenancyMode>())
            .transpose()?
            .unwrap_or_default();

        let config = Self {
            tenancy: TenancyConfig::new(mode, get("DEFAULT_TENANT_ID")),
            brokers: get("KAFKA_BROKERS").map_or(defaults.brokers, |raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|broker| !broker.is_empty())
                    .map(ToString::to_string)
                    .collect()
            }),
            control_plane_url: get("NATS_URL").unwrap_or(defaults.control_plane_url),
            dedupe_ttl: millis(&get, "DEDUPE_TTL_MS")?.unwrap_or(defaults.dedupe_ttl),
            linger: millis(&get, "PRODUCER_LINGER_MS")?.unwrap_or(defaults.linger),
            batch_bytes: parsed(&get, "PRODUCER_BATCH_BYTES")?.unwrap_or(defaults.batch_bytes),
            compression: get("PRODUCER_COMPRESSION").unwrap_or(defaults.compression),
            idempotent: parsed(&get, "PRODUCER_IDEMPOTENT")?.unwrap_or(defaults.idempotent),
            send_timeout: millis(&get, "PRODUCER_SEND_TIMEOUT_MS")?
                .unwrap_or(defaults.send_timeout),
            consumer_group: get("CONSUMER_GROUP").unwrap_or(defaults.consumer_group),
            consumer_min_bytes: parsed(&get, "CONSUMER_MIN_BYTES")?
                .unwrap_or(defaults.consumer_min_bytes),
            consumer_max_bytes: parsed(&get, "CONSUMER_MAX_BYTES")?
                .unwrap_or(defaults.consumer_max_bytes),
            heartbeat_timeout: millis(&get, "HEARTBEAT_TIMEOUT_MS")?
                .unwrap_or(defaults.heartbeat_timeout),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check invariants that would otherwise surface as confusing runtime failures.
    ///
    /// # Errors
    ///
    /// Returns [`MessagingError::Config`] naming the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.brokers.is_empty() {
            return Err(MessagingError::Config("broker list is empty".to_string()));
        }
        if self.control_plane_url.is_empty() {
            return Err(MessagingError::Config("control plane URL is empty".to_string()));
        }
        if self.dedupe_ttl.is_zero() {
            return Err(MessagingError::Config("dedupe TTL must be > 0".to_string()));
        }
        if self.batch_bytes == 0 {
            return Err(MessagingError::Config("batch bytes must be > 0".to_string()));
        }
        if self.send_timeout.is_zero() {
            return Err(MessagingError::Config("send timeout must be > 0".to_string()));
        }
        if self.heartbeat_timeout.is_zero() {
            return Err(MessagingError::Config("heartbeat timeout must be > 0".to_string()));
        }
        if self.consumer_group.is_empty() {
            return Err(MessagingError::Config("consumer group is empty".to_string()));
        }
        if self.consumer_min_bytes > self.consumer_max_bytes {
            return Err(MessagingError::Config(format!(
                "consumer min bytes ({}) exceeds max bytes ({})",
                self.consumer_min_bytes, self.consumer_max_bytes
            )));
        }
        Ok(())
    }

    /// Broker addresses joined the way Kafka clients expect them.
    #[must_use]
    pub fn bootstrap_servers(&self) -> String {
        self.brokers.join(",")
    }
}

fn parsed<T, F>(get: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| MessagingError::Config(format!("{key}={raw}: {e}")))
        })
        .transpose()
}

fn millis<F>(get: &F, key: &str) -> Result<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(parsed::<u64, F>(get, key)?.map(Duration::from_millis))
}
