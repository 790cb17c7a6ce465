//! Messaging Smoke Test
//!
//! Produces a burst of `InferRequestV1` messages to a tenant's
//! `infer.requests.v1` topic and exits non-zero if any write failed.
//!
//! # Running
//!
//! ```bash
//! docker run -d -p 9092:9092 redpandadata/redpanda:latest redpanda start --overprovisioned --smp 1
//! TENANCY_MODE=multi SMOKE_TENANT=acme SMOKE_COUNT=100 cargo run -p messaging-smoke-test
//! ```
//!
//! # Environment
//!
//! Broker and tenancy settings come from the shared messaging configuration
//! (`KAFKA_BROKERS`, `TENANCY_MODE`, `DEFAULT_TENANT_ID`, `PRODUCER_*`, ...).
//! The run itself is shaped by:
//!
//! | Variable            | Default               |
//! |---------------------|-----------------------|
//! | `SMOKE_TENANT`      | `main`                |
//! | `SMOKE_COUNT`       | `10`                  |
//! | `SMOKE_CONCURRENCY` | `4`                   |
//! | `SMOKE_MODEL`       | `phi-4-mini-instruct` |
//! | `SMOKE_PROMPT`      | `Hello`               |

use anyhow::{Context, bail};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tenant_messaging_core::middleware::{SpanTracer, describe_metrics};
use tenant_messaging_core::topic::domains;
use tenant_messaging_core::{
    CancellationToken, Headers, MessagingConfig, Producer, TenantResolver, TopicNamer,
};
use tenant_messaging_redpanda::KafkaSender;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Inference request as written to `infer.requests.v1`.
#[derive(Debug, Clone, Serialize)]
struct InferRequestV1 {
    request_id: String,
    tenant_id: String,
    model: String,
    priority: String,
    prompt: String,
    params: BTreeMap<String, serde_json::Value>,
    timestamp_ms: i64,
}

impl InferRequestV1 {
    fn new(index: usize, tenant: &str, settings: &SmokeSettings) -> Self {
        Self {
            request_id: format!("test-{index}"),
            tenant_id: tenant.to_string(),
            model: settings.model.clone(),
            priority: "normal".to_string(),
            prompt: settings.prompt.clone(),
            params: BTreeMap::from([("temperature".to_string(), serde_json::json!(0.2))]),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SmokeSettings {
    tenant: String,
    count: usize,
    concurrency: usize,
    model: String,
    prompt: String,
}

impl SmokeSettings {
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let text = |key: &str, default: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let number = |key: &str, default: usize| -> anyhow::Result<usize> {
            match lookup(key).filter(|value| !value.trim().is_empty()) {
                Some(value) => value
                    .trim()
                    .parse()
                    .with_context(|| format!("{key} must be a non-negative integer, got '{value}'")),
                None => Ok(default),
            }
        };

        let settings = Self {
            tenant: text("SMOKE_TENANT", "main"),
            count: number("SMOKE_COUNT", 10)?,
            concurrency: number("SMOKE_CONCURRENCY", 4)?,
            model: text("SMOKE_MODEL", "phi-4-mini-instruct"),
            prompt: text("SMOKE_PROMPT", "Hello"),
        };
        if settings.concurrency == 0 {
            bail!("SMOKE_CONCURRENCY must be at least 1");
        }
        Ok(settings)
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tenant_messaging_core=info,messaging_smoke_test=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Missing .env is fine
    let _ = dotenvy::dotenv();
    init_tracing();

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;
    describe_metrics();

    let config = MessagingConfig::from_env()?;
    let settings = SmokeSettings::from_lookup(|key| std::env::var(key).ok())?;

    let tenant =
        TenantResolver::new(config.tenancy.clone()).resolve(Some(settings.tenant.as_str()))?;
    let topic =
        TopicNamer::new(config.tenancy.clone()).name_for(&tenant, domains::INFER_REQUESTS_V1);

    tracing::info!(
        topic = %topic,
        tenant = %tenant,
        count = settings.count,
        concurrency = settings.concurrency,
        "Producing"
    );

    let producer = Arc::new(
        Producer::new(KafkaSender::from_config(&config)?).with_tracer(Arc::new(SpanTracer)),
    );
    let cancel = CancellationToken::new();
    let permits = Arc::new(Semaphore::new(settings.concurrency));
    let headers = Arc::new(Headers::from([(
        "tenant".to_string(),
        tenant.as_str().to_string(),
    )]));
    let topic = Arc::new(topic);

    let mut writes = JoinSet::new();
    for index in 0..settings.count {
        let permit = Arc::clone(&permits).acquire_owned().await?;
        let request = InferRequestV1::new(index, tenant.as_str(), &settings);
        let producer = Arc::clone(&producer);
        let headers = Arc::clone(&headers);
        let topic = Arc::clone(&topic);
        let cancel = cancel.clone();

        writes.spawn(async move {
            let _permit = permit;
            let payload = serde_json::to_vec(&request)?;
            producer
                .write(
                    &cancel,
                    topic.as_str(),
                    request.request_id.as_bytes(),
                    &headers,
                    &payload,
                )
                .await?;
            anyhow::Ok(())
        });
    }

    let mut failures = 0_usize;
    while let Some(joined) = writes.join_next().await {
        if let Err(e) = joined.map_err(anyhow::Error::from).and_then(|written| written) {
            tracing::error!(error = %e, "Produce failed");
            failures += 1;
        }
    }

    if let Err(e) = producer.close().await {
        tracing::warn!(error = %e, "Producer did not flush cleanly");
    }

    println!("{}", prometheus.render());

    if failures > 0 {
        bail!("{failures} of {} messages failed", settings.count);
    }
    tracing::info!(count = settings.count, topic = %topic, "Produced all messages successfully");
    Ok(())
}
