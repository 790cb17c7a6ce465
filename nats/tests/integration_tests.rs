//! Integration tests for [`NatsControlTransport`] against a running server.
//!
//! Marked `#[ignore]`; they need a JetStream-enabled NATS server at `NATS_URL`
//! (default `nats://localhost:4222`):
//! ```bash
//! docker run -p 4222:4222 nats:latest -js
//! cargo test -p tenant-messaging-nats --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::{Duration, Instant};
use tenant_messaging_core::{CancellationToken, ControlPlane, MessagingError, TenantId};
use tenant_messaging_nats::NatsControlTransport;

fn nats_url() -> String {
    std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string())
}

async fn connect() -> NatsControlTransport {
    NatsControlTransport::connect(&nats_url())
        .await
        .expect("Failed to connect to NATS")
}

#[tokio::test]
#[ignore]
async fn heartbeat_without_workers_times_out_within_bound() {
    let control = ControlPlane::new(connect().await);
    let tenant = TenantId::new("nobody-listens").expect("valid tenant");
    let cancel = CancellationToken::new();

    let started = Instant::now();
    let result = control.heartbeat(&cancel, &tenant).await;

    assert!(
        matches!(result, Err(MessagingError::HeartbeatTimeout { ref subject, .. })
            if subject == "ctrl.nobody-listens.workers.heartbeat"),
        "unexpected result: {result:?}"
    );
    assert!(started.elapsed() < Duration::from_millis(1500));
}

#[tokio::test]
#[ignore]
async fn heartbeat_is_answered_by_serving_worker() {
    let transport = connect().await;
    let tenant = TenantId::new("acme").expect("valid tenant");
    let cancel = CancellationToken::new();

    let worker = transport
        .serve_heartbeats(&tenant, cancel.clone())
        .await
        .expect("Failed to serve heartbeats");

    let control = ControlPlane::new(transport);
    control
        .heartbeat(&cancel, &tenant)
        .await
        .expect("heartbeat should be answered");

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), worker)
        .await
        .expect("worker did not stop")
        .expect("worker panicked");
}

#[tokio::test]
#[ignore]
async fn durable_publish_is_acknowledged_by_control_stream() {
    let transport = connect().await;
    transport
        .ensure_control_stream("TENANT_CONTROL_TEST")
        .await
        .expect("Failed to ensure control stream");

    let control = ControlPlane::new(transport);
    let tenant = TenantId::new("acme").expect("valid tenant");
    control
        .publish(
            &CancellationToken::new(),
            &tenant,
            "models.loaded",
            br#"{"model":"phi-4-mini-instruct"}"#,
        )
        .await
        .expect("durable publish failed");
}
