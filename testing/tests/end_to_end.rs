//! End-to-end flows over the in-memory transports: resolve a tenant, name the
//! topic, produce, consume with dedupe, and signal on the control plane.

#![allow(clippy::unwrap_used)]

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tenant_messaging_core::middleware::{Dedupe, Metrics, SpanTracer};
use tenant_messaging_core::topic::domains;
use tenant_messaging_core::{
    CancellationToken, Consumer, ControlPlane, Headers, MessagingConfig, MessagingError, Producer,
    TenancyConfig,
    TenantId, TenantResolver, TopicNamer,
};
use tenant_messaging_testing::{InMemoryBroker, InMemoryControlPlane};

fn tenant_headers(tenant: &str) -> Headers {
    Headers::from([
        ("tenant".to_string(), tenant.to_string()),
        ("content-type".to_string(), "application/json".to_string()),
    ])
}

#[tokio::test]
async fn produced_message_arrives_with_key_value_and_headers() {
    let tenancy = TenancyConfig::multi();
    let tenant = TenantResolver::new(tenancy.clone())
        .resolve(Some("acme"))
        .unwrap();
    let topic = TopicNamer::new(tenancy).name_for(&tenant, domains::INFER_REQUESTS_V1);
    assert_eq!(topic.as_str(), "llm.acme.infer.requests.v1");

    let broker = InMemoryBroker::new();
    let producer = Producer::new(broker.sender());
    let consumer = Consumer::new(broker.receiver(topic.as_str(), "llm-server"));
    let cancel = CancellationToken::new();

    producer
        .write(
            &cancel,
            topic.as_str(),
            b"req-1",
            &tenant_headers("acme"),
            br#"{"prompt":"Hello"}"#,
        )
        .await
        .unwrap();

    let message = consumer.fetch(&cancel).await.unwrap();
    assert_eq!(message.key, b"req-1");
    assert_eq!(message.value, br#"{"prompt":"Hello"}"#);
    assert_eq!(message.headers, tenant_headers("acme"));
    assert_eq!(message.header("tenant"), Some("acme"));
}

#[tokio::test]
async fn single_tenant_mode_routes_everything_to_default_tenant() {
    let tenancy = TenancyConfig::single("main");
    let resolver = TenantResolver::new(tenancy.clone());
    let namer = TopicNamer::new(tenancy);

    let tenant = resolver.resolve(Some("acme")).unwrap();
    assert_eq!(tenant.as_str(), "main");
    assert_eq!(
        namer.name("acme", domains::MEM_EVENTS_V1).as_str(),
        "llm.main.mem.events.v1"
    );
}

#[tokio::test]
async fn missing_tenant_is_rejected_before_anything_is_produced() {
    let broker = InMemoryBroker::new();
    let resolver = TenantResolver::new(TenancyConfig::multi());

    let result = resolver.resolve(None);
    assert_eq!(result, Err(MessagingError::MissingTenant));
    assert_eq!(resolver.resolve(Some("")), Err(MessagingError::MissingTenant));
    assert!(broker.topics().is_empty());
}

#[tokio::test]
async fn tenants_are_isolated_by_topic() {
    let namer = TopicNamer::new(TenancyConfig::multi());
    let acme = namer.name("acme", domains::INFER_REQUESTS_V1);
    let beta = namer.name("beta", domains::INFER_REQUESTS_V1);

    let broker = InMemoryBroker::new();
    let producer = Producer::new(broker.sender());
    let cancel = CancellationToken::new();
    producer
        .write(&cancel, acme.as_str(), b"a-1", &Headers::new(), b"{}")
        .await
        .unwrap();
    producer
        .write(&cancel, beta.as_str(), b"b-1", &Headers::new(), b"{}")
        .await
        .unwrap();

    let consumer = Consumer::new(broker.receiver(beta.as_str(), "llm-server"));
    assert_eq!(consumer.fetch(&cancel).await.unwrap().key, b"b-1");
    assert_eq!(broker.len(acme.as_str()), 1);
}

#[tokio::test]
async fn consumer_with_dedupe_skips_redelivered_keys() {
    let broker = InMemoryBroker::new();
    let producer = Producer::new(broker.sender());
    let metrics = Arc::new(Metrics::new());
    let consumer = Consumer::new(broker.receiver("llm.main.infer.results.v1", "g"))
        .with_metrics(Arc::clone(&metrics))
        .with_dedupe(Arc::new(Dedupe::new(Duration::from_secs(60))));
    let cancel = CancellationToken::new();

    for key in ["r-1", "r-1", "r-2", "r-1", "r-3"] {
        producer
            .write(
                &cancel,
                "llm.main.infer.results.v1",
                key.as_bytes(),
                &Headers::new(),
                b"{}",
            )
            .await
            .unwrap();
    }

    let mut keys = Vec::new();
    for _ in 0..3 {
        keys.push(consumer.fetch(&cancel).await.unwrap().key_str().into_owned());
    }
    assert_eq!(keys, vec!["r-1", "r-2", "r-3"]);

    // Duplicates still count as consumed from the broker.
    assert_eq!(metrics.snapshot().consumed, 5);
}

#[tokio::test]
async fn stream_yields_messages_until_canceled() {
    let broker = InMemoryBroker::new();
    let producer = Producer::new(broker.sender());
    let consumer = Consumer::new(broker.receiver("llm.main.embeddings.ingest.v1", "g"))
        .with_tracer(Arc::new(SpanTracer));
    let cancel = CancellationToken::new();

    for i in 0..3 {
        producer
            .write(
                &cancel,
                "llm.main.embeddings.ingest.v1",
                format!("doc-{i}").as_bytes(),
                &Headers::new(),
                b"{}",
            )
            .await
            .unwrap();
    }

    let mut stream = consumer.into_stream(cancel.clone());
    for i in 0..3 {
        let message = stream.next().await.unwrap().unwrap();
        assert_eq!(message.key_str(), format!("doc-{i}"));
    }

    cancel.cancel();
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn blocked_fetch_returns_when_canceled() {
    let broker = InMemoryBroker::new();
    let consumer = Consumer::new(broker.receiver("llm.main.infer.requests.v1", "g"));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    assert_eq!(consumer.fetch(&cancel).await, Err(MessagingError::Canceled));
    // Nothing was consumed, so nothing was lost.
    assert_eq!(consumer.metrics().snapshot().consumed, 0);
}

#[tokio::test]
async fn fetch_after_close_fails_and_second_close_reports_closed() {
    let broker = InMemoryBroker::new();
    let consumer = Consumer::new(broker.receiver("llm.main.infer.requests.v1", "g"));

    consumer.close().await.unwrap();
    assert_eq!(
        consumer.fetch(&CancellationToken::new()).await,
        Err(MessagingError::Closed("consumer"))
    );
    assert_eq!(consumer.close().await, Err(MessagingError::Closed("consumer")));
}

#[tokio::test]
async fn shared_metrics_count_successes_and_failures() {
    let broker = InMemoryBroker::new();
    let metrics = Arc::new(Metrics::new());
    let producer = Producer::new(broker.sender()).with_metrics(Arc::clone(&metrics));
    let cancel = CancellationToken::new();

    for i in 0..100 {
        producer
            .write(
                &cancel,
                "llm.main.infer.requests.v1",
                format!("req-{i}").as_bytes(),
                &Headers::new(),
                b"{}",
            )
            .await
            .unwrap();
    }

    broker.fail_next_sends(7);
    for _ in 0..7 {
        let result = producer
            .write(&cancel, "llm.main.infer.requests.v1", b"k", &Headers::new(), b"{}")
            .await;
        assert!(matches!(result, Err(MessagingError::Publish { .. })));
    }

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.produced, 100);
    assert_eq!(snapshot.errors, 7);
    assert_eq!(snapshot.consumed, 0);
    assert_eq!(broker.len("llm.main.infer.requests.v1"), 100);
}

#[tokio::test]
async fn concurrent_producers_lose_nothing() {
    let broker = InMemoryBroker::new();
    let producer = Arc::new(Producer::new(broker.sender()));
    let cancel = CancellationToken::new();

    let mut tasks = tokio::task::JoinSet::new();
    for worker in 0..8 {
        let producer = Arc::clone(&producer);
        let cancel = cancel.clone();
        tasks.spawn(async move {
            for i in 0..25 {
                producer
                    .write(
                        &cancel,
                        "llm.main.infer.requests.v1",
                        format!("w{worker}-{i}").as_bytes(),
                        &Headers::new(),
                        b"{}",
                    )
                    .await
                    .unwrap();
            }
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap();
    }

    assert_eq!(broker.len("llm.main.infer.requests.v1"), 200);
    assert_eq!(producer.metrics().snapshot().produced, 200);
}

#[tokio::test(start_paused = true)]
async fn heartbeat_without_workers_times_out_after_one_second() {
    let transport = InMemoryControlPlane::new();
    let control = ControlPlane::new(transport.clone());
    let tenant = TenantId::new("acme").unwrap();
    let started = tokio::time::Instant::now();

    let result = control.heartbeat(&CancellationToken::new(), &tenant).await;

    assert!(matches!(
        result,
        Err(MessagingError::HeartbeatTimeout { ref subject, timeout })
            if subject == "ctrl.acme.workers.heartbeat" && timeout == Duration::from_secs(1)
    ));
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert!(started.elapsed() < Duration::from_millis(1100));
    assert_eq!(transport.requests(), vec!["ctrl.acme.workers.heartbeat"]);
}

#[tokio::test(start_paused = true)]
async fn configured_windows_reach_control_plane_and_dedupe() {
    let config = MessagingConfig::from_lookup(|key| match key {
        "HEARTBEAT_TIMEOUT_MS" => Some("200".to_string()),
        "DEDUPE_TTL_MS" => Some("500".to_string()),
        _ => None,
    })
    .unwrap();

    let control = ControlPlane::from_config(InMemoryControlPlane::new(), &config);
    let started = tokio::time::Instant::now();
    let result = control
        .heartbeat(&CancellationToken::new(), &TenantId::new("acme").unwrap())
        .await;
    assert!(matches!(
        result,
        Err(MessagingError::HeartbeatTimeout { timeout, .. }) if timeout == Duration::from_millis(200)
    ));
    assert!(started.elapsed() < Duration::from_millis(300));

    assert_eq!(Dedupe::from_config(&config).ttl(), Duration::from_millis(500));
}

#[tokio::test]
async fn heartbeat_is_answered_by_registered_worker() {
    let transport = InMemoryControlPlane::new();
    transport.respond_on("ctrl.acme.workers.heartbeat", b"{}".to_vec());
    let control = ControlPlane::new(transport);

    control
        .heartbeat(&CancellationToken::new(), &TenantId::new("acme").unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn heartbeat_for_one_tenant_does_not_reach_another() {
    let transport = InMemoryControlPlane::new();
    transport.respond_on("ctrl.acme.workers.heartbeat", b"{}".to_vec());
    transport.report_no_responders(true);
    let control = ControlPlane::new(transport);

    let result = control
        .heartbeat(&CancellationToken::new(), &TenantId::new("beta").unwrap())
        .await;
    assert!(matches!(result, Err(MessagingError::HeartbeatTimeout { .. })));
}

#[tokio::test]
async fn control_events_are_stored_durably_per_tenant() {
    let transport = InMemoryControlPlane::new();
    let control = ControlPlane::new(transport.clone());
    let cancel = CancellationToken::new();
    let acme = TenantId::new("acme").unwrap();

    let event = serde_json::json!({ "model": "phi-4-mini-instruct", "state": "loaded" });
    control
        .publish(&cancel, &acme, "models.loaded", event.to_string().as_bytes())
        .await
        .unwrap();

    let stored = transport.published("ctrl.acme.models.loaded");
    assert_eq!(stored.len(), 1);
    let decoded: serde_json::Value = serde_json::from_slice(&stored[0]).unwrap();
    assert_eq!(decoded, event);
    assert!(transport.published("ctrl.beta.models.loaded").is_empty());
}

#[tokio::test]
async fn unavailable_control_plane_surfaces_publish_error() {
    let transport = InMemoryControlPlane::new();
    transport.set_unavailable(true);
    let control = ControlPlane::new(transport);

    let result = control
        .publish(
            &CancellationToken::new(),
            &TenantId::new("acme").unwrap(),
            "models.loaded",
            b"{}",
        )
        .await;
    assert!(matches!(result, Err(MessagingError::Publish { .. })));
}
