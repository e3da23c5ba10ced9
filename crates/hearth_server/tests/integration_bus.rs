//! Integration bus delivery, isolation and presence.

use hearth_protocol::{PollRequest, Source};
use hearth_server::{ServerError, ServerConfig};
use hearth_testkit::{
    eventually, fast_config, json_value, key, test_server, test_server_with, Recorded,
    RecordingIntegration,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn every_source_is_delivered_except_own_writes() {
    let server = test_server();
    let mqtt = Arc::new(RecordingIntegration::new("mqtt"));
    let webhook = Arc::new(RecordingIntegration::new("webhook"));
    assert!(server.register_integration(mqtt.clone()).await.unwrap());
    assert!(server.register_integration(webhook.clone()).await.unwrap());

    server
        .commit(&key("shared.A"), json_value(json!({"t": 1})), Source::integration("mqtt"))
        .await
        .unwrap();
    server
        .commit(&key("shared.A"), json_value(json!({"t": 2})), Source::Device)
        .await
        .unwrap();

    let webhook_calls = webhook.wait_for_calls(2, WAIT).await;
    assert_eq!(webhook_calls.len(), 2);

    let mqtt_calls = mqtt.wait_for_calls(1, WAIT).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(mqtt.calls().len(), 1);
    let Recorded::State(event) = &mqtt_calls[0] else {
        panic!("expected a state change");
    };
    assert_eq!(event.revision, 2);
    assert_eq!(event.source, Source::Device);
}

#[tokio::test]
async fn failing_integration_does_not_block_others() {
    let server = test_server();
    let broken = Arc::new(RecordingIntegration::new("broken").failing());
    let slow = Arc::new(RecordingIntegration::new("slow").with_delay(Duration::from_millis(200)));
    let healthy = Arc::new(RecordingIntegration::new("healthy"));
    for integration in [broken.clone(), slow.clone(), healthy.clone()] {
        server.register_integration(integration).await.unwrap();
    }

    let started = std::time::Instant::now();
    for n in 0..3 {
        server
            .commit(&key("device.A"), json_value(json!({"n": n})), Source::Api)
            .await
            .unwrap();
    }
    assert!(started.elapsed() < Duration::from_millis(200));

    healthy.wait_for_calls(3, WAIT).await;
    broken.wait_for_calls(3, WAIT).await;
    assert!(slow.calls().len() < 3);
    slow.wait_for_calls(3, WAIT).await;

    let revisions: Vec<u64> = healthy.events().iter().map(|e| e.revision).collect();
    assert_eq!(revisions, vec![1, 2, 3]);
}

#[tokio::test]
async fn panicking_callback_does_not_stop_the_worker() {
    let server = test_server();
    let fragile = Arc::new(RecordingIntegration::new("fragile").panicking_on_revision(1));
    server.register_integration(fragile.clone()).await.unwrap();

    for n in 0..3 {
        server
            .commit(&key("device.A"), json_value(json!({"n": n})), Source::Api)
            .await
            .unwrap();
    }

    fragile.wait_for_calls(2, WAIT).await;
    let revisions: Vec<u64> = fragile.events().iter().map(|e| e.revision).collect();
    assert_eq!(revisions, vec![2, 3]);
    assert_eq!(server.integrations(), vec!["fragile".to_string()]);
}

#[tokio::test]
async fn scope_filters_devices() {
    let server = test_server();
    let scoped = Arc::new(RecordingIntegration::new("scoped").with_scope(["A"]));
    server.register_integration(scoped.clone()).await.unwrap();

    server
        .commit(&key("device.B"), json_value(json!({"n": 1})), Source::Api)
        .await
        .unwrap();
    server
        .commit(&key("device.A"), json_value(json!({"n": 1})), Source::Api)
        .await
        .unwrap();

    let calls = scoped.wait_for_calls(1, WAIT).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(scoped.calls().len(), 1);
    let Recorded::State(event) = &calls[0] else {
        panic!("expected a state change");
    };
    assert_eq!(event.serial.as_deref(), Some("A"));
}

#[tokio::test]
async fn register_and_unregister_are_idempotent() {
    let server = test_server();
    let first = Arc::new(RecordingIntegration::new("mqtt"));
    let second = Arc::new(RecordingIntegration::new("mqtt"));

    assert!(server.register_integration(first.clone()).await.unwrap());
    assert!(!server.register_integration(second.clone()).await.unwrap());
    assert_eq!(first.initialize_count(), 1);
    assert_eq!(second.initialize_count(), 0);
    assert_eq!(server.integrations(), vec!["mqtt".to_string()]);

    assert!(server.unregister_integration("mqtt").await.unwrap());
    assert!(first.is_shut_down());
    assert!(!server.unregister_integration("mqtt").await.unwrap());
    assert!(server.integrations().is_empty());

    server
        .commit(&key("device.A"), json_value(json!({"n": 1})), Source::Api)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(first.calls().is_empty());
}

#[tokio::test]
async fn failed_initialize_registers_nothing() {
    let server = test_server();
    let integration = Arc::new(RecordingIntegration::new("mqtt").failing_initialize());

    let err = server.register_integration(integration).await.unwrap_err();
    assert!(matches!(err, ServerError::IntegrationFailure { ref name, .. } if name == "mqtt"));
    assert!(server.integrations().is_empty());
}

#[tokio::test]
async fn unregister_drains_queued_events() {
    let server = test_server();
    let slow = Arc::new(RecordingIntegration::new("slow").with_delay(Duration::from_millis(20)));
    server.register_integration(slow.clone()).await.unwrap();

    for n in 0..5 {
        server
            .commit(&key("device.A"), json_value(json!({"n": n})), Source::Api)
            .await
            .unwrap();
    }
    eventually(WAIT, || !slow.calls().is_empty()).await;
    server.unregister_integration("slow").await.unwrap();

    assert!(slow.is_shut_down());
    assert_eq!(slow.events().len(), 5);
}

#[tokio::test]
async fn polling_device_connects_and_idle_device_disconnects() {
    let config: ServerConfig = fast_config().with_liveness_window(Duration::from_millis(50));
    let server = test_server_with(config);
    let presence = Arc::new(RecordingIntegration::new("presence"));
    server.register_integration(presence.clone()).await.unwrap();

    server
        .poll(PollRequest::new("A", vec![key("device.A")]).with_timeout_ms(10))
        .await
        .unwrap();
    server
        .poll(PollRequest::new("A", vec![key("device.A")]).with_timeout_ms(10))
        .await
        .unwrap();

    let calls = presence.wait_for_calls(2, WAIT).await;
    assert_eq!(
        calls,
        vec![
            Recorded::Connected("A".into()),
            Recorded::Disconnected("A".into()),
        ]
    );
    assert!(!server.presence().is_connected("A"));
}

#[tokio::test]
async fn shutdown_stops_integrations() {
    let server = test_server();
    let integration = Arc::new(RecordingIntegration::new("mqtt"));
    server.register_integration(integration.clone()).await.unwrap();

    server.shutdown().await;
    assert!(integration.is_shut_down());
    assert!(server.integrations().is_empty());
    assert!(matches!(
        server.register_integration(integration).await,
        Err(ServerError::ShuttingDown)
    ));
}
