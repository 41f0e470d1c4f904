//! Emission pipeline: service-IP filtering and entry output.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use protoscope_core::amqp::methods::{QueueDeclare, QueueDeclareOk};
use protoscope_core::amqp::Method;
use protoscope_core::config::MatcherConfig;
use protoscope_core::pipeline::EntrySink;
use protoscope_core::testing::{builders, DissectHarness};
use protoscope_core::{
    output_channel, CaptureSource, DissectOptions, EmissionPipeline, ExtensionRegistry, KnownServiceIps, ScopeMetrics,
    ScopeTap, TcpId,
};

fn declare() -> Method {
    Method::QueueDeclare(QueueDeclare {
        queue: "jobs".into(),
        ..QueueDeclare::default()
    })
}

fn declare_ok() -> Method {
    Method::QueueDeclareOk(QueueDeclareOk {
        queue: "jobs".into(),
        ..QueueDeclareOk::default()
    })
}

fn tcp_id(client_port: u16, server: &str) -> TcpId {
    TcpId::new(
        ([10, 0, 0, 1], client_port).into(),
        server.parse().unwrap(),
    )
}

#[tokio::test]
async fn test_outgoing_items_to_known_services_are_filtered() {
    let harness = DissectHarness::builder()
        .known_service_ip("10.0.0.50".parse().unwrap())
        .build();

    // outgoing to a known service: filtered
    let known = harness
        .open_with("amqp", tcp_id(41000, "10.0.0.50:5672"), true)
        .unwrap();
    known.client_bytes(builders::amqp::method(1, declare())).await;
    known.server_bytes(builders::amqp::method(1, declare_ok())).await;
    known.finish().await;

    // incoming to the same address: kept
    let incoming = harness
        .open_with("amqp", tcp_id(41001, "10.0.0.50:5672"), false)
        .unwrap();
    incoming.client_bytes(builders::amqp::method(1, declare())).await;
    incoming.server_bytes(builders::amqp::method(1, declare_ok())).await;
    incoming.finish().await;

    // outgoing to an unknown address: kept
    let other = harness
        .open_with("amqp", tcp_id(41002, "10.0.0.60:5672"), true)
        .unwrap();
    other.client_bytes(builders::amqp::method(1, declare())).await;
    other.server_bytes(builders::amqp::method(1, declare_ok())).await;
    other.finish().await;

    let metrics = Arc::clone(&harness.metrics);
    let sink = harness.sink.clone();
    let stats = harness.shutdown().await.unwrap();

    assert_eq!(stats.received, 3);
    assert_eq!(stats.filtered, 1);
    assert_eq!(stats.emitted, 2);
    assert_eq!(metrics.items_filtered_total.get(), 1);

    let ports: Vec<u16> = sink.items().iter().map(|i| i.connection.client_port).collect();
    assert!(ports.contains(&41001));
    assert!(ports.contains(&41002));
}

#[tokio::test]
async fn test_known_ips_update_while_running() {
    let harness = DissectHarness::new();
    harness.known_ips.insert("10.0.0.70".parse().unwrap());

    let conn = harness
        .open_with("amqp", tcp_id(42000, "10.0.0.70:5672"), true)
        .unwrap();
    conn.client_bytes(builders::amqp::method(1, declare())).await;
    conn.server_bytes(builders::amqp::method(1, declare_ok())).await;
    conn.finish().await;

    let sink = harness.sink.clone();
    let stats = harness.shutdown().await.unwrap();
    assert_eq!(stats.filtered, 1);
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_entries_written_as_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("entries.jsonl");
    let file = tokio::fs::File::create(&path).await.unwrap();

    let metrics = Arc::new(ScopeMetrics::new());
    let registry = Arc::new(ExtensionRegistry::with_defaults(&MatcherConfig::default(), &metrics));
    let (output, input) = output_channel(16);
    let pipeline = EmissionPipeline::new(input, KnownServiceIps::default(), Arc::clone(&metrics))
        .with_sink(EntrySink::new(file, Arc::clone(&registry)));
    let pipeline = tokio::spawn(pipeline.run());

    let tap = ScopeTap::new(registry, output, metrics, DissectOptions::default(), 8);
    let conn = tap
        .open_connection("amqp", tcp_id(43000, "10.0.0.2:5672"), false, CaptureSource::Envoy)
        .unwrap();
    conn.client_bytes(builders::amqp::method(3, declare())).await;
    conn.server_bytes(builders::amqp::method(3, declare_ok())).await;
    conn.finish().await;
    drop(tap);

    let stats = tokio::time::timeout(Duration::from_secs(2), pipeline)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(stats.emitted, 1);

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 1);

    let entry: Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(entry["protocol"]["name"], "amqp");
    assert_eq!(entry["method"], "queue declare");
    assert_eq!(entry["summary"], "jobs");
    assert_eq!(entry["source"]["port"], 43000);
    assert_eq!(entry["destination"]["ip"], "10.0.0.2");
    assert_eq!(entry["request"]["details"]["queue"], "jobs");
    assert_eq!(entry["response"]["method"], "queue declare-ok");
}
