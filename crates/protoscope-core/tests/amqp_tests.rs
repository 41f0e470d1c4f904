//! AMQP dissection through the full tap: frames in, items out.

use std::time::Duration;

use bytes::{BufMut, BytesMut};
use proptest::prelude::*;
use serde_json::json;
use tokio_util::codec::Decoder;

use protoscope_core::amqp::methods::{BasicPublish, QueueDeclare, QueueDeclareOk};
use protoscope_core::amqp::{AmqpCodec, Frame, FrameType, Method, Properties};
use protoscope_core::model::MessagePayload;
use protoscope_core::testing::{builders, DissectHarness};
use protoscope_core::{Direction, ErrorKind};

const WAIT: Duration = Duration::from_secs(2);

fn declare(queue: &str) -> Method {
    Method::QueueDeclare(QueueDeclare {
        queue: queue.into(),
        durable: true,
        ..QueueDeclare::default()
    })
}

fn declare_ok(queue: &str) -> Method {
    Method::QueueDeclareOk(QueueDeclareOk {
        queue: queue.into(),
        message_count: 0,
        consumer_count: 0,
    })
}

#[tokio::test]
async fn test_queue_declare_is_paired() {
    let harness = DissectHarness::new();
    let conn = harness.open("amqp").unwrap();

    conn.client_bytes(builders::amqp::protocol_header()).await;
    conn.client_bytes(builders::amqp::method(1, declare("q1"))).await;
    conn.server_bytes(builders::amqp::method(1, declare_ok("q1"))).await;

    let items = harness.wait_for(1, WAIT).await;
    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert_eq!(item.protocol.name, "amqp");
    assert_eq!(item.connection.server_port, 5672);

    match (&item.pair.request.payload, &item.pair.response.payload) {
        (MessagePayload::Amqp(req), MessagePayload::Amqp(resp)) => {
            assert!(matches!(&req.method, Method::QueueDeclare(m) if m.queue == "q1"));
            assert!(matches!(&resp.method, Method::QueueDeclareOk(m) if m.queue == "q1"));
            assert_eq!(req.channel, 1);
        }
        other => panic!("unexpected payloads: {other:?}"),
    }

    let entry = harness.registry.analyze(item).unwrap();
    assert_eq!(entry.method, "queue declare");
    assert_eq!(entry.summary, "q1");

    let report = conn.finish().await;
    assert_eq!(report.flushed, 0);
    let stats = harness.matcher("amqp").unwrap().stats();
    assert_eq!(stats.pairs, 1);
    assert!(stats.is_balanced());
}

#[tokio::test]
async fn test_publish_with_body_is_one_way() {
    let harness = DissectHarness::new();
    let conn = harness.open("amqp").unwrap();

    let publish = Method::BasicPublish(BasicPublish {
        exchange: "orders".into(),
        routing_key: "created".into(),
        ..BasicPublish::default()
    });
    let properties = Properties {
        content_type: Some("text/plain".into()),
        ..Properties::default()
    };
    // body split over two frames
    conn.client_bytes(builders::amqp::content(1, publish, properties, b"hello", 3))
        .await;

    let items = harness.wait_for(1, WAIT).await;
    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert!(item.pair.response.is_empty());

    let entry = harness.registry.analyze(item).unwrap();
    assert_eq!(entry.method, "basic publish");
    assert_eq!(entry.request["body"], json!("aGVsbG8="));
    assert_eq!(entry.request["properties"]["contentType"], json!("text/plain"));
    assert_eq!(entry.request["details"]["exchange"], json!("orders"));
    assert!(entry.response.is_null());

    conn.finish().await;
    let stats = harness.matcher("amqp").unwrap().stats();
    assert_eq!(stats.requests, 1);
    assert_eq!(stats.orphans, 1);
    assert!(stats.is_balanced());
}

#[tokio::test]
async fn test_bad_frame_end_taints_half() {
    let harness = DissectHarness::new();
    let conn = harness.open("amqp").unwrap();

    let mut frame = BytesMut::from(&builders::amqp::method(1, declare("q1"))[..]);
    let last = frame.len() - 1;
    frame[last] = 0x00;
    conn.client_bytes(frame.freeze()).await;
    // bytes after the bad frame are discarded
    conn.client_bytes(builders::amqp::method(1, declare("q2"))).await;

    let report = conn.finish().await;
    let client = report.client.unwrap();
    assert!(client.is_tainted());
    assert_eq!(client.emitted, 0);
    assert!(!report.server.unwrap().is_tainted());

    assert_eq!(
        harness
            .metrics
            .error_count("amqp", Direction::Request, ErrorKind::ProtocolFormat),
        1
    );
    assert_eq!(
        harness
            .metrics
            .tainted_streams_total
            .with_label_values(&["amqp"])
            .get(),
        1
    );

    let stats = harness.shutdown().await.unwrap();
    assert_eq!(stats.emitted, 0);
}

#[tokio::test]
async fn test_unknown_class_is_skipped() {
    let harness = DissectHarness::new();
    let conn = harness.open("amqp").unwrap();

    let mut unknown = BytesMut::new();
    unknown.put_u16(999);
    unknown.put_u16(10);
    conn.client_bytes(builders::amqp::raw(FrameType::Method, 1, &unknown).freeze())
        .await;
    conn.client_bytes(builders::amqp::method(2, declare("after"))).await;
    conn.server_bytes(builders::amqp::method(2, declare_ok("after"))).await;

    let items = harness.wait_for(1, WAIT).await;
    assert_eq!(items.len(), 1);
    assert_eq!(harness.registry.analyze(&items[0]).unwrap().summary, "after");

    let report = conn.finish().await;
    assert!(!report.client.unwrap().is_tainted());
    assert_eq!(
        harness
            .metrics
            .error_count("amqp", Direction::Request, ErrorKind::UnknownMessage),
        1
    );
}

#[tokio::test]
async fn test_channels_pair_independently() {
    let harness = DissectHarness::new();
    let conn = harness.open("amqp").unwrap();

    conn.client_bytes(builders::amqp::method(1, declare("a"))).await;
    conn.client_bytes(builders::amqp::method(2, declare("b"))).await;
    conn.server_bytes(builders::amqp::method(2, declare_ok("b"))).await;
    conn.server_bytes(builders::amqp::method(1, declare_ok("a"))).await;

    let items = harness.wait_for(2, WAIT).await;
    assert_eq!(items.len(), 2);
    for item in &items {
        let (MessagePayload::Amqp(req), MessagePayload::Amqp(resp)) =
            (&item.pair.request.payload, &item.pair.response.payload)
        else {
            panic!("expected amqp payloads");
        };
        assert_eq!(req.channel, resp.channel);
    }
    conn.finish().await;
}

#[tokio::test]
async fn test_oversized_frame_taints_half() {
    let harness = DissectHarness::builder().amqp_max_frame_size(64).build();
    let conn = harness.open("amqp").unwrap();

    let payload = vec![0u8; 128];
    conn.client_bytes(builders::amqp::raw(FrameType::Body, 1, &payload).freeze())
        .await;

    let report = conn.finish().await;
    assert!(report.client.unwrap().is_tainted());
    assert!(harness.items().is_empty());
}

proptest! {
    #[test]
    fn test_arbitrary_bytes_never_panic(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        let mut codec = AmqpCodec::with_max_frame_size(4096);
        let mut buf = BytesMut::from(&data[..]);
        while let Ok(Some(raw)) = codec.decode(&mut buf) {
            let _ = Frame::parse(raw);
        }
    }
}
