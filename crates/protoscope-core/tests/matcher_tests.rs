//! Matcher accounting under arbitrary arrival orders.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use proptest::prelude::*;

use protoscope_core::amqp::methods::ChannelOpen;
use protoscope_core::amqp::{AmqpMessage, Method, AMQP_PROTOCOL};
use protoscope_core::config::MatcherConfig;
use protoscope_core::model::MessagePayload;
use protoscope_core::{
    CaptureSource, ConnectionInfo, Direction, GenericMessage, RequestResponseMatcher, ScopeMetrics, TcpId,
};

fn connection() -> ConnectionInfo {
    TcpId::new(
        "10.0.0.1:40000".parse().unwrap(),
        "10.0.0.2:5672".parse().unwrap(),
    )
    .connection_info(false)
}

fn matcher(emit_orphans: bool) -> RequestResponseMatcher {
    let config = MatcherConfig {
        orphan_retention_ms: 1_000,
        emit_orphans,
        ..MatcherConfig::default()
    };
    RequestResponseMatcher::new(&AMQP_PROTOCOL, config, Arc::new(ScopeMetrics::new()))
}

fn at(millis: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(millis)
}

fn message(direction: Direction, millis: u64) -> GenericMessage {
    let payload = AmqpMessage::new(1, Method::ChannelOpen(ChannelOpen::default()));
    GenericMessage::new(direction, at(millis), 16, MessagePayload::Amqp(payload))
}

fn direction(is_request: bool) -> Direction {
    if is_request {
        Direction::Request
    } else {
        Direction::Response
    }
}

proptest! {
    #[test]
    fn test_accounting_balances_for_any_arrival_order(
        arrivals in proptest::collection::vec((any::<bool>(), 0u8..6), 0..64),
        emit_orphans in any::<bool>(),
    ) {
        let matcher = matcher(emit_orphans);
        let conn = connection();
        let mut pending: HashMap<u8, Direction> = HashMap::new();
        let mut expected_pairs = 0;
        let mut emitted = 0;

        for (i, (is_request, key)) in arrivals.iter().enumerate() {
            let dir = direction(*is_request);
            let item = matcher.register(dir, format!("k{key}"), message(dir, i as u64), &conn, CaptureSource::Pcap);

            match pending.get(key) {
                Some(waiting) if *waiting != dir => {
                    pending.remove(key);
                    expected_pairs += 1;
                    prop_assert!(item.is_some());
                    emitted += 1;
                }
                _ => {
                    pending.insert(*key, dir);
                    prop_assert!(item.is_none());
                }
            }
            prop_assert!(matcher.stats().is_balanced());
        }

        let stats = matcher.stats();
        prop_assert_eq!(stats.pairs, expected_pairs);
        prop_assert_eq!(stats.pending, pending.len() as u64);

        let evicted = matcher.evict_expired(at(10_000));
        let waiting_requests = pending.values().filter(|d| **d == Direction::Request).count();
        if emit_orphans {
            prop_assert_eq!(evicted.len(), waiting_requests);
        } else {
            prop_assert!(evicted.is_empty());
        }
        emitted += evicted.len() as u64;

        let stats = matcher.stats();
        prop_assert_eq!(stats.pending, 0);
        prop_assert!(stats.is_balanced());
        prop_assert_eq!(stats.pairs + stats.orphans, emitted);
        prop_assert_eq!(stats.requests + stats.responses, arrivals.len() as u64);
    }
}

#[test]
fn test_evicted_items_are_ordered_by_time_then_endpoints() {
    let matcher = matcher(true);
    let early = TcpId::new(
        "10.0.0.9:1000".parse().unwrap(),
        "10.0.0.2:5672".parse().unwrap(),
    )
    .connection_info(false);
    let late = connection();

    for (key, conn, time) in [("a", &late, 300), ("b", &early, 100), ("c", &late, 100)] {
        matcher.register(
            Direction::Request,
            key.to_string(),
            message(Direction::Request, time),
            conn,
            CaptureSource::Pcap,
        );
    }

    let items = matcher.evict_expired(at(5_000));
    let order: Vec<(i64, IpAddr)> = items
        .iter()
        .map(|item| (item.pair.request.capture_millis(), item.connection.client_ip))
        .collect();
    let first: IpAddr = "10.0.0.1".parse().unwrap();
    let second: IpAddr = "10.0.0.9".parse().unwrap();
    assert_eq!(order, vec![(100, first), (100, second), (300, first)]);
}
