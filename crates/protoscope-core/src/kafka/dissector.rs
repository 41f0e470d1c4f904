//! Kafka stream dissection.
//!
//! The client half decodes requests and registers them under their
//! correlation key. A response header only carries the correlation id, so
//! the server half waits for the matching request to learn the api key
//! and version before it can decode the body.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use futures::StreamExt;
use tokio_util::codec::FramedRead;
use tracing::{debug, trace, warn};

use super::api_key::ApiKey;
use super::frame::KafkaFrameCodec;
use super::message::{decode_request, decode_response, response_correlation_id};
use crate::error::{DissectError, ErrorKind};
use crate::extension::DissectOptions;
use crate::model::{ConnectionInfo, Direction, GenericMessage, MessagePayload};
use crate::network::{HalfStream, ReaderContext, TimedCodec};

/// Matcher key: `{clientIP}:{clientPort}->{serverIP}:{serverPort}::{correlationId}`.
#[must_use]
pub fn correlation_key(conn: &ConnectionInfo, correlation_id: i32) -> String {
    format!(
        "{}:{}->{}:{}::{}",
        conn.client_ip, conn.client_port, conn.server_ip, conn.server_port, correlation_id
    )
}

/// Correlation ids seen recently on one client half.
#[derive(Debug)]
pub struct RecentRequests {
    retention: Duration,
    seen: HashMap<i32, SystemTime>,
}

impl RecentRequests {
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            seen: HashMap::new(),
        }
    }

    /// Record `correlation_id` at `now`, purging entries older than the
    /// retention window. Returns `true` if the id was already pending.
    pub fn observe(&mut self, correlation_id: i32, now: SystemTime) -> bool {
        let retention = self.retention;
        self.seen.retain(|_, at| {
            now.duration_since(*at)
                .map_or(true, |age| age <= retention)
        });
        self.seen.insert(correlation_id, now).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Dissect one half-connection of Kafka traffic.
pub(crate) async fn dissect(
    stream: &mut HalfStream,
    ctx: &ReaderContext,
    options: &DissectOptions,
) -> Result<(), DissectError> {
    if ctx.is_client() {
        dissect_requests(stream, ctx, options).await
    } else {
        dissect_responses(stream, ctx, options).await
    }
}

async fn dissect_requests(
    stream: &mut HalfStream,
    ctx: &ReaderContext,
    options: &DissectOptions,
) -> Result<(), DissectError> {
    let codec = TimedCodec::new(KafkaFrameCodec::requests(options.kafka_max_message_size), stream.clock());
    let mut frames = FramedRead::new(stream, codec);
    let mut recent = RecentRequests::new(options.request_retention);

    while let Some(frame) = frames.next().await {
        let (frame, captured_at) = frame?;
        let size = 4 + frame.len();

        let message = match decode_request(frame) {
            Ok(message) => message,
            Err(e) if e.kind() == ErrorKind::UnknownMessage => {
                debug!(tcp = %ctx.tcp_id(), error = %e, "skipping request");
                ctx.record_error(ErrorKind::UnknownMessage);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if message.is_opaque() {
            debug!(
                tcp = %ctx.tcp_id(),
                api_key = message.api_key.name(),
                api_version = message.api_version,
                "no schema for request, keeping header only"
            );
            ctx.record_error(ErrorKind::VersionUnsupported);
        }
        if recent.observe(message.correlation_id, captured_at) {
            warn!(
                tcp = %ctx.tcp_id(),
                correlation_id = message.correlation_id,
                "correlation id reused before its response"
            );
        }
        trace!(
            tcp = %ctx.tcp_id(),
            api_key = message.api_key.name(),
            correlation_id = message.correlation_id,
            "kafka request"
        );

        let key = correlation_key(ctx.connection(), message.correlation_id);
        let msg = GenericMessage::new(Direction::Request, captured_at, size, MessagePayload::Kafka(message));
        ctx.correlate(Direction::Request, key, msg).await;
    }
    Ok(())
}

fn request_version(message: &GenericMessage) -> Option<(ApiKey, i16)> {
    match &message.payload {
        MessagePayload::Kafka(m) => Some((m.api_key, m.api_version)),
        _ => None,
    }
}

async fn dissect_responses(
    stream: &mut HalfStream,
    ctx: &ReaderContext,
    options: &DissectOptions,
) -> Result<(), DissectError> {
    let codec = TimedCodec::new(KafkaFrameCodec::responses(options.kafka_max_message_size), stream.clock());
    let mut frames = FramedRead::new(stream, codec);

    while let Some(frame) = frames.next().await {
        let (frame, captured_at) = frame?;
        let size = 4 + frame.len();
        let Some(correlation_id) = response_correlation_id(&frame) else {
            continue;
        };
        let key = correlation_key(ctx.connection(), correlation_id);

        let found = ctx
            .matcher()
            .wait_for_request(&key, options.response_wait, request_version)
            .await;
        let Some((api_key, api_version)) = found else {
            debug!(tcp = %ctx.tcp_id(), correlation_id, "no request for response, skipping");
            ctx.record_error(ErrorKind::MatchTimeout);
            continue;
        };

        let message = decode_response(frame, api_key, api_version)?;
        trace!(tcp = %ctx.tcp_id(), api_key = api_key.name(), correlation_id, "kafka response");
        let msg = GenericMessage::new(Direction::Response, captured_at, size, MessagePayload::Kafka(message));
        ctx.correlate(Direction::Response, key, msg).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TcpId;
    use std::time::UNIX_EPOCH;

    #[test]
    fn test_correlation_key_format() {
        let conn = TcpId::new(
            "10.0.0.1:40000".parse().unwrap(),
            "10.0.0.2:9092".parse().unwrap(),
        )
        .connection_info(false);
        assert_eq!(correlation_key(&conn, 7), "10.0.0.1:40000->10.0.0.2:9092::7");
    }

    #[test]
    fn test_recent_requests_purge_and_duplicates() {
        let mut recent = RecentRequests::new(Duration::from_secs(30));
        let t0 = UNIX_EPOCH + Duration::from_secs(100);
        assert!(!recent.observe(1, t0));
        assert!(recent.observe(1, t0 + Duration::from_secs(1)));
        assert!(!recent.observe(2, t0 + Duration::from_secs(2)));
        assert_eq!(recent.len(), 2);

        // both entries are older than 30 s by now
        assert!(!recent.observe(3, t0 + Duration::from_secs(40)));
        assert_eq!(recent.len(), 1);
    }
}
