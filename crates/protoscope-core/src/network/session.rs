//! Runs one dissector over one half-connection.
//!
//! A failing or panicking dissector only affects its own half: the half is
//! tainted, the rest of its bytes are discarded, and every other stream
//! keeps going.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, instrument, warn};

use super::context::ReaderContext;
use super::stream::HalfStream;
use crate::error::{DissectError, ErrorKind};
use crate::extension::{DissectOptions, Extension};
use crate::model::Direction;

/// Outcome of a finished half.
#[derive(Debug)]
pub struct HalfReport {
    pub half: Direction,
    /// Bytes read from the stream, including those discarded after a taint.
    pub bytes: u64,
    pub messages: u64,
    pub emitted: u64,
    pub error: Option<DissectError>,
}

impl HalfReport {
    #[must_use]
    pub fn is_tainted(&self) -> bool {
        self.error.is_some()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Dissect `stream` until it ends.
#[instrument(skip_all, fields(protocol = ctx.protocol().name, tcp = %ctx.tcp_id(), half = %ctx.half()))]
pub async fn run_half(
    extension: Arc<dyn Extension>,
    mut stream: HalfStream,
    ctx: ReaderContext,
    options: Arc<DissectOptions>,
) -> HalfReport {
    let metrics = ctx.metrics();
    metrics.inc_active_streams();

    let outcome = AssertUnwindSafe(extension.dissect(&mut stream, &ctx, &options))
        .catch_unwind()
        .await;

    let error = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e),
        Err(payload) => Some(DissectError::Panicked(panic_message(payload.as_ref()))),
    };

    let mut bytes = stream.consumed();
    if let Some(e) = &error {
        let kind = match e.kind() {
            ErrorKind::Transient => ErrorKind::ProtocolFormat,
            kind => kind,
        };
        warn!(error = %e, kind = kind.as_str(), "dissector failed, discarding rest of stream");
        ctx.record_error(kind);
        ctx.taint();
        bytes += stream.drain().await;
    }

    metrics.record_bytes(ctx.protocol().name, ctx.half(), bytes);
    metrics.dec_active_streams();
    debug!(bytes, messages = ctx.messages(), emitted = ctx.emitted(), "half-connection finished");

    HalfReport {
        half: ctx.half(),
        bytes,
        messages: ctx.messages(),
        emitted: ctx.emitted(),
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatcherConfig;
    use crate::kafka::KAFKA_PROTOCOL;
    use crate::matcher::RequestResponseMatcher;
    use crate::metrics::ScopeMetrics;
    use crate::model::{BaseEntry, CaptureSource, Entry, OutputItem, ProtocolDescriptor, TcpId};
    use crate::network::context::Emitter;
    use crate::network::stream::{half_stream, Segment};
    use crate::pipeline::output_channel;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::BTreeMap;
    use tokio::io::AsyncReadExt;

    /// Reads one byte, then panics.
    struct Exploding;

    #[async_trait]
    impl Extension for Exploding {
        fn protocol(&self) -> &'static ProtocolDescriptor {
            &KAFKA_PROTOCOL
        }

        fn ping(&self) -> &'static str {
            "pong exploding"
        }

        async fn dissect(
            &self,
            stream: &mut HalfStream,
            _ctx: &ReaderContext,
            _options: &DissectOptions,
        ) -> Result<(), DissectError> {
            let mut byte = [0u8; 1];
            stream.read_exact(&mut byte).await?;
            panic!("bad byte {}", byte[0]);
        }

        fn analyze(&self, item: &OutputItem, _: Option<&str>, _: Option<&str>) -> Entry {
            Entry::from_item(item, None, None)
        }

        fn summarize(&self, entry: &Entry) -> BaseEntry {
            BaseEntry::from_entry(entry, None)
        }

        fn represent(&self, _: &Value, _: &Value) -> Result<Vec<u8>, serde_json::Error> {
            Ok(Vec::new())
        }

        fn macros(&self) -> BTreeMap<String, String> {
            BTreeMap::new()
        }
    }

    #[tokio::test]
    async fn test_panic_taints_and_drains() {
        let metrics = Arc::new(ScopeMetrics::new());
        let matcher = Arc::new(RequestResponseMatcher::new(
            &KAFKA_PROTOCOL,
            MatcherConfig::default(),
            Arc::clone(&metrics),
        ));
        let (out_tx, _out_rx) = output_channel(4);
        let (tx, stream) = half_stream(4);
        let ctx = ReaderContext::new(
            TcpId::new("10.0.0.1:1".parse().unwrap(), "10.0.0.2:2".parse().unwrap()),
            Direction::Request,
            false,
            CaptureSource::Pcap,
            stream.clock(),
            Emitter::new(matcher, out_tx, Arc::clone(&metrics)),
        );

        tx.send(Ok(Segment::now(&b"\x07rest"[..]))).await.unwrap();
        tx.send(Ok(Segment::now(&b"more"[..]))).await.unwrap();
        drop(tx);

        let report = run_half(Arc::new(Exploding), stream, ctx, Arc::new(DissectOptions::default())).await;
        assert!(report.is_tainted());
        assert!(matches!(&report.error, Some(DissectError::Panicked(msg)) if msg == "bad byte 7"));
        assert_eq!(report.bytes, 9);
        assert_eq!(
            metrics.error_count("kafka", Direction::Request, ErrorKind::ProtocolFormat),
            1
        );
        assert_eq!(metrics.active_streams.get(), 0);
    }
}
