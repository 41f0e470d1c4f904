//! Per-half-connection reader context.
//!
//! Carries what a dissector needs besides the bytes: connection identity,
//! capture time, the protocol's matcher and the way out to the emission
//! channel.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, warn};

use super::stream::CaptureClock;
use crate::error::ErrorKind;
use crate::matcher::RequestResponseMatcher;
use crate::metrics::ScopeMetrics;
use crate::model::{CaptureSource, ConnectionInfo, Direction, GenericMessage, OutputItem, ProtocolDescriptor, TcpId};
use crate::pipeline::OutputSender;

/// Shared handles a connection's dissectors emit through.
#[derive(Debug, Clone)]
pub struct Emitter {
    pub matcher: Arc<RequestResponseMatcher>,
    pub output: OutputSender,
    pub metrics: Arc<ScopeMetrics>,
}

impl Emitter {
    #[must_use]
    pub fn new(matcher: Arc<RequestResponseMatcher>, output: OutputSender, metrics: Arc<ScopeMetrics>) -> Self {
        Self {
            matcher,
            output,
            metrics,
        }
    }
}

/// Context of one dissector task.
#[derive(Debug)]
pub struct ReaderContext {
    tcp_id: TcpId,
    /// `Request` for the client half, `Response` for the server half.
    half: Direction,
    connection: ConnectionInfo,
    capture: CaptureSource,
    clock: CaptureClock,
    emitter: Emitter,
    tainted: AtomicBool,
    messages: AtomicU64,
    emitted: AtomicU64,
}

impl ReaderContext {
    #[must_use]
    pub fn new(
        tcp_id: TcpId,
        half: Direction,
        is_outgoing: bool,
        capture: CaptureSource,
        clock: CaptureClock,
        emitter: Emitter,
    ) -> Self {
        Self {
            connection: tcp_id.connection_info(is_outgoing),
            tcp_id,
            half,
            capture,
            clock,
            emitter,
            tainted: AtomicBool::new(false),
            messages: AtomicU64::new(0),
            emitted: AtomicU64::new(0),
        }
    }

    /// Capture time of the latest bytes read from this half.
    #[must_use]
    pub fn capture_time(&self) -> SystemTime {
        self.clock.now()
    }

    #[must_use]
    pub fn tcp_id(&self) -> &TcpId {
        &self.tcp_id
    }

    /// Whether this half carries client-to-server bytes.
    #[must_use]
    pub fn is_client(&self) -> bool {
        self.half == Direction::Request
    }

    #[must_use]
    pub fn half(&self) -> Direction {
        self.half
    }

    #[must_use]
    pub fn connection(&self) -> &ConnectionInfo {
        &self.connection
    }

    #[must_use]
    pub fn capture(&self) -> CaptureSource {
        self.capture
    }

    #[must_use]
    pub fn matcher(&self) -> &RequestResponseMatcher {
        &self.emitter.matcher
    }

    #[must_use]
    pub fn protocol(&self) -> &'static ProtocolDescriptor {
        self.emitter.matcher.protocol()
    }

    #[must_use]
    pub fn metrics(&self) -> &ScopeMetrics {
        &self.emitter.metrics
    }

    pub fn record_error(&self, kind: ErrorKind) {
        self.emitter
            .metrics
            .record_error(self.protocol().name, self.half, kind);
    }

    /// Hand a decoded message to the matcher, emitting the pair if this
    /// message completes one.
    pub async fn correlate(&self, direction: Direction, key: String, message: GenericMessage) {
        self.count_message(direction);
        let paired = self
            .emitter
            .matcher
            .register(direction, key, message, &self.connection, self.capture);
        if let Some(item) = paired {
            self.emit(item).await;
        }
    }

    /// Emit a self-contained message with an empty counterpart.
    pub async fn emit_one_way(&self, message: GenericMessage) {
        self.count_message(message.direction);
        let item = self
            .emitter
            .matcher
            .one_way(message, &self.connection, self.capture);
        self.emit(item).await;
    }

    async fn emit(&self, item: OutputItem) {
        if self.is_tainted() {
            return;
        }
        if self.emitter.output.send(item).await.is_err() {
            debug!(tcp = %self.tcp_id, "emission channel closed, dropping item");
            return;
        }
        self.emitted.fetch_add(1, Ordering::Relaxed);
    }

    fn count_message(&self, direction: Direction) {
        self.messages.fetch_add(1, Ordering::Relaxed);
        self.emitter
            .metrics
            .record_message(self.protocol().name, direction);
    }

    /// Stop emitting from this half. Returns `false` if it was already tainted.
    pub fn taint(&self) -> bool {
        if self.tainted.swap(true, Ordering::AcqRel) {
            return false;
        }
        warn!(tcp = %self.tcp_id, half = %self.half, protocol = self.protocol().name, "stream tainted");
        self.emitter.metrics.record_tainted(self.protocol().name);
        true
    }

    #[must_use]
    pub fn is_tainted(&self) -> bool {
        self.tainted.load(Ordering::Acquire)
    }

    /// Messages decoded on this half.
    #[must_use]
    pub fn messages(&self) -> u64 {
        self.messages.load(Ordering::Relaxed)
    }

    /// Items this half pushed into the emission channel.
    #[must_use]
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }
}
