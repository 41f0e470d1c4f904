//! AMQP stream dissection.
//!
//! Frames are read with [`AmqpCodec`], parsed, and content-bearing methods
//! (publish, return, deliver, get-ok) are held per channel until their
//! header and body frames have arrived. Completed methods are then
//! classified:
//!
//! - replies are registered as responses under their request's key
//! - methods that wait for a reply are registered as requests
//! - everything else is emitted immediately with an empty response
//!
//! A channel holds at most [`MAX_PENDING_CONTENT`] methods waiting for
//! content; past that the oldest is discarded as a format error.

use std::collections::{HashMap, VecDeque};
use std::time::SystemTime;

use futures::StreamExt;
use tokio_util::codec::FramedRead;
use tracing::{debug, trace};

use super::frame::{AmqpCodec, Frame};
use super::methods::Method;
use super::properties::ContentHeader;
use super::AmqpMessage;
use crate::error::{DissectError, ErrorKind};
use crate::extension::DissectOptions;
use crate::model::{ConnectionInfo, Direction, GenericMessage, MessagePayload};
use crate::network::{HalfStream, ReaderContext, TimedCodec};
use crate::wire::PagedBytesBuilder;

/// A method whose content has been fully collected.
#[derive(Debug, Clone, PartialEq)]
pub struct Assembled {
    pub message: AmqpMessage,
    pub captured_at: SystemTime,
    /// Wire bytes of the method, header and body frames.
    pub size: usize,
}

#[derive(Debug)]
struct PendingContent {
    method: Method,
    captured_at: SystemTime,
    size: usize,
    header: Option<ContentHeader>,
    body: PagedBytesBuilder,
}

impl PendingContent {
    fn is_complete(&self) -> bool {
        self.header
            .as_ref()
            .is_some_and(|h| self.body.len() as u64 >= h.body_size)
    }

    fn finish(self, channel: u16) -> Assembled {
        let mut message = AmqpMessage::new(channel, self.method);
        message.properties = self.header.map(|h| h.properties);
        message.body = Some(self.body.build());
        Assembled {
            message,
            captured_at: self.captured_at,
            size: self.size,
        }
    }
}

/// Content methods a single channel may hold before the oldest is dropped.
pub const MAX_PENDING_CONTENT: usize = 64;

/// Per-channel queues of content methods awaiting their header and body.
#[derive(Debug, Default)]
pub struct ContentAssembler {
    channels: HashMap<u16, VecDeque<PendingContent>>,
    discarded: usize,
}

impl ContentAssembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of methods still waiting for content.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.channels.values().map(VecDeque::len).sum()
    }

    /// Methods discarded for a full channel queue since the last call.
    pub fn take_discarded(&mut self) -> usize {
        std::mem::take(&mut self.discarded)
    }

    /// Feed one parsed frame; returns a method once it is complete.
    pub fn push(&mut self, frame: Frame, captured_at: SystemTime, wire_len: usize) -> Option<Assembled> {
        match frame {
            Frame::Heartbeat => None,
            Frame::Method { channel, method } if method.has_content() => {
                let queue = self.channels.entry(channel).or_default();
                if queue.len() >= MAX_PENDING_CONTENT {
                    if let Some(oldest) = queue.pop_front() {
                        debug!(channel, method = oldest.method.name(), "content queue full, dropping oldest");
                        self.discarded += 1;
                    }
                }
                queue.push_back(PendingContent {
                    method,
                    captured_at,
                    size: wire_len,
                    header: None,
                    body: PagedBytesBuilder::new(),
                });
                None
            }
            Frame::Method { channel, method } => Some(Assembled {
                message: AmqpMessage::new(channel, method),
                captured_at,
                size: wire_len,
            }),
            Frame::Header { channel, header } => {
                let Some(queue) = self.channels.get_mut(&channel) else {
                    debug!(channel, "content header without a pending method");
                    return None;
                };
                let Some(pending) = queue.iter_mut().find(|p| p.header.is_none()) else {
                    debug!(channel, "content header without a pending method");
                    return None;
                };
                pending.header = Some(header);
                pending.size += wire_len;
                self.complete_front(channel)
            }
            Frame::Body { channel, body } => {
                let pending = self
                    .channels
                    .get_mut(&channel)
                    .and_then(VecDeque::front_mut)
                    .filter(|p| p.header.is_some());
                let Some(pending) = pending else {
                    debug!(channel, "content body without a pending header");
                    return None;
                };
                pending.size += wire_len;
                pending.body.push(body);
                self.complete_front(channel)
            }
        }
    }

    fn complete_front(&mut self, channel: u16) -> Option<Assembled> {
        let queue = self.channels.get_mut(&channel)?;
        if !queue.front().is_some_and(PendingContent::is_complete) {
            return None;
        }
        let done = queue.pop_front()?;
        if queue.is_empty() {
            self.channels.remove(&channel);
        }
        Some(done.finish(channel))
    }
}

/// How a completed method takes part in correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Registered as a request under its own method id.
    Request,
    /// Registered as a response under the given request method id.
    Reply(u16),
    /// Emitted at once with an empty response.
    OneWay,
}

impl Role {
    #[must_use]
    pub fn of(method: &Method) -> Self {
        if let Some(request_id) = method.request_method_id() {
            Self::Reply(request_id)
        } else if method.wait() {
            Self::Request
        } else {
            Self::OneWay
        }
    }
}

/// Matcher key: `{clientIP}_{clientPort}_{serverIP}_{serverPort}_{channel}_{class}_{method}`.
#[must_use]
pub fn correlation_key(conn: &ConnectionInfo, channel: u16, class_id: u16, method_id: u16) -> String {
    format!(
        "{}_{}_{}_{}_{}_{}_{}",
        conn.client_ip, conn.client_port, conn.server_ip, conn.server_port, channel, class_id, method_id
    )
}

/// Dissect one half-connection of AMQP traffic.
pub(crate) async fn dissect(
    stream: &mut HalfStream,
    ctx: &ReaderContext,
    options: &DissectOptions,
) -> Result<(), DissectError> {
    let codec = TimedCodec::new(AmqpCodec::with_max_frame_size(options.amqp_max_frame_size), stream.clock());
    let mut frames = FramedRead::new(stream, codec);
    let mut assembler = ContentAssembler::new();

    while let Some(raw) = frames.next().await {
        let (raw, captured_at) = raw?;
        let wire_len = raw.wire_len();
        let frame = match Frame::parse(raw) {
            Ok(frame) => frame,
            Err(e) if e.kind() == ErrorKind::UnknownMessage => {
                debug!(tcp = %ctx.tcp_id(), error = %e, "skipping frame");
                ctx.record_error(ErrorKind::UnknownMessage);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let done = assembler.push(frame, captured_at, wire_len);
        for _ in 0..assembler.take_discarded() {
            ctx.record_error(ErrorKind::ProtocolFormat);
        }
        if let Some(done) = done {
            dispatch(ctx, done).await;
        }
    }

    if assembler.pending() > 0 {
        debug!(tcp = %ctx.tcp_id(), pending = assembler.pending(), "stream ended with incomplete content");
    }
    Ok(())
}

async fn dispatch(ctx: &ReaderContext, done: Assembled) {
    let Assembled {
        message,
        captured_at,
        size,
    } = done;
    let role = Role::of(&message.method);
    let channel = message.channel;
    let class_id = message.method.class_id();
    let method_id = message.method.method_id();
    trace!(tcp = %ctx.tcp_id(), channel, method = message.method.name(), ?role, "amqp method");

    match role {
        Role::Request => {
            let key = correlation_key(ctx.connection(), channel, class_id, method_id);
            let msg = GenericMessage::new(Direction::Request, captured_at, size, MessagePayload::Amqp(message));
            ctx.correlate(Direction::Request, key, msg).await;
        }
        Role::Reply(request_id) => {
            let key = correlation_key(ctx.connection(), channel, class_id, request_id);
            let msg = GenericMessage::new(Direction::Response, captured_at, size, MessagePayload::Amqp(message));
            ctx.correlate(Direction::Response, key, msg).await;
        }
        Role::OneWay => {
            let msg = GenericMessage::new(Direction::Request, captured_at, size, MessagePayload::Amqp(message));
            ctx.emit_one_way(msg).await;
        }
    }
}
