//! Byte stream of one half-connection.
//!
//! Captured segments arrive over a channel; [`HalfStream`] exposes them as
//! an ordered [`AsyncRead`] and remembers when the latest segment was
//! captured. [`TimedCodec`] turns that into the capture time of the
//! segment each decoded frame started in.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::SystemTime;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;
use tokio_util::codec::Decoder;
use tracing::debug;

use crate::error::is_transient;

/// A chunk of captured bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub data: Bytes,
    pub captured_at: SystemTime,
}

impl Segment {
    #[must_use]
    pub fn new(data: impl Into<Bytes>, captured_at: SystemTime) -> Self {
        Self {
            data: data.into(),
            captured_at,
        }
    }

    /// A segment captured now.
    #[must_use]
    pub fn now(data: impl Into<Bytes>) -> Self {
        Self::new(data, SystemTime::now())
    }
}

/// Sending side of a half-connection.
pub type SegmentSender = mpsc::Sender<io::Result<Segment>>;

/// Capture time of the most recently read segment, shared with the
/// reader context.
#[derive(Debug, Clone)]
pub struct CaptureClock(Arc<Mutex<SystemTime>>);

impl CaptureClock {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(SystemTime::now())))
    }

    #[must_use]
    pub fn now(&self) -> SystemTime {
        *self.0.lock()
    }

    pub fn set(&self, at: SystemTime) {
        *self.0.lock() = at;
    }
}

impl Default for CaptureClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Decoder wrapper that pairs each item with the capture time of the
/// segment holding its first byte.
///
/// The time is taken from the clock when the first bytes of a frame are
/// seen in the read buffer, so a frame split across segments keeps the
/// time of its first segment.
#[derive(Debug)]
pub struct TimedCodec<D> {
    inner: D,
    clock: CaptureClock,
    started: Option<SystemTime>,
}

impl<D> TimedCodec<D> {
    #[must_use]
    pub fn new(inner: D, clock: CaptureClock) -> Self {
        Self {
            inner,
            clock,
            started: None,
        }
    }
}

impl<D: Decoder> Decoder for TimedCodec<D> {
    type Item = (D::Item, SystemTime);
    type Error = D::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            self.started = None;
            return Ok(None);
        }
        let started = *self.started.get_or_insert_with(|| self.clock.now());
        match self.inner.decode(src)? {
            Some(item) => {
                self.started = None;
                Ok(Some((item, started)))
            }
            None => {
                if src.is_empty() {
                    self.started = None;
                }
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let started = self.started.take().unwrap_or_else(|| self.clock.now());
        Ok(self.inner.decode_eof(src)?.map(|item| (item, started)))
    }
}

/// Create a half-connection with room for `capacity` queued segments.
#[must_use]
pub fn half_stream(capacity: usize) -> (SegmentSender, HalfStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (tx, HalfStream::new(rx))
}

/// Ordered bytes of one direction of one connection.
///
/// A transient read error is absorbed once; a second one in a row is
/// returned as [`io::ErrorKind::InvalidData`], which dissectors treat as
/// a format error.
#[derive(Debug)]
pub struct HalfStream {
    rx: mpsc::Receiver<io::Result<Segment>>,
    current: Bytes,
    clock: CaptureClock,
    transient_pending: bool,
    consumed: u64,
}

impl HalfStream {
    #[must_use]
    pub fn new(rx: mpsc::Receiver<io::Result<Segment>>) -> Self {
        Self {
            rx,
            current: Bytes::new(),
            clock: CaptureClock::new(),
            transient_pending: false,
            consumed: 0,
        }
    }

    #[must_use]
    pub fn clock(&self) -> CaptureClock {
        self.clock.clone()
    }

    /// Bytes handed to the reader so far.
    #[must_use]
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Discard everything until the sender closes. Returns the number of
    /// bytes dropped.
    pub async fn drain(&mut self) -> u64 {
        let mut dropped = self.current.len() as u64;
        self.current = Bytes::new();
        while let Some(segment) = self.rx.recv().await {
            if let Ok(segment) = segment {
                dropped += segment.data.len() as u64;
            }
        }
        dropped
    }
}

impl AsyncRead for HalfStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if !this.current.is_empty() {
                let n = this.current.len().min(buf.remaining());
                buf.put_slice(&this.current.split_to(n));
                this.consumed += n as u64;
                return Poll::Ready(Ok(()));
            }

            match ready!(this.rx.poll_recv(cx)) {
                None => return Poll::Ready(Ok(())),
                Some(Ok(segment)) => {
                    this.transient_pending = false;
                    this.clock.set(segment.captured_at);
                    this.current = segment.data;
                }
                Some(Err(e)) if is_transient(&e) && !this.transient_pending => {
                    debug!(error = %e, "transient read error, retrying");
                    this.transient_pending = true;
                }
                Some(Err(e)) if is_transient(&e) => {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("repeated transient error: {e}"),
                    )));
                }
                Some(Err(e)) => return Poll::Ready(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_reads_segments_in_order() {
        let (tx, mut stream) = half_stream(4);
        let t1 = UNIX_EPOCH + Duration::from_secs(1);
        let t2 = UNIX_EPOCH + Duration::from_secs(2);
        tx.send(Ok(Segment::new(&b"abc"[..], t1))).await.unwrap();
        tx.send(Ok(Segment::new(&b"de"[..], t2))).await.unwrap();
        drop(tx);

        let clock = stream.clock();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"abcde");
        assert_eq!(stream.consumed(), 5);
        assert_eq!(clock.now(), t2);
    }

    #[tokio::test]
    async fn test_single_transient_error_is_absorbed() {
        let (tx, mut stream) = half_stream(4);
        tx.send(Err(io::ErrorKind::Interrupted.into())).await.unwrap();
        tx.send(Ok(Segment::now(&b"ok"[..]))).await.unwrap();
        drop(tx);

        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"ok");
    }

    #[tokio::test]
    async fn test_repeated_transient_error_escalates() {
        let (tx, mut stream) = half_stream(4);
        tx.send(Err(io::ErrorKind::TimedOut.into())).await.unwrap();
        tx.send(Err(io::ErrorKind::TimedOut.into())).await.unwrap();
        drop(tx);

        let mut out = Vec::new();
        let err = stream.read_to_end(&mut out).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_other_errors_pass_through() {
        let (tx, mut stream) = half_stream(4);
        tx.send(Err(io::ErrorKind::ConnectionReset.into())).await.unwrap();

        let mut out = [0u8; 4];
        let err = stream.read(&mut out).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }

    /// Frames of `u8` length plus payload.
    struct LengthPrefixed;

    impl Decoder for LengthPrefixed {
        type Item = Bytes;
        type Error = io::Error;

        fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<Bytes>> {
            let Some(&len) = src.first() else {
                return Ok(None);
            };
            let total = 1 + usize::from(len);
            if src.len() < total {
                return Ok(None);
            }
            let frame = src.split_to(total);
            Ok(Some(frame.freeze().slice(1..)))
        }
    }

    #[tokio::test]
    async fn test_frame_keeps_time_of_first_segment() {
        use futures::StreamExt;
        use tokio_util::codec::FramedRead;

        let (tx, stream) = half_stream(4);
        let t1 = UNIX_EPOCH + Duration::from_secs(1);
        let t2 = UNIX_EPOCH + Duration::from_secs(2);
        let t3 = UNIX_EPOCH + Duration::from_secs(3);
        // frame "abcd" split over t1 and t2; t2 also starts frame "xy"
        tx.send(Ok(Segment::new(&b"\x04ab"[..], t1))).await.unwrap();
        tx.send(Ok(Segment::new(&b"cd\x02x"[..], t2))).await.unwrap();
        tx.send(Ok(Segment::new(&b"y\x01z"[..], t3))).await.unwrap();
        drop(tx);

        let clock = stream.clock();
        let mut frames = FramedRead::new(stream, TimedCodec::new(LengthPrefixed, clock));
        let mut out = Vec::new();
        while let Some(item) = frames.next().await {
            out.push(item.unwrap());
        }

        assert_eq!(
            out,
            vec![
                (Bytes::from_static(b"abcd"), t1),
                (Bytes::from_static(b"xy"), t2),
                (Bytes::from_static(b"z"), t3),
            ]
        );
    }

    #[tokio::test]
    async fn test_drain_discards_remaining_bytes() {
        let (tx, mut stream) = half_stream(4);
        tx.send(Ok(Segment::now(&b"12345"[..]))).await.unwrap();
        tx.send(Ok(Segment::now(&b"678"[..]))).await.unwrap();
        drop(tx);

        let mut first = [0u8; 2];
        stream.read_exact(&mut first).await.unwrap();
        assert_eq!(stream.drain().await, 6);
    }
}
