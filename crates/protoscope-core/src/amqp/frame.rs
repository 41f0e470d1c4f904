//! AMQP 0-9-1 frame codec.
//!
//! Implements tokio's `Decoder` and `Encoder` traits for AMQP frames:
//!
//! ```text
//! type: u8 | channel: u16 | size: u32 | payload: [u8; size] | 0xCE
//! ```
//!
//! The codec only frames. Method, header and body payloads are parsed by
//! [`Frame::parse`] so that an unknown class or method can be skipped
//! without losing frame synchronization.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use super::methods::Method;
use super::properties::ContentHeader;
use crate::error::{AmqpError, AmqpResult};
use crate::wire::WireReader;

/// Octet closing every frame.
pub const FRAME_END: u8 = 0xCE;

/// Largest accepted frame payload (16 MiB).
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Largest accepted content header payload.
pub const MAX_HEADER_FRAME_SIZE: u32 = 512;

/// Protocol header sent by clients before the first frame.
pub const PROTOCOL_HEADER: &[u8; 8] = b"AMQP\x00\x00\x09\x01";

/// type + channel + size
const FRAME_HEADER_LEN: usize = 7;

/// Frame type octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Method,
    Header,
    Body,
    Heartbeat,
}

impl FrameType {
    /// Wire value.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Method => 1,
            Self::Header => 2,
            Self::Body => 3,
            Self::Heartbeat => 8,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Method),
            2 => Some(Self::Header),
            3 => Some(Self::Body),
            8 => Some(Self::Heartbeat),
            _ => None,
        }
    }
}

/// A frame as it appeared on the wire, payload not yet interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub frame_type: FrameType,
    pub channel: u16,
    pub payload: Bytes,
}

impl RawFrame {
    #[must_use]
    pub fn new(frame_type: FrameType, channel: u16, payload: Bytes) -> Self {
        Self {
            frame_type,
            channel,
            payload,
        }
    }

    /// Bytes this frame occupied on the wire.
    #[must_use]
    pub fn wire_len(&self) -> usize {
        FRAME_HEADER_LEN + self.payload.len() + 1
    }
}

/// A frame with its payload parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Method { channel: u16, method: Method },
    Header { channel: u16, header: ContentHeader },
    Body { channel: u16, body: Bytes },
    Heartbeat,
}

impl Frame {
    /// Interpret the payload of a raw frame.
    ///
    /// # Errors
    ///
    /// Returns [`AmqpError::UnknownClass`] or [`AmqpError::UnknownMethod`]
    /// for ids outside the 0-9-1 catalog, and [`AmqpError::Syntax`] when
    /// the arguments do not match the method's layout.
    pub fn parse(raw: RawFrame) -> AmqpResult<Self> {
        let channel = raw.channel;
        match raw.frame_type {
            FrameType::Method => {
                let mut reader = WireReader::new(raw.payload);
                let class_id = reader.read_u16()?;
                let method_id = reader.read_u16()?;
                let method = Method::decode(class_id, method_id, reader.into_inner())?;
                Ok(Self::Method { channel, method })
            }
            FrameType::Header => Ok(Self::Header {
                channel,
                header: ContentHeader::decode(raw.payload)?,
            }),
            FrameType::Body => Ok(Self::Body {
                channel,
                body: raw.payload,
            }),
            FrameType::Heartbeat => Ok(Self::Heartbeat),
        }
    }

    /// Serialize back into a raw frame.
    #[must_use]
    pub fn to_raw(&self) -> RawFrame {
        match self {
            Self::Method { channel, method } => {
                let mut buf = BytesMut::new();
                method.encode(&mut buf);
                RawFrame::new(FrameType::Method, *channel, buf.freeze())
            }
            Self::Header { channel, header } => {
                let mut buf = BytesMut::new();
                header.encode(&mut buf);
                RawFrame::new(FrameType::Header, *channel, buf.freeze())
            }
            Self::Body { channel, body } => RawFrame::new(FrameType::Body, *channel, body.clone()),
            Self::Heartbeat => RawFrame::new(FrameType::Heartbeat, 0, Bytes::new()),
        }
    }
}

/// Codec for AMQP frames.
///
/// A stream may open with the 8-byte protocol header; it is consumed
/// without producing a frame.
#[derive(Debug, Clone)]
pub struct AmqpCodec {
    max_frame_size: u32,
    at_start: bool,
}

impl AmqpCodec {
    /// Create a codec with the default 16 MiB frame limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    /// Create a codec with a custom frame limit.
    #[must_use]
    pub fn with_max_frame_size(max_frame_size: u32) -> Self {
        Self {
            max_frame_size,
            at_start: true,
        }
    }

    /// Returns `Ok(false)` while more bytes are needed to decide.
    fn skip_protocol_header(&mut self, src: &mut BytesMut) -> AmqpResult<bool> {
        if src.is_empty() {
            return Ok(false);
        }
        if src[0] != b'A' {
            self.at_start = false;
            return Ok(true);
        }
        if src.len() < PROTOCOL_HEADER.len() {
            return Ok(false);
        }
        if &src[..4] != b"AMQP" {
            return Err(AmqpError::Frame);
        }
        debug!(
            major = src[6],
            minor = src[7],
            "amqp protocol header"
        );
        src.advance(PROTOCOL_HEADER.len());
        self.at_start = false;
        Ok(true)
    }
}

impl Default for AmqpCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for AmqpCodec {
    type Item = RawFrame;
    type Error = AmqpError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.at_start && !self.skip_protocol_header(src)? {
            return Ok(None);
        }

        if src.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let frame_type = FrameType::from_code(src[0]).ok_or(AmqpError::Frame)?;
        let channel = u16::from_be_bytes([src[1], src[2]]);
        let size = u32::from_be_bytes([src[3], src[4], src[5], src[6]]);

        if size > self.max_frame_size {
            return Err(AmqpError::MaxSize {
                size,
                max: self.max_frame_size,
            });
        }
        if frame_type == FrameType::Header && size > MAX_HEADER_FRAME_SIZE {
            return Err(AmqpError::MaxHeaderFrameSize {
                size,
                max: MAX_HEADER_FRAME_SIZE,
            });
        }

        let total = FRAME_HEADER_LEN + size as usize + 1;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        if src[total - 1] != FRAME_END {
            return Err(AmqpError::Frame);
        }

        src.advance(FRAME_HEADER_LEN);
        let payload = src.split_to(size as usize).freeze();
        src.advance(1);

        Ok(Some(RawFrame {
            frame_type,
            channel,
            payload,
        }))
    }
}

impl Encoder<RawFrame> for AmqpCodec {
    type Error = AmqpError;

    fn encode(&mut self, item: RawFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let size = u32::try_from(item.payload.len()).map_err(|_| AmqpError::MaxSize {
            size: u32::MAX,
            max: self.max_frame_size,
        })?;
        if size > self.max_frame_size {
            return Err(AmqpError::MaxSize {
                size,
                max: self.max_frame_size,
            });
        }

        dst.reserve(item.wire_len());
        dst.put_u8(item.frame_type.code());
        dst.put_u16(item.channel);
        dst.put_u32(size);
        dst.extend_from_slice(&item.payload);
        dst.put_u8(FRAME_END);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_bytes(frame_type: u8, channel: u16, payload: &[u8], end: u8) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u8(frame_type);
        buf.put_u16(channel);
        buf.put_u32(payload.len() as u32);
        buf.extend_from_slice(payload);
        buf.put_u8(end);
        buf
    }

    #[test]
    fn test_decode_body_frame() {
        let mut codec = AmqpCodec::new();
        let mut buf = frame_bytes(3, 7, b"hello", FRAME_END);

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.frame_type, FrameType::Body);
        assert_eq!(frame.channel, 7);
        assert_eq!(&frame.payload[..], b"hello");
        assert_eq!(frame.wire_len(), 13);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_incomplete_frame() {
        let mut codec = AmqpCodec::new();
        let full = frame_bytes(3, 1, b"partial body", FRAME_END);
        let mut buf = BytesMut::from(&full[..10]);

        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&full[10..]);
        assert!(codec.decode(&mut buf).unwrap().is_some());
    }

    #[test]
    fn test_protocol_header_is_consumed() {
        let mut codec = AmqpCodec::new();
        let mut buf = BytesMut::from(&PROTOCOL_HEADER[..]);
        buf.extend_from_slice(&frame_bytes(8, 0, b"", FRAME_END));

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.frame_type, FrameType::Heartbeat);
    }

    #[test]
    fn test_protocol_header_split_across_reads() {
        let mut codec = AmqpCodec::new();
        let mut buf = BytesMut::from(&PROTOCOL_HEADER[..3]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&PROTOCOL_HEADER[3..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_bad_frame_end_rejected() {
        let mut codec = AmqpCodec::new();
        let mut buf = frame_bytes(1, 0, &[0, 10, 0, 11], 0x00);

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, AmqpError::Frame));
        assert_eq!(err.code(), 501);
    }

    #[test]
    fn test_bad_frame_type_rejected() {
        let mut codec = AmqpCodec::new();
        let mut buf = frame_bytes(4, 0, b"", FRAME_END);
        assert!(matches!(codec.decode(&mut buf), Err(AmqpError::Frame)));
    }

    #[test]
    fn test_oversized_frame_rejected_before_payload_arrives() {
        let mut codec = AmqpCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u8(3);
        buf.put_u16(1);
        buf.put_u32(MAX_FRAME_SIZE + 1);

        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(err.code(), 551);
    }

    #[test]
    fn test_frame_at_max_size_accepted() {
        let mut codec = AmqpCodec::new();
        let payload = vec![0xAB; MAX_FRAME_SIZE as usize];
        let mut buf = frame_bytes(3, 1, &payload, FRAME_END);

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.payload.len(), MAX_FRAME_SIZE as usize);
    }

    #[test]
    fn test_oversized_header_frame_rejected() {
        let mut codec = AmqpCodec::new();
        let mut buf = frame_bytes(2, 1, &[0u8; 513], FRAME_END);

        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(err.code(), 552);
    }

    #[test]
    fn test_header_frame_at_limit_accepted() {
        use crate::amqp::properties::Properties;
        use crate::amqp::table::{FieldTable, FieldValue};

        // 14 fixed bytes, then a table of 4 + (1 + 3) + 1 + 4 + 485 bytes
        let mut headers = FieldTable::new();
        headers.insert("pad", FieldValue::LongString("x".repeat(485)));
        let header = ContentHeader {
            class_id: 60,
            body_size: 3,
            properties: Properties {
                headers: Some(headers),
                ..Properties::default()
            },
            ..ContentHeader::default()
        };
        let mut payload = BytesMut::new();
        header.encode(&mut payload);
        assert_eq!(payload.len(), MAX_HEADER_FRAME_SIZE as usize);

        let mut codec = AmqpCodec::new();
        let mut buf = frame_bytes(2, 1, &payload, FRAME_END);
        let raw = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(raw.frame_type, FrameType::Header);
        assert_eq!(raw.payload.len(), 512);
        assert!(buf.is_empty());

        match Frame::parse(raw).unwrap() {
            Frame::Header { channel, header: parsed } => {
                assert_eq!(channel, 1);
                assert_eq!(parsed, header);
            }
            other => panic!("expected header frame, got {other:?}"),
        }
    }

    #[test]
    fn test_encode_then_decode() {
        let mut codec = AmqpCodec::new();
        let mut buf = BytesMut::new();
        let raw = RawFrame::new(FrameType::Body, 2, Bytes::from_static(b"abc"));
        codec.encode(raw.clone(), &mut buf).unwrap();

        // encoding never writes a protocol header
        assert_eq!(buf[0], 3);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(raw));
    }
}
