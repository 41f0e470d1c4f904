//! Wire-format builders for feeding dissectors in tests.

/// AMQP 0-9-1 frames.
pub mod amqp {
    use bytes::{BufMut, Bytes, BytesMut};

    use crate::amqp::frame::{FrameType, FRAME_END, PROTOCOL_HEADER};
    use crate::amqp::{ContentHeader, Frame, Method, Properties};

    /// The `AMQP 0 0 9 1` preamble a client sends first.
    #[must_use]
    pub fn protocol_header() -> Bytes {
        Bytes::from_static(PROTOCOL_HEADER)
    }

    /// A frame with an arbitrary type, channel and payload.
    #[must_use]
    pub fn raw(frame_type: FrameType, channel: u16, payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::with_capacity(8 + payload.len());
        buf.put_u8(frame_type.code());
        buf.put_u16(channel);
        buf.put_u32(payload.len() as u32);
        buf.put_slice(payload);
        buf.put_u8(FRAME_END);
        buf
    }

    /// Serialize a parsed frame.
    #[must_use]
    pub fn frame(frame: &Frame) -> Bytes {
        let raw = frame.to_raw();
        raw_frame(raw.frame_type, raw.channel, &raw.payload)
    }

    fn raw_frame(frame_type: FrameType, channel: u16, payload: &[u8]) -> Bytes {
        raw(frame_type, channel, payload).freeze()
    }

    #[must_use]
    pub fn method(channel: u16, method: Method) -> Bytes {
        frame(&Frame::Method { channel, method })
    }

    /// A content-bearing method: method, header and one body frame per
    /// `chunk` bytes of `body`.
    #[must_use]
    pub fn content(channel: u16, method: Method, properties: Properties, body: &[u8], chunk: usize) -> Bytes {
        let class_id = method.class_id();
        let mut buf = BytesMut::new();
        buf.put_slice(&self::method(channel, method));
        buf.put_slice(&frame(&Frame::Header {
            channel,
            header: ContentHeader {
                class_id,
                weight: 0,
                body_size: body.len() as u64,
                properties,
            },
        }));
        for part in body.chunks(chunk.max(1)) {
            buf.put_slice(&raw_frame(FrameType::Body, channel, part));
        }
        buf.freeze()
    }
}

/// Kafka frames, length prefix included.
pub mod kafka {
    use bytes::{BufMut, Bytes, BytesMut};

    use crate::kafka::KafkaMessage;

    /// Prefix `body` with its length.
    #[must_use]
    pub fn frame(body: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(4 + body.len());
        buf.put_u32(body.len() as u32);
        buf.put_slice(body);
        buf.freeze()
    }

    #[must_use]
    pub fn request(message: &KafkaMessage) -> Bytes {
        frame(&message.encode_request())
    }

    #[must_use]
    pub fn response(message: &KafkaMessage) -> Bytes {
        frame(&message.encode_response())
    }
}
