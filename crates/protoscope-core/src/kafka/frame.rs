//! Kafka protocol frame codec.
//!
//! Kafka messages are framed as a 4-byte big-endian length followed by the
//! message bytes. The codec yields the message bytes; header and body
//! parsing is left to [`super::message`].

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::KafkaError;

/// Default maximum message size (1 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// `apiKey` + `apiVersion` + `correlationId`.
pub const MIN_REQUEST_SIZE: usize = 8;

/// `correlationId`.
pub const MIN_RESPONSE_SIZE: usize = 4;

/// Codec for length-prefixed Kafka messages.
#[derive(Debug, Clone)]
pub struct KafkaFrameCodec {
    max_message_size: usize,
    min_message_size: usize,
}

impl KafkaFrameCodec {
    /// Codec for the client half.
    #[must_use]
    pub fn requests(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            min_message_size: MIN_REQUEST_SIZE,
        }
    }

    /// Codec for the server half.
    #[must_use]
    pub fn responses(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            min_message_size: MIN_RESPONSE_SIZE,
        }
    }

    #[must_use]
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }
}

impl Default for KafkaFrameCodec {
    fn default() -> Self {
        Self::requests(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

impl Decoder for KafkaFrameCodec {
    type Item = Bytes;
    type Error = KafkaError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 4 {
            return Ok(None);
        }

        let length = i32::from_be_bytes([src[0], src[1], src[2], src[3]]);
        let size = usize::try_from(length).map_err(|_| KafkaError::InvalidLength(length))?;
        if size > self.max_message_size {
            return Err(KafkaError::MessageTooLarge {
                size,
                max: self.max_message_size,
            });
        }
        if size < self.min_message_size {
            return Err(KafkaError::FrameTooSmall {
                size,
                min: self.min_message_size,
            });
        }

        if src.len() < 4 + size {
            src.reserve(4 + size - src.len());
            return Ok(None);
        }

        src.advance(4);
        Ok(Some(src.split_to(size).freeze()))
    }
}

impl Encoder<Bytes> for KafkaFrameCodec {
    type Error = KafkaError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_message_size {
            return Err(KafkaError::MessageTooLarge {
                size: item.len(),
                max: self.max_message_size,
            });
        }
        dst.reserve(4 + item.len());
        dst.put_i32(item.len() as i32);
        dst.put_slice(&item);
        Ok(())
    }
}
