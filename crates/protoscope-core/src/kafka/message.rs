//! Kafka request and response messages: header plus schema-decoded body.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{BufMut, Bytes};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use super::api_key::ApiKey;
use super::codec::{ValueReader, ValueWriter};
use super::frame::{MIN_REQUEST_SIZE, MIN_RESPONSE_SIZE};
use super::schema::{request_schema, response_schema, MessageSchema};
use super::value::{Struct, TaggedFields};
use crate::error::{KafkaError, KafkaResult};

/// Message body: decoded against a schema, or carried as raw bytes when
/// the api key and version have none.
#[derive(Debug, Clone, PartialEq)]
pub enum KafkaBody {
    Decoded(Struct),
    Opaque(Bytes),
}

impl Serialize for KafkaBody {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Decoded(s) => s.serialize(serializer),
            Self::Opaque(raw) => serializer.serialize_str(&STANDARD.encode(raw)),
        }
    }
}

/// A decoded Kafka request or response.
#[derive(Debug, Clone, PartialEq)]
pub struct KafkaMessage {
    pub api_key: ApiKey,
    pub api_version: i16,
    pub correlation_id: i32,
    /// Request header client id; always `None` on responses.
    pub client_id: Option<String>,
    /// Header tag buffer of flexible versions.
    pub header_tags: TaggedFields,
    pub body: KafkaBody,
    /// The frame ended before the schema did.
    pub truncated: bool,
}

impl KafkaMessage {
    #[must_use]
    pub fn request(
        api_key: ApiKey,
        api_version: i16,
        correlation_id: i32,
        client_id: Option<&str>,
        body: Struct,
    ) -> Self {
        Self {
            api_key,
            api_version,
            correlation_id,
            client_id: client_id.map(str::to_string),
            header_tags: TaggedFields::new(),
            body: KafkaBody::Decoded(body),
            truncated: false,
        }
    }

    #[must_use]
    pub fn response(api_key: ApiKey, api_version: i16, correlation_id: i32, body: Struct) -> Self {
        Self {
            client_id: None,
            ..Self::request(api_key, api_version, correlation_id, None, body)
        }
    }

    /// Whether the body was not decoded.
    #[must_use]
    pub fn is_opaque(&self) -> bool {
        matches!(self.body, KafkaBody::Opaque(_))
    }

    /// Decoded body, if any.
    #[must_use]
    pub fn payload(&self) -> Option<&Struct> {
        match &self.body {
            KafkaBody::Decoded(s) => Some(s),
            KafkaBody::Opaque(_) => None,
        }
    }

    fn write_body(&self, writer: &mut ValueWriter, schema: Option<&'static MessageSchema>) {
        match (&self.body, schema) {
            (KafkaBody::Decoded(s), Some(schema)) => writer.write_struct(s, schema.fields, self.api_version),
            (KafkaBody::Decoded(_), None) => {}
            (KafkaBody::Opaque(raw), _) => writer.buf_mut().put_slice(raw),
        }
    }

    /// Encode as a request, without the length prefix.
    #[must_use]
    pub fn encode_request(&self) -> Bytes {
        let version = self.api_version;
        let mut writer = ValueWriter::new(self.api_key.is_flexible(version));
        let buf = writer.buf_mut();
        buf.put_i16(self.api_key.code());
        buf.put_i16(version);
        buf.put_i32(self.correlation_id);

        let header_version = self.api_key.request_header_version(version);
        if header_version >= 1 {
            writer.write_legacy_string(self.client_id.as_deref());
        }
        if header_version >= 2 {
            writer.write_tag_buffer(self.header_tags.iter());
        }
        self.write_body(&mut writer, request_schema(self.api_key, version));
        writer.finish()
    }

    /// Encode as a response, without the length prefix.
    #[must_use]
    pub fn encode_response(&self) -> Bytes {
        let version = self.api_version;
        let mut writer = ValueWriter::new(self.api_key.is_flexible(version));
        writer.buf_mut().put_i32(self.correlation_id);
        if self.api_key.response_header_version(version) >= 1 {
            writer.write_tag_buffer(self.header_tags.iter());
        }
        self.write_body(&mut writer, response_schema(self.api_key, version));
        writer.finish()
    }
}

impl Serialize for KafkaMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("apiKey", self.api_key.name())?;
        map.serialize_entry("apiVersion", &self.api_version)?;
        map.serialize_entry("correlationId", &self.correlation_id)?;
        if let Some(client_id) = &self.client_id {
            map.serialize_entry("clientId", client_id)?;
        }
        if !self.header_tags.is_empty() {
            map.serialize_entry("headerTaggedFields", &self.header_tags)?;
        }
        map.serialize_entry("payload", &self.body)?;
        if self.truncated {
            map.serialize_entry("truncated", &true)?;
        }
        map.end()
    }
}

/// Decode a request frame (without its length prefix).
///
/// # Errors
///
/// Returns [`KafkaError::FrameTooSmall`] when the fixed header is missing
/// and [`KafkaError::UnknownApiKey`] for keys outside the protocol. An
/// uncataloged version is not an error: the body is kept opaque.
pub fn decode_request(frame: Bytes) -> KafkaResult<KafkaMessage> {
    if frame.len() < MIN_REQUEST_SIZE {
        return Err(KafkaError::FrameTooSmall {
            size: frame.len(),
            min: MIN_REQUEST_SIZE,
        });
    }
    let code = i16::from_be_bytes([frame[0], frame[1]]);
    let api_version = i16::from_be_bytes([frame[2], frame[3]]);
    let correlation_id = i32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]);
    let api_key = ApiKey::try_from(code)?;

    let mut reader = ValueReader::new(frame.slice(MIN_REQUEST_SIZE..), api_key.is_flexible(api_version));
    let header_version = api_key.request_header_version(api_version);
    let client_id = if header_version >= 1 {
        reader.read_legacy_string()
    } else {
        None
    };
    let header_tags = if header_version >= 2 {
        reader.read_tag_buffer()
    } else {
        TaggedFields::new()
    };
    let body = match request_schema(api_key, api_version) {
        Some(schema) => KafkaBody::Decoded(reader.read_struct(schema.fields, api_version)),
        None => KafkaBody::Opaque(reader.rest()),
    };

    Ok(KafkaMessage {
        api_key,
        api_version,
        correlation_id,
        client_id,
        header_tags,
        body,
        truncated: reader.is_truncated(),
    })
}

/// Decode a response frame for a request of `api_key` at `api_version`.
///
/// # Errors
///
/// Returns [`KafkaError::FrameTooSmall`] when the correlation id is missing.
pub fn decode_response(frame: Bytes, api_key: ApiKey, api_version: i16) -> KafkaResult<KafkaMessage> {
    if frame.len() < MIN_RESPONSE_SIZE {
        return Err(KafkaError::FrameTooSmall {
            size: frame.len(),
            min: MIN_RESPONSE_SIZE,
        });
    }
    let correlation_id = i32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]);

    let mut reader = ValueReader::new(frame.slice(MIN_RESPONSE_SIZE..), api_key.is_flexible(api_version));
    let header_tags = if api_key.response_header_version(api_version) >= 1 {
        reader.read_tag_buffer()
    } else {
        TaggedFields::new()
    };
    let body = match response_schema(api_key, api_version) {
        Some(schema) => KafkaBody::Decoded(reader.read_struct(schema.fields, api_version)),
        None => KafkaBody::Opaque(reader.rest()),
    };

    Ok(KafkaMessage {
        api_key,
        api_version,
        correlation_id,
        client_id: None,
        header_tags,
        body,
        truncated: reader.is_truncated(),
    })
}

/// Correlation id of a response frame.
#[must_use]
pub fn response_correlation_id(frame: &[u8]) -> Option<i32> {
    let head: [u8; 4] = frame.get(..4)?.try_into().ok()?;
    Some(i32::from_be_bytes(head))
}
