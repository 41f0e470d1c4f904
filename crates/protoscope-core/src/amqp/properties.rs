//! Content header frames and basic-class message properties.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use super::table::{put_shortstr, read_shortstr, FieldTable};
use crate::error::AmqpResult;
use crate::wire::WireReader;

const FLAG_CONTENT_TYPE: u16 = 0x8000;
const FLAG_CONTENT_ENCODING: u16 = 0x4000;
const FLAG_HEADERS: u16 = 0x2000;
const FLAG_DELIVERY_MODE: u16 = 0x1000;
const FLAG_PRIORITY: u16 = 0x0800;
const FLAG_CORRELATION_ID: u16 = 0x0400;
const FLAG_REPLY_TO: u16 = 0x0200;
const FLAG_EXPIRATION: u16 = 0x0100;
const FLAG_MESSAGE_ID: u16 = 0x0080;
const FLAG_TIMESTAMP: u16 = 0x0040;
const FLAG_TYPE: u16 = 0x0020;
const FLAG_USER_ID: u16 = 0x0010;
const FLAG_APP_ID: u16 = 0x0008;
const FLAG_RESERVED: u16 = 0x0004;

/// Message properties. A property is on the wire iff it is `Some`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Properties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<FieldTable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_mode: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Seconds since the epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserved: Option<String>,
}

impl Properties {
    /// Property flags word for the present properties.
    #[must_use]
    pub fn flags(&self) -> u16 {
        let mut flags = 0;
        let mut set = |present: bool, flag: u16| {
            if present {
                flags |= flag;
            }
        };
        set(self.content_type.is_some(), FLAG_CONTENT_TYPE);
        set(self.content_encoding.is_some(), FLAG_CONTENT_ENCODING);
        set(self.headers.is_some(), FLAG_HEADERS);
        set(self.delivery_mode.is_some(), FLAG_DELIVERY_MODE);
        set(self.priority.is_some(), FLAG_PRIORITY);
        set(self.correlation_id.is_some(), FLAG_CORRELATION_ID);
        set(self.reply_to.is_some(), FLAG_REPLY_TO);
        set(self.expiration.is_some(), FLAG_EXPIRATION);
        set(self.message_id.is_some(), FLAG_MESSAGE_ID);
        set(self.timestamp.is_some(), FLAG_TIMESTAMP);
        set(self.message_type.is_some(), FLAG_TYPE);
        set(self.user_id.is_some(), FLAG_USER_ID);
        set(self.app_id.is_some(), FLAG_APP_ID);
        set(self.reserved.is_some(), FLAG_RESERVED);
        flags
    }

    fn decode(flags: u16, reader: &mut WireReader<Bytes>) -> AmqpResult<Self> {
        let has = |flag: u16| flags & flag != 0;
        let mut props = Self::default();
        if has(FLAG_CONTENT_TYPE) {
            props.content_type = Some(read_shortstr(reader)?);
        }
        if has(FLAG_CONTENT_ENCODING) {
            props.content_encoding = Some(read_shortstr(reader)?);
        }
        if has(FLAG_HEADERS) {
            props.headers = Some(FieldTable::decode(reader)?);
        }
        if has(FLAG_DELIVERY_MODE) {
            props.delivery_mode = Some(reader.read_u8()?);
        }
        if has(FLAG_PRIORITY) {
            props.priority = Some(reader.read_u8()?);
        }
        if has(FLAG_CORRELATION_ID) {
            props.correlation_id = Some(read_shortstr(reader)?);
        }
        if has(FLAG_REPLY_TO) {
            props.reply_to = Some(read_shortstr(reader)?);
        }
        if has(FLAG_EXPIRATION) {
            props.expiration = Some(read_shortstr(reader)?);
        }
        if has(FLAG_MESSAGE_ID) {
            props.message_id = Some(read_shortstr(reader)?);
        }
        if has(FLAG_TIMESTAMP) {
            props.timestamp = Some(reader.read_i64()?);
        }
        if has(FLAG_TYPE) {
            props.message_type = Some(read_shortstr(reader)?);
        }
        if has(FLAG_USER_ID) {
            props.user_id = Some(read_shortstr(reader)?);
        }
        if has(FLAG_APP_ID) {
            props.app_id = Some(read_shortstr(reader)?);
        }
        if has(FLAG_RESERVED) {
            props.reserved = Some(read_shortstr(reader)?);
        }
        Ok(props)
    }

    fn encode(&self, buf: &mut BytesMut) {
        let short = |buf: &mut BytesMut, value: &Option<String>| {
            if let Some(s) = value {
                put_shortstr(buf, s);
            }
        };
        short(buf, &self.content_type);
        short(buf, &self.content_encoding);
        if let Some(headers) = &self.headers {
            headers.encode(buf);
        }
        if let Some(mode) = self.delivery_mode {
            buf.put_u8(mode);
        }
        if let Some(priority) = self.priority {
            buf.put_u8(priority);
        }
        short(buf, &self.correlation_id);
        short(buf, &self.reply_to);
        short(buf, &self.expiration);
        short(buf, &self.message_id);
        if let Some(ts) = self.timestamp {
            buf.put_i64(ts);
        }
        short(buf, &self.message_type);
        short(buf, &self.user_id);
        short(buf, &self.app_id);
        short(buf, &self.reserved);
    }
}

/// Payload of a content header frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContentHeader {
    pub class_id: u16,
    pub weight: u16,
    pub body_size: u64,
    pub properties: Properties,
}

impl ContentHeader {
    /// Decode a header frame payload.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::AmqpError::Syntax`] if the payload is
    /// shorter than its flags announce.
    pub fn decode(payload: Bytes) -> AmqpResult<Self> {
        let mut reader = WireReader::new(payload);
        let class_id = reader.read_u16()?;
        let weight = reader.read_u16()?;
        let body_size = reader.read_u64()?;
        let flags = reader.read_u16()?;
        let properties = Properties::decode(flags, &mut reader)?;
        Ok(Self {
            class_id,
            weight,
            body_size,
            properties,
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.class_id);
        buf.put_u16(self.weight);
        buf.put_u64(self.body_size);
        buf.put_u16(self.properties.flags());
        self.properties.encode(buf);
    }
}
