//! AMQP field tables and the string encodings they rely on.
//!
//! A field table is a `u32` byte length followed by `(shortstr key, tag,
//! value)` entries. Entry order is preserved so that a decoded table
//! encodes back to the same bytes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::{AmqpError, AmqpResult};
use crate::wire::WireReader;

/// Fixed-point decimal: `value / 10^scale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Decimal {
    pub scale: u8,
    pub value: i32,
}

/// Deepest array or table nesting accepted inside one field table.
pub const MAX_NESTING_DEPTH: usize = 64;

fn nested(depth: usize) -> AmqpResult<usize> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(AmqpError::Syntax(format!(
            "field nesting deeper than {MAX_NESTING_DEPTH}"
        )));
    }
    Ok(depth + 1)
}

/// A tagged value inside a field table or field array.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// `t`
    Bool(bool),
    /// `b`
    Byte(u8),
    /// `s`
    Short(i16),
    /// `I`
    Int(i32),
    /// `l`
    Long(i64),
    /// `f`
    Float(f32),
    /// `d`
    Double(f64),
    /// `D`
    Decimal(Decimal),
    /// `S`
    LongString(String),
    /// `A`
    Array(Vec<FieldValue>),
    /// `T`, seconds since the epoch
    Timestamp(i64),
    /// `F`
    Table(FieldTable),
    /// `x`
    ByteArray(Bytes),
    /// `V`
    Void,
}

impl FieldValue {
    /// Type tag octet.
    #[must_use]
    pub fn tag(&self) -> u8 {
        match self {
            Self::Bool(_) => b't',
            Self::Byte(_) => b'b',
            Self::Short(_) => b's',
            Self::Int(_) => b'I',
            Self::Long(_) => b'l',
            Self::Float(_) => b'f',
            Self::Double(_) => b'd',
            Self::Decimal(_) => b'D',
            Self::LongString(_) => b'S',
            Self::Array(_) => b'A',
            Self::Timestamp(_) => b'T',
            Self::Table(_) => b'F',
            Self::ByteArray(_) => b'x',
            Self::Void => b'V',
        }
    }

    fn decode<B: Buf>(reader: &mut WireReader<B>, depth: usize) -> AmqpResult<Self> {
        let tag = reader.read_u8()?;
        Ok(match tag {
            b't' => Self::Bool(reader.read_u8()? != 0),
            b'b' => Self::Byte(reader.read_u8()?),
            b's' => Self::Short(reader.read_i16()?),
            b'I' => Self::Int(reader.read_i32()?),
            b'l' => Self::Long(reader.read_i64()?),
            b'f' => Self::Float(reader.read_f32()?),
            b'd' => Self::Double(reader.read_f64()?),
            b'D' => Self::Decimal(Decimal {
                scale: reader.read_u8()?,
                value: reader.read_i32()?,
            }),
            b'S' => Self::LongString(read_longstr(reader)?),
            b'A' => {
                let depth = nested(depth)?;
                let len = reader.read_u32()? as usize;
                let mut inner = WireReader::new(reader.read_bytes(len)?);
                let mut values = Vec::new();
                while !inner.is_empty() {
                    values.push(Self::decode(&mut inner, depth)?);
                }
                Self::Array(values)
            }
            b'T' => Self::Timestamp(reader.read_i64()?),
            b'F' => Self::Table(FieldTable::decode_nested(reader, nested(depth)?)?),
            b'x' => {
                let len = reader.read_i32()?;
                let len = usize::try_from(len)
                    .map_err(|_| AmqpError::Syntax(format!("negative byte array length {len}")))?;
                Self::ByteArray(reader.read_bytes(len)?)
            }
            b'V' => Self::Void,
            other => {
                return Err(AmqpError::Syntax(format!(
                    "unsupported table field type {:?}",
                    char::from(other)
                )))
            }
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.tag());
        match self {
            Self::Bool(v) => buf.put_u8(u8::from(*v)),
            Self::Byte(v) => buf.put_u8(*v),
            Self::Short(v) => buf.put_i16(*v),
            Self::Int(v) => buf.put_i32(*v),
            Self::Long(v) => buf.put_i64(*v),
            Self::Float(v) => buf.put_f32(*v),
            Self::Double(v) => buf.put_f64(*v),
            Self::Decimal(d) => {
                buf.put_u8(d.scale);
                buf.put_i32(d.value);
            }
            Self::LongString(s) => put_longstr(buf, s),
            Self::Array(values) => {
                let mut inner = BytesMut::new();
                for value in values {
                    value.encode(&mut inner);
                }
                buf.put_u32(inner.len() as u32);
                buf.extend_from_slice(&inner);
            }
            Self::Timestamp(v) => buf.put_i64(*v),
            Self::Table(table) => table.encode(buf),
            Self::ByteArray(bytes) => {
                buf.put_i32(bytes.len() as i32);
                buf.extend_from_slice(bytes);
            }
            Self::Void => {}
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Bool(v) => serializer.serialize_bool(*v),
            Self::Byte(v) => serializer.serialize_u8(*v),
            Self::Short(v) => serializer.serialize_i16(*v),
            Self::Int(v) => serializer.serialize_i32(*v),
            Self::Long(v) | Self::Timestamp(v) => serializer.serialize_i64(*v),
            Self::Float(v) => serializer.serialize_f32(*v),
            Self::Double(v) => serializer.serialize_f64(*v),
            Self::Decimal(d) => d.serialize(serializer),
            Self::LongString(s) => serializer.serialize_str(s),
            Self::Array(values) => {
                let mut seq = serializer.serialize_seq(Some(values.len()))?;
                for value in values {
                    seq.serialize_element(value)?;
                }
                seq.end()
            }
            Self::Table(table) => table.serialize(serializer),
            Self::ByteArray(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            Self::Void => serializer.serialize_none(),
        }
    }
}

/// Ordered string-keyed table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldTable(Vec<(String, FieldValue)>);

impl FieldTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, replacing an existing one with the same key in place.
    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Decode a length-prefixed table.
    ///
    /// # Errors
    ///
    /// Returns [`AmqpError::Syntax`] on truncation, an unknown type tag or
    /// arrays and tables nested deeper than [`MAX_NESTING_DEPTH`].
    pub fn decode<B: Buf>(reader: &mut WireReader<B>) -> AmqpResult<Self> {
        Self::decode_nested(reader, 0)
    }

    fn decode_nested<B: Buf>(reader: &mut WireReader<B>, depth: usize) -> AmqpResult<Self> {
        let len = reader.read_u32()? as usize;
        let mut inner = WireReader::new(reader.read_bytes(len)?);
        let mut table = Self::new();
        while !inner.is_empty() {
            let key = read_shortstr(&mut inner)?;
            let value = FieldValue::decode(&mut inner, depth)?;
            table.0.push((key, value));
        }
        Ok(table)
    }

    /// Encode with its `u32` length prefix.
    pub fn encode(&self, buf: &mut BytesMut) {
        let mut inner = BytesMut::new();
        for (key, value) in &self.0 {
            put_shortstr(&mut inner, key);
            value.encode(&mut inner);
        }
        buf.put_u32(inner.len() as u32);
        buf.extend_from_slice(&inner);
    }
}

impl Serialize for FieldTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<K: Into<String>> FromIterator<(K, FieldValue)> for FieldTable {
    fn from_iter<I: IntoIterator<Item = (K, FieldValue)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (key, value) in iter {
            table.insert(key, value);
        }
        table
    }
}

/// Read a `u8`-length string. Invalid UTF-8 is replaced.
///
/// # Errors
///
/// Returns an error on truncation.
pub fn read_shortstr<B: Buf>(reader: &mut WireReader<B>) -> AmqpResult<String> {
    let len = reader.read_u8()? as usize;
    let raw = reader.read_bytes(len)?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

/// Read a `u32`-length string. Invalid UTF-8 is replaced.
///
/// # Errors
///
/// Returns an error on truncation.
pub fn read_longstr<B: Buf>(reader: &mut WireReader<B>) -> AmqpResult<String> {
    let len = reader.read_u32()? as usize;
    let raw = reader.read_bytes(len)?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

/// Write a short string, truncated to 255 bytes.
pub fn put_shortstr(buf: &mut BytesMut, s: &str) {
    let bytes = &s.as_bytes()[..s.len().min(u8::MAX as usize)];
    buf.put_u8(bytes.len() as u8);
    buf.extend_from_slice(bytes);
}

pub fn put_longstr(buf: &mut BytesMut, s: &str) {
    buf.put_u32(s.len() as u32);
    buf.extend_from_slice(s.as_bytes());
}
