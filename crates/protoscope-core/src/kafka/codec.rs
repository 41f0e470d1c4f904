//! Schema-driven encoding and decoding of Kafka message bodies.
//!
//! Decoding is lenient: when the input ends early the remaining fields take
//! their zero values and the reader reports itself truncated. Encoding
//! writes exactly the fields a version carries, in schema order, followed
//! by the tag buffer sorted by tag.

use std::collections::BTreeMap;

use bytes::{BufMut, Bytes, BytesMut};

use super::records::RecordSet;
use super::schema::{Field, FieldType};
use super::value::{Struct, TaggedFields, Value};
use crate::error::{WireError, WireResult};
use crate::wire::varint::put_uvarint;
use crate::wire::WireReader;

/// Lenient reader of schema values.
#[derive(Debug)]
pub struct ValueReader {
    reader: WireReader<Bytes>,
    flexible: bool,
    truncated: bool,
}

impl ValueReader {
    #[must_use]
    pub fn new(buf: Bytes, flexible: bool) -> Self {
        Self {
            reader: WireReader::new(buf),
            flexible,
            truncated: false,
        }
    }

    /// Whether the input ended before every field was read.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    #[must_use]
    pub fn consumed(&self) -> usize {
        self.reader.consumed()
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.reader.remaining()
    }

    /// The unread rest of the input.
    pub fn rest(&mut self) -> Bytes {
        let len = self.reader.remaining();
        self.reader.read_bytes(len).unwrap_or_default()
    }

    /// Run a read unless already truncated; a failure marks the reader truncated.
    fn guard<T>(&mut self, read: impl FnOnce(&mut WireReader<Bytes>) -> WireResult<T>) -> Option<T> {
        if self.truncated {
            return None;
        }
        match read(&mut self.reader) {
            Ok(value) => Some(value),
            Err(_) => {
                self.truncated = true;
                None
            }
        }
    }

    /// Length prefix of a string (`i16` or compact); `None` on null.
    fn string_len(&mut self) -> WireResult<Option<usize>> {
        if self.flexible {
            let n = self.reader.read_uvarint()?;
            Ok(n.checked_sub(1).map(|n| n as usize))
        } else {
            match self.reader.read_i16()? {
                -1 => Ok(None),
                n if n < 0 => Err(WireError::InvalidLength(n.into())),
                n => Ok(Some(n as usize)),
            }
        }
    }

    /// Length prefix of bytes, records and arrays (`i32` or compact).
    fn block_len(&mut self) -> WireResult<Option<usize>> {
        if self.flexible {
            let n = self.reader.read_uvarint()?;
            Ok(n.checked_sub(1).map(|n| n as usize))
        } else {
            match self.reader.read_i32()? {
                -1 => Ok(None),
                n if n < 0 => Err(WireError::InvalidLength(n.into())),
                n => Ok(Some(n as usize)),
            }
        }
    }

    fn read_block(&mut self) -> WireResult<Option<Bytes>> {
        match self.block_len()? {
            Some(len) => self.reader.read_bytes(len).map(Some),
            None => Ok(None),
        }
    }

    /// A nullable string with an `i16` length, regardless of flexibility.
    ///
    /// The request header's client id keeps this encoding even in header v2.
    pub fn read_legacy_string(&mut self) -> Option<String> {
        self.guard(|r| match r.read_i16()? {
            -1 => Ok(None),
            n if n < 0 => Err(WireError::InvalidLength(n.into())),
            n => r
                .read_bytes(n as usize)
                .map(|b| Some(String::from_utf8_lossy(&b).into_owned())),
        })
        .flatten()
    }

    /// A string with the encoding of the current flexibility.
    pub fn read_string(&mut self) -> Option<String> {
        match self.read_value(&FieldType::String, 0) {
            Value::String(s) => s,
            _ => None,
        }
    }

    fn read_scalar(&mut self, ty: &FieldType) -> WireResult<Value> {
        Ok(match ty {
            FieldType::Bool => Value::Bool(self.reader.read_u8()? != 0),
            FieldType::Int8 => Value::Int8(self.reader.read_i8()?),
            FieldType::Int16 => Value::Int16(self.reader.read_i16()?),
            FieldType::Int32 => Value::Int32(self.reader.read_i32()?),
            FieldType::Int64 => Value::Int64(self.reader.read_i64()?),
            FieldType::Float64 => Value::Float64(self.reader.read_f64()?),
            FieldType::Uuid => Value::Uuid(self.reader.read_array::<16>()?),
            FieldType::String => {
                let s = match self.string_len()? {
                    Some(len) => {
                        let raw = self.reader.read_bytes(len)?;
                        Some(String::from_utf8_lossy(&raw).into_owned())
                    }
                    None => None,
                };
                Value::String(s)
            }
            FieldType::Bytes => Value::Bytes(self.read_block()?),
            FieldType::Records => Value::Records(self.read_block()?.map(RecordSet::decode)),
            FieldType::Array(_) | FieldType::Struct(_) => ty.zero(),
        })
    }

    /// Read one value of type `ty`; the zero value once truncated.
    pub fn read_value(&mut self, ty: &FieldType, version: i16) -> Value {
        if self.truncated {
            return ty.zero();
        }
        match ty {
            FieldType::Array(inner) => self.read_array(inner, version),
            FieldType::Struct(fields) => Value::Struct(self.read_struct(fields, version)),
            _ => match self.read_scalar(ty) {
                Ok(value) => value,
                Err(_) => {
                    self.truncated = true;
                    ty.zero()
                }
            },
        }
    }

    fn read_array(&mut self, inner: &FieldType, version: i16) -> Value {
        let count = match self.block_len() {
            Ok(Some(count)) => count,
            Ok(None) => return Value::Array(None),
            Err(_) => {
                self.truncated = true;
                return Value::Array(Some(Vec::new()));
            }
        };
        let mut items = Vec::with_capacity(count.min(self.reader.remaining()));
        for _ in 0..count {
            if self.truncated {
                break;
            }
            if self.reader.is_empty() {
                self.truncated = true;
                break;
            }
            items.push(self.read_value(inner, version));
        }
        Value::Array(Some(items))
    }

    /// Read the fields of `fields` present in `version`, then the tag buffer
    /// when flexible.
    pub fn read_struct(&mut self, fields: &'static [Field], version: i16) -> Struct {
        let mut out = Struct::new();
        for field in fields.iter().filter(|f| f.tag.is_none() && f.present_in(version)) {
            let value = self.read_value(&field.ty, version);
            out.fields.push((field.name, value));
        }
        if self.flexible {
            for (tag, data) in self.read_tag_buffer().0 {
                let known = fields
                    .iter()
                    .find(|f| f.tag == Some(tag) && f.present_in(version));
                match known {
                    Some(field) => {
                        let mut sub = ValueReader::new(data, true);
                        let value = sub.read_value(&field.ty, version);
                        self.truncated |= sub.truncated;
                        out.fields.push((field.name, value));
                    }
                    None => out.tagged.insert(tag, data),
                }
            }
        }
        out
    }

    /// Read a tag buffer as raw entries, keyed by tag.
    pub fn read_tag_buffer(&mut self) -> TaggedFields {
        let mut tags = TaggedFields::new();
        let Some(count) = self.guard(WireReader::read_uvarint) else {
            return tags;
        };
        for _ in 0..count {
            let entry = self.guard(|r| {
                let tag = r.read_uvarint()?;
                let size = r.read_uvarint()? as usize;
                Ok((tag, r.read_bytes(size)?))
            });
            match entry {
                Some((tag, data)) => tags.insert(tag, data),
                None => break,
            }
        }
        tags
    }
}

/// Writer of schema values.
#[derive(Debug)]
pub struct ValueWriter {
    buf: BytesMut,
    flexible: bool,
}

impl ValueWriter {
    #[must_use]
    pub fn new(flexible: bool) -> Self {
        Self {
            buf: BytesMut::new(),
            flexible,
        }
    }

    #[must_use]
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }

    /// Direct access for header fields.
    pub fn buf_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    fn put_len(&mut self, len: Option<usize>, legacy_i16: bool) {
        match (self.flexible && !legacy_i16, len) {
            (true, Some(len)) => put_uvarint(&mut self.buf, len as u64 + 1),
            (true, None) => put_uvarint(&mut self.buf, 0),
            (false, Some(len)) if legacy_i16 => self.buf.put_i16(len as i16),
            (false, None) if legacy_i16 => self.buf.put_i16(-1),
            (false, Some(len)) => self.buf.put_i32(len as i32),
            (false, None) => self.buf.put_i32(-1),
        }
    }

    /// Counterpart of [`ValueReader::read_legacy_string`].
    pub fn write_legacy_string(&mut self, value: Option<&str>) {
        self.put_len(value.map(str::len), true);
        if let Some(s) = value {
            self.buf.put_slice(s.as_bytes());
        }
    }

    fn write_string(&mut self, value: Option<&str>) {
        self.put_len(value.map(str::len), !self.flexible);
        if let Some(s) = value {
            self.buf.put_slice(s.as_bytes());
        }
    }

    fn write_block(&mut self, value: Option<&[u8]>) {
        self.put_len(value.map(<[u8]>::len), false);
        if let Some(data) = value {
            self.buf.put_slice(data);
        }
    }

    /// Write `value` as `ty`; a mismatched value is written as the zero value.
    pub fn write_value(&mut self, ty: &FieldType, value: &Value, version: i16) {
        match (ty, value) {
            (FieldType::Bool, Value::Bool(v)) => self.buf.put_u8(u8::from(*v)),
            (FieldType::Int8, Value::Int8(v)) => self.buf.put_i8(*v),
            (FieldType::Int16, Value::Int16(v)) => self.buf.put_i16(*v),
            (FieldType::Int32, Value::Int32(v)) => self.buf.put_i32(*v),
            (FieldType::Int64, Value::Int64(v)) => self.buf.put_i64(*v),
            (FieldType::Float64, Value::Float64(v)) => self.buf.put_f64(*v),
            (FieldType::Uuid, Value::Uuid(v)) => self.buf.put_slice(v),
            (FieldType::String, Value::String(v)) => self.write_string(v.as_deref()),
            (FieldType::Bytes, Value::Bytes(v)) => self.write_block(v.as_deref()),
            (FieldType::Records, Value::Records(v)) => {
                let raw = v.as_ref().map(|r| r.raw().to_bytes());
                self.write_block(raw.as_deref());
            }
            (FieldType::Array(inner), Value::Array(items)) => {
                self.put_len(items.as_ref().map(Vec::len), false);
                for item in items.iter().flatten() {
                    self.write_value(inner, item, version);
                }
            }
            (FieldType::Struct(fields), Value::Struct(s)) => self.write_struct(s, fields, version),
            (ty, _) => self.write_value(ty, &ty.zero(), version),
        }
    }

    /// Write the fields of `fields` present in `version`, then the tag
    /// buffer when flexible. Missing fields are written as zero values.
    pub fn write_struct(&mut self, value: &Struct, fields: &'static [Field], version: i16) {
        let mut tags: BTreeMap<u32, Bytes> = BTreeMap::new();
        for field in fields.iter().filter(|f| f.present_in(version)) {
            match field.tag {
                None => {
                    let zero;
                    let v = match value.get(field.name) {
                        Some(v) => v,
                        None => {
                            zero = field.ty.zero();
                            &zero
                        }
                    };
                    self.write_value(&field.ty, v, version);
                }
                Some(tag) if self.flexible => {
                    if let Some(v) = value.get(field.name) {
                        let mut sub = ValueWriter::new(true);
                        sub.write_value(&field.ty, v, version);
                        tags.insert(tag, sub.finish());
                    }
                }
                Some(_) => {}
            }
        }
        if self.flexible {
            for (tag, data) in value.tagged.iter() {
                tags.entry(tag).or_insert_with(|| data.clone());
            }
            self.write_tag_buffer(tags.iter().map(|(tag, data)| (*tag, data)));
        }
    }

    /// Write raw tag entries, which must already be in ascending order.
    pub fn write_tag_buffer<'a>(&mut self, tags: impl ExactSizeIterator<Item = (u32, &'a Bytes)>) {
        put_uvarint(&mut self.buf, tags.len() as u64);
        for (tag, data) in tags {
            put_uvarint(&mut self.buf, u64::from(tag));
            put_uvarint(&mut self.buf, data.len() as u64);
            self.buf.put_slice(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kafka::schema::{field, tagged};

    const NESTED: &[Field] = &[
        field!("id", FieldType::Int32, 0),
        field!("label", FieldType::String, 1),
    ];
    const FIELDS: &[Field] = &[
        field!("name", FieldType::String, 0),
        field!("items", FieldType::Array(&FieldType::Struct(NESTED)), 0),
        field!("flag", FieldType::Bool, 1),
        tagged!("extra", FieldType::Int64, 1, 0),
    ];

    fn sample() -> Struct {
        let item = |id| {
            Value::Struct(
                Struct::new()
                    .with("id", Value::Int32(id))
                    .with("label", Value::String(Some(format!("l{id}")))),
            )
        };
        Struct::new()
            .with("name", Value::String(Some("t".into())))
            .with("items", Value::Array(Some(vec![item(1), item(2)])))
            .with("flag", Value::Bool(true))
            .with("extra", Value::Int64(99))
    }

    fn encode(value: &Struct, version: i16, flexible: bool) -> Bytes {
        let mut writer = ValueWriter::new(flexible);
        writer.write_struct(value, FIELDS, version);
        writer.finish()
    }

    #[test]
    fn test_flexible_struct_with_known_tag() {
        let bytes = encode(&sample(), 1, true);
        let mut reader = ValueReader::new(bytes, true);
        let decoded = reader.read_struct(FIELDS, 1);
        assert!(!reader.is_truncated());
        assert_eq!(reader.remaining(), 0);
        assert_eq!(decoded.get("extra"), Some(&Value::Int64(99)));
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_version_gating_skips_fields() {
        let bytes = encode(&sample(), 0, false);
        // name: 2+1, items: 4 + 2*4
        assert_eq!(bytes.len(), 15);
        let decoded = ValueReader::new(bytes, false).read_struct(FIELDS, 0);
        assert!(decoded.get("flag").is_none());
        assert!(decoded.get("extra").is_none());
    }

    #[test]
    fn test_unknown_tags_preserved_verbatim() {
        let mut value = sample();
        value.tagged.insert(5, Bytes::from_static(&[0xaa, 0xbb]));
        let bytes = encode(&value, 1, true);
        let decoded = ValueReader::new(bytes.clone(), true).read_struct(FIELDS, 1);
        assert_eq!(decoded.tagged.get(5).map(|b| &b[..]), Some(&[0xaa, 0xbb][..]));
        assert_eq!(encode(&decoded, 1, true), bytes);
    }

    #[test]
    fn test_compact_null_and_empty_string() {
        let mut reader = ValueReader::new(Bytes::from_static(&[0x00, 0x01]), true);
        assert_eq!(reader.read_value(&FieldType::String, 0), Value::String(None));
        assert_eq!(reader.read_value(&FieldType::String, 0), Value::String(Some(String::new())));
        assert!(!reader.is_truncated());
    }

    #[test]
    fn test_truncation_yields_zero_values() {
        let bytes = encode(&sample(), 1, false);
        let cut = bytes.slice(..5);
        let mut reader = ValueReader::new(cut, false);
        let decoded = reader.read_struct(FIELDS, 1);
        assert!(reader.is_truncated());
        assert_eq!(decoded.get("name").and_then(Value::as_str), Some("t"));
        assert_eq!(decoded.get("flag"), Some(&Value::Bool(false)));
        // the array count did not fit
        assert_eq!(reader.consumed(), 3);
    }

    #[test]
    fn test_missing_field_written_as_zero() {
        let partial = Struct::new().with("name", Value::String(Some("t".into())));
        let bytes = encode(&partial, 1, false);
        let decoded = ValueReader::new(bytes, false).read_struct(FIELDS, 1);
        assert_eq!(decoded.get("items"), Some(&Value::Array(Some(vec![]))));
        assert_eq!(decoded.get("flag"), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_null_array() {
        let mut reader = ValueReader::new(Bytes::from_static(&[0xff, 0xff, 0xff, 0xff]), false);
        let ty = FieldType::Array(&FieldType::Int32);
        assert_eq!(reader.read_value(&ty, 0), Value::Array(None));
    }

    #[test]
    fn test_legacy_string_in_flexible_reader() {
        let mut writer = ValueWriter::new(true);
        writer.write_legacy_string(Some("client"));
        let mut reader = ValueReader::new(writer.finish(), true);
        assert_eq!(reader.read_legacy_string().as_deref(), Some("client"));
    }
}
