//! Dynamically typed Kafka values produced by walking a schema.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use super::records::RecordSet;

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Uuid([u8; 16]),
    String(Option<String>),
    Bytes(Option<Bytes>),
    Records(Option<RecordSet>),
    Array(Option<Vec<Value>>),
    Struct(Struct),
}

impl Value {
    #[must_use]
    pub fn as_i16(&self) -> Option<i16> {
        match self {
            Self::Int16(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Int32(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// String contents; `None` for null strings and other types.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(Some(s)) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(Some(items)) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_struct(&self) -> Option<&Struct> {
        match self {
            Self::Struct(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_records(&self) -> Option<&RecordSet> {
        match self {
            Self::Records(Some(r)) => Some(r),
            _ => None,
        }
    }
}

/// Raw tag buffer entries no schema field claims, kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaggedFields(pub BTreeMap<u32, Bytes>);

impl TaggedFields {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: u32, data: Bytes) {
        self.0.insert(tag, data);
    }

    #[must_use]
    pub fn get(&self, tag: u32) -> Option<&Bytes> {
        self.0.get(&tag)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = (u32, &Bytes)> + '_ {
        self.0.iter().map(|(tag, data)| (*tag, data))
    }
}

impl Serialize for TaggedFields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (tag, data) in &self.0 {
            map.serialize_entry(&tag.to_string(), &STANDARD.encode(data))?;
        }
        map.end()
    }
}

/// An ordered set of named fields plus unclaimed tags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Struct {
    pub fields: Vec<(&'static str, Value)>,
    pub tagged: TaggedFields,
}

impl Struct {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Struct::push`].
    #[must_use]
    pub fn with(mut self, name: &'static str, value: Value) -> Self {
        self.push(name, value);
        self
    }

    /// Set `name`, replacing an existing value in place.
    pub fn push(&mut self, name: &'static str, value: Value) {
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.tagged.is_empty()
    }
}

/// Hyphenated lowercase hex, e.g. `"00112233-4455-6677-8899-aabbccddeeff"`.
#[must_use]
pub fn format_uuid(uuid: &[u8; 16]) -> String {
    let mut out = String::with_capacity(36);
    for (i, byte) in uuid.iter().enumerate() {
        if matches!(i, 4 | 6 | 8 | 10) {
            out.push('-');
        }
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Bool(v) => serializer.serialize_bool(*v),
            Self::Int8(v) => serializer.serialize_i8(*v),
            Self::Int16(v) => serializer.serialize_i16(*v),
            Self::Int32(v) => serializer.serialize_i32(*v),
            Self::Int64(v) => serializer.serialize_i64(*v),
            Self::Float64(v) => serializer.serialize_f64(*v),
            Self::Uuid(v) => serializer.serialize_str(&format_uuid(v)),
            Self::String(v) => v.serialize(serializer),
            Self::Bytes(None) | Self::Records(None) | Self::Array(None) => serializer.serialize_none(),
            Self::Bytes(Some(b)) => serializer.serialize_str(&STANDARD.encode(b)),
            Self::Records(Some(r)) => r.serialize(serializer),
            Self::Array(Some(items)) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Struct(s) => s.serialize(serializer),
        }
    }
}

impl Serialize for Struct {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        if !self.tagged.is_empty() {
            map.serialize_entry("_unknownTaggedFields", &self.tagged)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_struct_push_replaces() {
        let mut s = Struct::new()
            .with("name", Value::String(Some("a".into())))
            .with("count", Value::Int32(1));
        s.push("name", Value::String(Some("b".into())));
        assert_eq!(s.len(), 2);
        assert_eq!(s.fields[0].0, "name");
        assert_eq!(s.get("name").and_then(Value::as_str), Some("b"));
        assert!(s.get("missing").is_none());
    }

    #[test]
    fn test_json_shape() {
        let mut s = Struct::new()
            .with("topicId", Value::Uuid([0xab; 16]))
            .with("name", Value::String(None))
            .with("metadata", Value::Bytes(Some(Bytes::from_static(b"hi"))))
            .with("partitions", Value::Array(Some(vec![Value::Int32(0), Value::Int32(1)])));
        s.tagged.insert(7, Bytes::from_static(&[1, 2]));

        let value = serde_json::to_value(&s).unwrap();
        assert_eq!(value["topicId"], json!("abababab-abab-abab-abab-abababababab"));
        assert_eq!(value["name"], json!(null));
        assert_eq!(value["metadata"], json!("aGk="));
        assert_eq!(value["partitions"], json!([0, 1]));
        assert_eq!(value["_unknownTaggedFields"]["7"], json!("AQI="));
    }

    #[test]
    fn test_no_tag_key_when_empty() {
        let value = serde_json::to_value(Struct::new().with("a", Value::Bool(true))).unwrap();
        assert_eq!(value, json!({"a": true}));
    }

    #[test]
    fn test_format_uuid() {
        let mut uuid = [0u8; 16];
        uuid[15] = 1;
        assert_eq!(format_uuid(&uuid), "00000000-0000-0000-0000-000000000001");
    }
}
