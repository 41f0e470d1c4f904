//! Table-driven message schemas.
//!
//! A schema is a static list of [`Field`]s, each valid for a version range
//! and optionally carried in the tag buffer. The codec walks these tables
//! instead of per-message structs, so adding an API means adding a table
//! in [`super::catalog`].

use super::api_key::ApiKey;
use super::catalog;
use super::value::{Struct, Value};

/// Wire type of a field.
#[derive(Debug, Clone, Copy)]
pub enum FieldType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float64,
    Uuid,
    String,
    Bytes,
    Records,
    Array(&'static FieldType),
    Struct(&'static [Field]),
}

impl FieldType {
    /// Value used when a field is absent or the input is truncated.
    #[must_use]
    pub fn zero(&self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::Int8 => Value::Int8(0),
            Self::Int16 => Value::Int16(0),
            Self::Int32 => Value::Int32(0),
            Self::Int64 => Value::Int64(0),
            Self::Float64 => Value::Float64(0.0),
            Self::Uuid => Value::Uuid([0; 16]),
            Self::String => Value::String(Some(String::new())),
            Self::Bytes => Value::Bytes(Some(bytes::Bytes::new())),
            Self::Records => Value::Records(None),
            Self::Array(_) => Value::Array(Some(Vec::new())),
            Self::Struct(_) => Value::Struct(Struct::default()),
        }
    }
}

/// One field of a message or nested struct.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub ty: FieldType,
    /// First version carrying the field.
    pub min: i16,
    /// Last version carrying the field.
    pub max: i16,
    /// Tag id when the field lives in the tag buffer.
    pub tag: Option<u32>,
}

impl Field {
    #[must_use]
    pub fn present_in(&self, version: i16) -> bool {
        version >= self.min && version <= self.max
    }
}

/// `field!("name", TYPE, min)` or `field!("name", TYPE, min, max)`.
macro_rules! field {
    ($name:literal, $ty:expr, $min:literal) => {
        $crate::kafka::schema::Field {
            name: $name,
            ty: $ty,
            min: $min,
            max: i16::MAX,
            tag: None,
        }
    };
    ($name:literal, $ty:expr, $min:literal, $max:literal) => {
        $crate::kafka::schema::Field {
            name: $name,
            ty: $ty,
            min: $min,
            max: $max,
            tag: None,
        }
    };
}

/// `tagged!("name", TYPE, min, tag)`.
macro_rules! tagged {
    ($name:literal, $ty:expr, $min:literal, $tag:literal) => {
        $crate::kafka::schema::Field {
            name: $name,
            ty: $ty,
            min: $min,
            max: i16::MAX,
            tag: Some($tag),
        }
    };
}

pub(crate) use field;
pub(crate) use tagged;

/// Request or response body layout of one API.
#[derive(Debug)]
pub struct MessageSchema {
    pub api_key: ApiKey,
    pub min_version: i16,
    pub max_version: i16,
    pub fields: &'static [Field],
}

impl MessageSchema {
    #[must_use]
    pub fn supports(&self, version: i16) -> bool {
        version >= self.min_version && version <= self.max_version
    }
}

/// Request schema for `api_key` at `version`, if cataloged.
#[must_use]
pub fn request_schema(api_key: ApiKey, version: i16) -> Option<&'static MessageSchema> {
    catalog::request(api_key).filter(|schema| schema.supports(version))
}

/// Response schema for `api_key` at `version`, if cataloged.
#[must_use]
pub fn response_schema(api_key: ApiKey, version: i16) -> Option<&'static MessageSchema> {
    catalog::response(api_key).filter(|schema| schema.supports(version))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_fields(fields: &'static [Field], max_version: i16, path: &str) {
        let mut tags = Vec::new();
        for field in fields {
            assert!(field.min <= field.max, "{path}.{}: empty range", field.name);
            assert!(field.min <= max_version, "{path}.{}: never present", field.name);
            if let Some(tag) = field.tag {
                assert!(!tags.contains(&tag), "{path}.{}: duplicate tag {tag}", field.name);
                tags.push(tag);
            }
            let mut ty = &field.ty;
            while let FieldType::Array(inner) = ty {
                ty = inner;
            }
            if let FieldType::Struct(nested) = ty {
                check_fields(nested, max_version, &format!("{path}.{}", field.name));
            }
        }
    }

    #[test]
    fn test_catalog_is_consistent() {
        for key in ApiKey::ALL {
            for schema in [catalog::request(*key), catalog::response(*key)]
                .into_iter()
                .flatten()
            {
                assert_eq!(schema.api_key, *key);
                assert!(schema.min_version <= schema.max_version);
                check_fields(schema.fields, schema.max_version, key.name());
            }
            assert_eq!(
                catalog::request(*key).map(|s| s.max_version),
                catalog::response(*key).map(|s| s.max_version),
                "{} request/response ranges differ",
                key.name()
            );
        }
    }

    #[test]
    fn test_tagged_fields_only_in_flexible_versions() {
        for key in ApiKey::ALL {
            let Some(schema) = catalog::request(*key) else {
                continue;
            };
            let first_flexible = key.first_flexible_version().unwrap_or(i16::MAX);
            for field in schema.fields.iter().filter(|f| f.tag.is_some()) {
                assert!(field.min >= first_flexible, "{}.{}", key.name(), field.name);
            }
        }
    }

    #[test]
    fn test_lookup_respects_version_range() {
        assert!(request_schema(ApiKey::Metadata, 12).is_some());
        assert!(request_schema(ApiKey::Metadata, 13).is_none());
        assert!(response_schema(ApiKey::ApiVersions, 0).is_some());
        assert!(request_schema(ApiKey::LeaderAndIsr, 0).is_none());
        assert!(request_schema(ApiKey::Produce, -1).is_none());
    }
}
