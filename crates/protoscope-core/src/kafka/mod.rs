//! Apache Kafka extension.
//!
//! - [`api_key`] - api keys, flexible versions and header versions
//! - [`schema`] / [`catalog`] - table-driven message layouts
//! - [`value`] / [`codec`] - dynamic values and the schema walker
//! - [`records`] - record batches
//! - [`frame`] - length-prefix framing
//! - [`message`] - request/response headers and bodies
//! - [`dissector`] - per-half decoding and correlation

pub mod api_key;
pub mod catalog;
pub mod codec;
pub mod dissector;
pub mod frame;
pub mod message;
pub mod records;
pub mod schema;
pub mod value;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value as Json;

use crate::error::DissectError;
use crate::extension::{DissectOptions, Extension};
use crate::model::{
    BaseEntry, Entry, MessagePayload, OutputItem, ProtocolDescriptor, Representation, Section, TableRow,
};
use crate::network::{HalfStream, ReaderContext};

pub use api_key::ApiKey;
pub use frame::KafkaFrameCodec;
pub use message::{decode_request, decode_response, KafkaBody, KafkaMessage};
pub use records::{Record, RecordBatch, RecordSet};
pub use value::{Struct, TaggedFields, Value};

/// Descriptor of the Kafka extension.
pub static KAFKA_PROTOCOL: ProtocolDescriptor = ProtocolDescriptor {
    name: "kafka",
    long_name: "Apache Kafka Protocol",
    abbreviation: "KAFKA",
    macro_name: "kafka",
    version: "12",
    background_color: "#000000",
    foreground_color: "#ffffff",
    font_size: 11,
    reference_link: "https://kafka.apache.org/protocol",
    ports: &["9092"],
    priority: 2,
};

/// Fields whose entries name the topics a request touches.
const TOPIC_LISTS: &[&str] = &["topics", "topicData", "topicNames"];

/// The Kafka extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct KafkaExtension;

impl KafkaExtension {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn kafka_payload(payload: &MessagePayload) -> Option<&KafkaMessage> {
    match payload {
        MessagePayload::Kafka(m) => Some(m),
        _ => None,
    }
}

/// Topic names of a request, joined with `", "`.
fn topic_summary(payload: &Struct) -> Option<String> {
    let list = TOPIC_LISTS
        .iter()
        .find_map(|name| payload.get(name).and_then(Value::as_array))?;
    let names: Vec<&str> = list
        .iter()
        .filter_map(|item| match item {
            Value::String(Some(name)) => Some(name.as_str()),
            Value::Struct(s) => s
                .get("name")
                .or_else(|| s.get("topic"))
                .and_then(Value::as_str),
            _ => None,
        })
        .collect();
    (!names.is_empty()).then(|| names.join(", "))
}

fn request_summary(message: &KafkaMessage) -> String {
    if message.api_key == ApiKey::ApiVersions {
        return message.client_id.clone().unwrap_or_default();
    }
    let Some(payload) = message.payload() else {
        return String::new();
    };
    topic_summary(payload)
        .or_else(|| payload.get("groupId").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_default()
}

fn flatten(value: &Json, path: &str, selector: &str, rows: &mut Vec<TableRow>) {
    match value {
        Json::Object(map) => {
            for (key, v) in map {
                let child = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                flatten(v, &child, &format!("{selector}.{key}"), rows);
            }
        }
        Json::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten(v, &format!("{path}[{i}]"), &format!("{selector}[{i}]"), rows);
            }
        }
        scalar => rows.push(TableRow {
            name: path.to_string(),
            value: scalar.clone(),
            selector: selector.to_string(),
        }),
    }
}

fn message_sections(message: &Json, prefix: &str, header_title: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    if message.is_null() {
        return sections;
    }
    sections.extend(Section::scalar_table(header_title, message, prefix));

    let mut rows = Vec::new();
    flatten(&message["payload"], "", &format!("{prefix}.payload"), &mut rows);
    if !rows.is_empty() {
        sections.push(Section::Table {
            title: "Payload".to_string(),
            data: rows,
        });
    }
    sections
}

#[async_trait]
impl Extension for KafkaExtension {
    fn protocol(&self) -> &'static ProtocolDescriptor {
        &KAFKA_PROTOCOL
    }

    fn ping(&self) -> &'static str {
        "pong kafka"
    }

    async fn dissect(
        &self,
        stream: &mut HalfStream,
        ctx: &ReaderContext,
        options: &DissectOptions,
    ) -> Result<(), DissectError> {
        dissector::dissect(stream, ctx, options).await
    }

    fn analyze(
        &self,
        item: &OutputItem,
        resolved_source: Option<&str>,
        resolved_destination: Option<&str>,
    ) -> Entry {
        let mut entry = Entry::from_item(item, resolved_source, resolved_destination);
        let request = kafka_payload(&item.pair.request.payload);
        let response = kafka_payload(&item.pair.response.payload);

        if let Some(message) = request.or(response) {
            entry.method = message.api_key.name().to_string();
        }
        entry.summary = request.map(request_summary).unwrap_or_default();
        entry.status = response
            .and_then(KafkaMessage::payload)
            .and_then(|body| body.get("errorCode"))
            .and_then(Value::as_i16)
            .map_or(0, i32::from);
        entry
    }

    fn summarize(&self, entry: &Entry) -> BaseEntry {
        let summary = Some(entry.summary.as_str());
        let field = if entry.summary.is_empty() {
            None
        } else if entry.request["clientId"].as_str() == summary && entry.method == "ApiVersions" {
            Some("clientId")
        } else if entry.request["payload"]["groupId"].as_str() == summary {
            Some("payload.groupId")
        } else {
            None
        };
        BaseEntry::from_entry(entry, field)
    }

    fn represent(&self, request: &Json, response: &Json) -> Result<Vec<u8>, serde_json::Error> {
        let representation = Representation {
            request: message_sections(request, "request", "Request Header"),
            response: message_sections(response, "response", "Response Header"),
        };
        serde_json::to_vec(&representation)
    }

    fn macros(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("kafka".to_string(), "proto.name == \"kafka\"".to_string())])
    }
}
