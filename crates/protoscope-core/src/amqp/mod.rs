//! AMQP 0-9-1 extension.
//!
//! - [`frame`] - frame codec and payload parsing
//! - [`methods`] - method catalog and argument codec
//! - [`properties`] - content header and basic properties
//! - [`table`] - field tables
//! - [`dissector`] - content assembly and request/response classification

pub mod dissector;
pub mod frame;
pub mod methods;
pub mod properties;
pub mod table;

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::DissectError;
use crate::extension::{DissectOptions, Extension};
use crate::model::{
    BaseEntry, Entry, MessagePayload, OutputItem, ProtocolDescriptor, Representation, Section,
};
use crate::network::{HalfStream, ReaderContext};
use crate::wire::PagedBytes;

pub use frame::{AmqpCodec, Frame, FrameType, RawFrame};
pub use methods::Method;
pub use properties::{ContentHeader, Properties};
pub use table::{FieldTable, FieldValue};

/// Descriptor of the AMQP extension.
pub static AMQP_PROTOCOL: ProtocolDescriptor = ProtocolDescriptor {
    name: "amqp",
    long_name: "Advanced Message Queuing Protocol 0-9-1",
    abbreviation: "AMQP",
    macro_name: "amqp",
    version: "0-9-1",
    background_color: "#ff6600",
    foreground_color: "#ffffff",
    font_size: 12,
    reference_link: "https://www.rabbitmq.com/amqp-0-9-1-reference.html",
    ports: &["5671", "5672"],
    priority: 1,
};

/// A decoded AMQP method with its content, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct AmqpMessage {
    pub channel: u16,
    pub method: Method,
    /// Properties of a content-bearing method.
    pub properties: Option<Properties>,
    /// Assembled body of a content-bearing method.
    pub body: Option<PagedBytes>,
}

impl AmqpMessage {
    #[must_use]
    pub fn new(channel: u16, method: Method) -> Self {
        Self {
            channel,
            method,
            properties: None,
            body: None,
        }
    }
}

impl Serialize for AmqpMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("method", self.method.name())?;
        map.serialize_entry("channel", &self.channel)?;
        map.serialize_entry("classId", &self.method.class_id())?;
        map.serialize_entry("methodId", &self.method.method_id())?;
        map.serialize_entry("details", &self.method)?;
        if let Some(properties) = &self.properties {
            map.serialize_entry("properties", properties)?;
        }
        if let Some(body) = &self.body {
            map.serialize_entry("body", &STANDARD.encode(body.to_vec()))?;
        }
        map.end()
    }
}

/// The AMQP 0-9-1 extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct AmqpExtension;

impl AmqpExtension {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn amqp_payload(payload: &MessagePayload) -> Option<&AmqpMessage> {
    match payload {
        MessagePayload::Amqp(m) => Some(m),
        _ => None,
    }
}

fn message_sections(message: &Value, prefix: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    if message.is_null() {
        return sections;
    }

    let details = &message["details"];
    sections.extend(Section::scalar_table("Details", details, &format!("{prefix}.details")));
    sections.extend(Section::scalar_table(
        "Properties",
        &message["properties"],
        &format!("{prefix}.properties"),
    ));
    sections.extend(Section::scalar_table(
        "Headers",
        &message["properties"]["headers"],
        &format!("{prefix}.properties.headers"),
    ));
    // arguments, client/server properties
    if let Some(map) = details.as_object() {
        for (key, value) in map.iter().filter(|(_, v)| v.is_object()) {
            sections.extend(Section::scalar_table(
                &crate::model::title_case(key),
                value,
                &format!("{prefix}.details.{key}"),
            ));
        }
    }

    if let Some(data) = message["body"].as_str() {
        sections.push(Section::Body {
            title: "Body".to_string(),
            encoding: "base64".to_string(),
            mime_type: message["properties"]["contentType"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            data: data.to_string(),
            selector: format!("{prefix}.body"),
        });
    }
    sections
}

#[async_trait]
impl Extension for AmqpExtension {
    fn protocol(&self) -> &'static ProtocolDescriptor {
        &AMQP_PROTOCOL
    }

    fn ping(&self) -> &'static str {
        "pong amqp"
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
        let primary = amqp_payload(&item.pair.request.payload)
            .or_else(|| amqp_payload(&item.pair.response.payload));
        if let Some(message) = primary {
            entry.method = message.method.name().to_string();
            entry.summary = message
                .method
                .summary()
                .map(|(_, summary)| summary)
                .unwrap_or_default();
        }
        entry
    }

    fn summarize(&self, entry: &Entry) -> BaseEntry {
        let details = &entry.request["details"];
        let field = ["exchange", "queue", "replyText"]
            .into_iter()
            .find(|key| !entry.summary.is_empty() && details[*key].as_str() == Some(entry.summary.as_str()))
            .map(|key| format!("details.{key}"));
        BaseEntry::from_entry(entry, field.as_deref())
    }

    fn represent(&self, request: &Value, response: &Value) -> Result<Vec<u8>, serde_json::Error> {
        let representation = Representation {
            request: message_sections(request, "request"),
            response: message_sections(response, "response"),
        };
        serde_json::to_vec(&representation)
    }

    fn macros(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("amqp".to_string(), "proto.name == \"amqp\"".to_string())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CaptureSource, Direction, GenericMessage, TcpId};
    use methods::{BasicPublish, QueueDeclare, QueueDeclareOk};
    use serde_json::json;
    use std::time::{Duration, UNIX_EPOCH};

    fn item(request: AmqpMessage, response: Option<AmqpMessage>) -> OutputItem {
        let conn = TcpId::new(
            "10.0.0.1:40000".parse().unwrap(),
            "10.0.0.2:5672".parse().unwrap(),
        )
        .connection_info(false);
        let req = GenericMessage::new(
            Direction::Request,
            UNIX_EPOCH + Duration::from_millis(1_000),
            40,
            MessagePayload::Amqp(request),
        );
        let resp = match response {
            Some(m) => GenericMessage::new(
                Direction::Response,
                UNIX_EPOCH + Duration::from_millis(1_004),
                30,
                MessagePayload::Amqp(m),
            ),
            None => GenericMessage::empty(Direction::Response),
        };
        OutputItem::new(&AMQP_PROTOCOL, conn, req, resp, CaptureSource::Pcap)
    }

    fn declare() -> AmqpMessage {
        AmqpMessage::new(
            1,
            Method::QueueDeclare(QueueDeclare {
                queue: "q1".into(),
                durable: true,
                ..QueueDeclare::default()
            }),
        )
    }

    fn publish() -> AmqpMessage {
        let mut message = AmqpMessage::new(
            1,
            Method::BasicPublish(BasicPublish {
                exchange: "orders".into(),
                routing_key: "created".into(),
                ..BasicPublish::default()
            }),
        );
        message.properties = Some(Properties {
            content_type: Some("text/plain".into()),
            ..Properties::default()
        });
        message.body = Some(PagedBytes::copy_from_slice(b"hello"));
        message
    }

    #[test]
    fn test_message_json_shape() {
        let value = serde_json::to_value(publish()).unwrap();
        assert_eq!(value["method"], json!("basic publish"));
        assert_eq!(value["classId"], json!(60));
        assert_eq!(value["methodId"], json!(40));
        assert_eq!(value["details"]["exchange"], json!("orders"));
        assert_eq!(value["properties"]["contentType"], json!("text/plain"));
        assert_eq!(value["body"], json!("aGVsbG8="));
    }

    #[test]
    fn test_analyze_pair() {
        let response = AmqpMessage::new(
            1,
            Method::QueueDeclareOk(QueueDeclareOk {
                queue: "q1".into(),
                message_count: 0,
                consumer_count: 0,
            }),
        );
        let entry = AmqpExtension.analyze(&item(declare(), Some(response)), None, None);
        assert_eq!(entry.method, "queue declare");
        assert_eq!(entry.summary, "q1");
        assert_eq!(entry.status, 0);
        assert_eq!(entry.elapsed_time, 4);
        assert_eq!(entry.request_size, 40);
        assert_eq!(entry.response["details"]["queue"], json!("q1"));

        let base = AmqpExtension.summarize(&entry);
        assert_eq!(base.summary_query, "request.details.queue == \"q1\"");
        assert_eq!(base.method_query, "method == \"queue declare\"");
    }

    #[test]
    fn test_analyze_one_way_publish() {
        let entry = AmqpExtension.analyze(&item(publish(), None), Some("producer"), None);
        assert_eq!(entry.method, "basic publish");
        assert_eq!(entry.summary, "orders");
        assert!(entry.response.is_null());
        assert_eq!(entry.source.name, "producer");
    }

    #[test]
    fn test_represent_sections() {
        let request = serde_json::to_value(publish()).unwrap();
        let bytes = AmqpExtension.represent(&request, &Value::Null).unwrap();
        let rep: Value = serde_json::from_slice(&bytes).unwrap();

        let sections = rep["request"].as_array().unwrap();
        assert_eq!(sections[0]["type"], json!("table"));
        assert_eq!(sections[0]["title"], json!("Details"));
        let body = sections.iter().find(|s| s["type"] == json!("body")).unwrap();
        assert_eq!(body["encoding"], json!("base64"));
        assert_eq!(body["mimeType"], json!("text/plain"));
        assert_eq!(body["data"], json!("aGVsbG8="));
        assert_eq!(body["selector"], json!("request.body"));
        assert_eq!(rep["response"], json!([]));
    }

    #[test]
    fn test_represent_arguments_table() {
        let mut message = declare();
        if let Method::QueueDeclare(m) = &mut message.method {
            m.arguments.insert("x-max-length", FieldValue::Int(10));
        }
        let request = serde_json::to_value(message).unwrap();
        let bytes = AmqpExtension.represent(&request, &Value::Null).unwrap();
        let rep: Value = serde_json::from_slice(&bytes).unwrap();
        let arguments = rep["request"]
            .as_array()
            .unwrap()
            .iter()
            .find(|s| s["title"] == json!("Arguments"))
            .unwrap();
        assert_eq!(arguments["data"][0]["selector"], json!("request.details.arguments.x-max-length"));
    }

    #[test]
    fn test_descriptor_and_macros() {
        assert_eq!(AmqpExtension.protocol().name, "amqp");
        assert_eq!(AmqpExtension.protocol().ports, &["5671", "5672"]);
        assert_eq!(AmqpExtension.ping(), "pong amqp");
        assert_eq!(
            AmqpExtension.macros().get("amqp").map(String::as_str),
            Some("proto.name == \"amqp\"")
        );
    }
}
