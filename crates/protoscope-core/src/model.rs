//! Data model shared by extensions, the matcher and the emission pipeline.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::amqp::AmqpMessage;
use crate::kafka::KafkaMessage;

/// Identity and presentation data of a protocol. Immutable after registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolDescriptor {
    pub name: &'static str,
    pub long_name: &'static str,
    pub abbreviation: &'static str,
    #[serde(rename = "macro")]
    pub macro_name: &'static str,
    pub version: &'static str,
    pub background_color: &'static str,
    pub foreground_color: &'static str,
    pub font_size: u8,
    pub reference_link: &'static str,
    pub ports: &'static [&'static str],
    pub priority: u8,
}

/// Which half of a transaction a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Request,
    Response,
}

impl Direction {
    /// The other side.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Request => Self::Response,
            Self::Response => Self::Request,
        }
    }

    /// Label used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the traffic was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureSource {
    #[default]
    Pcap,
    Envoy,
    Linkerd,
}

/// The four-tuple of a TCP connection, oriented client to server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TcpId {
    pub client: SocketAddr,
    pub server: SocketAddr,
}

impl TcpId {
    #[must_use]
    pub fn new(client: SocketAddr, server: SocketAddr) -> Self {
        Self { client, server }
    }

    /// Connection info with the given direction bit.
    #[must_use]
    pub fn connection_info(&self, is_outgoing: bool) -> ConnectionInfo {
        ConnectionInfo {
            client_ip: self.client.ip(),
            client_port: self.client.port(),
            server_ip: self.server.ip(),
            server_port: self.server.port(),
            is_outgoing,
        }
    }
}

impl fmt::Display for TcpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.client, self.server)
    }
}

/// Connection identity carried by every emitted item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub client_ip: IpAddr,
    pub client_port: u16,
    pub server_ip: IpAddr,
    pub server_port: u16,
    pub is_outgoing: bool,
}

/// Protocol-specific payload of a message.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagePayload {
    /// Placeholder for the missing side of a one-sided pair.
    #[default]
    Empty,
    Amqp(AmqpMessage),
    Kafka(KafkaMessage),
}

/// A decoded request or response. Immutable once emitted by a decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericMessage {
    pub direction: Direction,
    pub capture_time: SystemTime,
    /// Bytes the decoder consumed for this message.
    pub capture_size: usize,
    pub payload: MessagePayload,
}

impl GenericMessage {
    #[must_use]
    pub fn new(
        direction: Direction,
        capture_time: SystemTime,
        capture_size: usize,
        payload: MessagePayload,
    ) -> Self {
        Self {
            direction,
            capture_time,
            capture_size,
            payload,
        }
    }

    /// The empty side of a one-sided pair.
    #[must_use]
    pub fn empty(direction: Direction) -> Self {
        Self::new(direction, UNIX_EPOCH, 0, MessagePayload::Empty)
    }

    #[must_use]
    pub fn is_request(&self) -> bool {
        self.direction == Direction::Request
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self.payload, MessagePayload::Empty)
    }

    /// Capture time in milliseconds since the Unix epoch.
    #[must_use]
    pub fn capture_millis(&self) -> i64 {
        unix_millis(self.capture_time)
    }

    /// Payload as JSON.
    #[must_use]
    pub fn payload_json(&self) -> Value {
        match &self.payload {
            MessagePayload::Empty => Value::Null,
            MessagePayload::Amqp(m) => serde_json::to_value(m).unwrap_or(Value::Null),
            MessagePayload::Kafka(m) => serde_json::to_value(m).unwrap_or(Value::Null),
        }
    }
}

/// A request together with its response (possibly empty).
#[derive(Debug, Clone, PartialEq)]
pub struct RequestResponsePair {
    pub request: GenericMessage,
    pub response: GenericMessage,
}

/// The structured emission for one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputItem {
    pub protocol: &'static ProtocolDescriptor,
    /// Request capture time in ms; the response's when the request is empty.
    pub timestamp: i64,
    pub connection: ConnectionInfo,
    pub pair: RequestResponsePair,
    pub capture: CaptureSource,
}

impl OutputItem {
    /// Build an item, deriving the timestamp from the pair.
    #[must_use]
    pub fn new(
        protocol: &'static ProtocolDescriptor,
        connection: ConnectionInfo,
        request: GenericMessage,
        response: GenericMessage,
        capture: CaptureSource,
    ) -> Self {
        let timestamp = if request.is_empty() {
            response.capture_millis()
        } else {
            request.capture_millis()
        };
        Self {
            protocol,
            timestamp,
            connection,
            pair: RequestResponsePair { request, response },
            capture,
        }
    }

    /// Total order for consumers merging items across connections.
    #[must_use]
    pub fn ordering_key(&self) -> (i64, IpAddr, u16, IpAddr, u16) {
        (
            self.timestamp,
            self.connection.client_ip,
            self.connection.client_port,
            self.connection.server_ip,
            self.connection.server_port,
        )
    }

    /// Time between request and response, zero for one-sided pairs.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        if self.pair.request.is_empty() || self.pair.response.is_empty() {
            return Duration::ZERO;
        }
        self.pair
            .response
            .capture_time
            .duration_since(self.pair.request.capture_time)
            .unwrap_or(Duration::ZERO)
    }
}

/// One side of an analyzed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub name: String,
    pub ip: IpAddr,
    pub port: u16,
}

/// Analyzed form of an [`OutputItem`], ready for indexing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub protocol: &'static ProtocolDescriptor,
    pub capture: CaptureSource,
    pub source: Endpoint,
    pub destination: Endpoint,
    pub outgoing: bool,
    pub timestamp: i64,
    pub start_time: i64,
    pub request: Value,
    pub response: Value,
    pub request_size: usize,
    pub response_size: usize,
    pub method: String,
    pub status: i32,
    pub elapsed_time: i64,
    pub summary: String,
}

impl Entry {
    /// Fill the protocol-independent fields from an item.
    #[must_use]
    pub fn from_item(
        item: &OutputItem,
        resolved_source: Option<&str>,
        resolved_destination: Option<&str>,
    ) -> Self {
        let conn = &item.connection;
        Self {
            protocol: item.protocol,
            capture: item.capture,
            source: Endpoint {
                name: resolved_source.unwrap_or_default().to_string(),
                ip: conn.client_ip,
                port: conn.client_port,
            },
            destination: Endpoint {
                name: resolved_destination.unwrap_or_default().to_string(),
                ip: conn.server_ip,
                port: conn.server_port,
            },
            outgoing: conn.is_outgoing,
            timestamp: item.timestamp,
            start_time: item.pair.request.capture_millis(),
            request: item.pair.request.payload_json(),
            response: item.pair.response.payload_json(),
            request_size: item.pair.request.capture_size,
            response_size: item.pair.response.capture_size,
            method: String::new(),
            status: 0,
            elapsed_time: i64::try_from(item.elapsed().as_millis()).unwrap_or(i64::MAX),
            summary: String::new(),
        }
    }
}

/// Compact projection of an [`Entry`] for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseEntry {
    pub protocol: &'static ProtocolDescriptor,
    pub summary: String,
    pub summary_query: String,
    pub status: i32,
    pub status_query: String,
    pub method: String,
    pub method_query: String,
    pub timestamp: i64,
    pub source: Endpoint,
    pub destination: Endpoint,
    pub is_outgoing: bool,
    pub latency: i64,
}

impl BaseEntry {
    /// Project an entry; `summary_field` names the request field the summary came from.
    #[must_use]
    pub fn from_entry(entry: &Entry, summary_field: Option<&str>) -> Self {
        Self {
            protocol: entry.protocol,
            summary: entry.summary.clone(),
            summary_query: summary_field
                .map(|field| format!("request.{field} == {}", quote(&entry.summary)))
                .unwrap_or_default(),
            status: entry.status,
            status_query: format!("response.status == {}", entry.status),
            method: entry.method.clone(),
            method_query: format!("method == {}", quote(&entry.method)),
            timestamp: entry.timestamp,
            source: entry.source.clone(),
            destination: entry.destination.clone(),
            is_outgoing: entry.outgoing,
            latency: entry.elapsed_time,
        }
    }
}

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""))
}

/// One row of a table section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub name: String,
    pub value: Value,
    pub selector: String,
}

/// A block of the human-readable representation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Section {
    Table {
        title: String,
        data: Vec<TableRow>,
    },
    Body {
        title: String,
        encoding: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
        data: String,
        selector: String,
    },
}

impl Section {
    /// Table of the scalar members of `object`; `None` when there are none.
    ///
    /// Nested objects and arrays are skipped; `selector_prefix` is joined
    /// with each key to form the row selector.
    #[must_use]
    pub fn scalar_table(title: &str, object: &Value, selector_prefix: &str) -> Option<Self> {
        let map = object.as_object()?;
        let data: Vec<TableRow> = map
            .iter()
            .filter(|(_, v)| !v.is_object() && !v.is_array())
            .map(|(key, value)| TableRow {
                name: title_case(key),
                value: value.clone(),
                selector: format!("{selector_prefix}.{key}"),
            })
            .collect();
        if data.is_empty() {
            return None;
        }
        Some(Self::Table {
            title: title.to_string(),
            data,
        })
    }
}

/// The request and response sections of a representation.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Representation {
    pub request: Vec<Section>,
    pub response: Vec<Section>,
}

/// `"routingKey"` and `"routing_key"` become `"Routing Key"`.
#[must_use]
pub fn title_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev_lower = false;
    let mut start = true;
    for ch in key.chars() {
        if ch == '_' || ch == '-' || ch == ' ' {
            start = true;
            prev_lower = false;
            continue;
        }
        if (ch.is_ascii_uppercase() && prev_lower) || (start && !out.is_empty()) {
            out.push(' ');
        }
        if start || out.is_empty() {
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
        start = false;
        prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
    }
    out
}

/// Milliseconds since the Unix epoch; zero for times before it.
#[must_use]
pub fn unix_millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
