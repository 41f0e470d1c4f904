//! Domain error types for the protocol dissection engine.
//!
//! Uses `thiserror` for ergonomic error definitions with proper context.
//! Every protocol-level error maps onto one [`ErrorKind`], which is the
//! label used for diagnostics counters.

use std::fmt;
use std::io;

use thiserror::Error;

/// Error taxonomy shared by every dissector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Frame, length or field invariant violated; the half-connection is tainted.
    ProtocolFormat,
    /// Recognized protocol but unknown class/method/api key; the frame is skipped.
    UnknownMessage,
    /// Kafka api key and version outside the schema catalog.
    VersionUnsupported,
    /// A pending message left the matcher without its counterpart.
    MatchTimeout,
    /// Temporary I/O error on the reader.
    Transient,
}

impl ErrorKind {
    /// Stable numeric code.
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            Self::ProtocolFormat => 1,
            Self::UnknownMessage => 2,
            Self::VersionUnsupported => 3,
            Self::MatchTimeout => 4,
            Self::Transient => 5,
        }
    }

    /// Label used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProtocolFormat => "protocol_format",
            Self::UnknownMessage => "unknown_message",
            Self::VersionUnsupported => "version_unsupported",
            Self::MatchTimeout => "match_timeout",
            Self::Transient => "transient",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors related to configuration parsing and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Invalid address format.
    #[error("invalid address format: {0} (expected 'host:port')")]
    InvalidAddress(String),

    /// Known service IP that does not parse.
    #[error("invalid IP address: {0}")]
    InvalidIp(String),

    /// A tap references a protocol no extension provides.
    #[error("unknown protocol '{0}'")]
    UnknownProtocol(String),

    /// Numeric setting outside its valid range.
    #[error("{field} must be {constraint}, got {value}")]
    OutOfRange {
        field: &'static str,
        constraint: &'static str,
        value: u64,
    },
}

/// Errors raised by the low-level byte readers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Input ended before a value was complete.
    #[error("unexpected end of input: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    /// A varint ran past its maximum width.
    #[error("varint exceeds {max_bytes} bytes")]
    VarintOverflow { max_bytes: usize },

    /// A length prefix was negative where null is not allowed.
    #[error("invalid length prefix: {0}")]
    InvalidLength(i64),
}

/// AMQP 0-9-1 decoding errors. Codes follow the AMQP reply-code table.
#[derive(Error, Debug)]
pub enum AmqpError {
    /// Bad frame type or frame-end octet.
    #[error("frame could not be parsed")]
    Frame,

    /// Payload did not match the grammar (bad field tag, truncated arguments).
    #[error("syntax error: {0}")]
    Syntax(String),

    /// Frame size over the negotiated maximum.
    #[error("frame size {size} exceeds maximum {max}")]
    MaxSize { size: u32, max: u32 },

    /// Content header frame payload too large.
    #[error("header frame size {size} exceeds maximum {max}")]
    MaxHeaderFrameSize { size: u32, max: u32 },

    /// Known class, unknown method id.
    #[error("unknown method {method_id} for class {class_id}")]
    UnknownMethod { class_id: u16, method_id: u16 },

    /// Unknown class id.
    #[error("unknown class {class_id}")]
    UnknownClass { class_id: u16 },

    /// Reader failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl AmqpError {
    /// AMQP numeric error code.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            Self::Frame => 501,
            Self::Syntax(_) => 502,
            Self::MaxSize { .. } => 551,
            Self::MaxHeaderFrameSize { .. } => 552,
            Self::UnknownMethod { .. } => 601,
            Self::UnknownClass { .. } => 602,
            Self::Io(_) => 541,
        }
    }

    /// Taxonomy kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownMethod { .. } | Self::UnknownClass { .. } => ErrorKind::UnknownMessage,
            Self::Io(e) if is_transient(e) => ErrorKind::Transient,
            _ => ErrorKind::ProtocolFormat,
        }
    }
}

impl From<WireError> for AmqpError {
    fn from(err: WireError) -> Self {
        Self::Syntax(err.to_string())
    }
}

/// Kafka decoding errors.
#[derive(Error, Debug)]
pub enum KafkaError {
    /// Length prefix over the configured maximum.
    #[error("message size {size} exceeds maximum {max}")]
    MessageTooLarge { size: usize, max: usize },

    /// Message too short to carry its header.
    #[error("message size {size} below minimum {min}")]
    FrameTooSmall { size: usize, min: usize },

    /// Negative length prefix.
    #[error("invalid message length {0}")]
    InvalidLength(i32),

    /// Api key outside the protocol's key space.
    #[error("unknown API key {0}")]
    UnknownApiKey(i16),

    /// Api key/version without a schema.
    #[error("unsupported API: key={api_key}, version={api_version}")]
    VersionUnsupported { api_key: i16, api_version: i16 },

    /// Field-level decode failure.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Reader failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl KafkaError {
    /// Taxonomy kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownApiKey(_) => ErrorKind::UnknownMessage,
            Self::VersionUnsupported { .. } => ErrorKind::VersionUnsupported,
            Self::Io(e) if is_transient(e) => ErrorKind::Transient,
            _ => ErrorKind::ProtocolFormat,
        }
    }
}

/// Error returned by an extension's dissector.
#[derive(Error, Debug)]
pub enum DissectError {
    /// AMQP decoding error.
    #[error("amqp: {0}")]
    Amqp(#[from] AmqpError),

    /// Kafka decoding error.
    #[error("kafka: {0}")]
    Kafka(#[from] KafkaError),

    /// The dissector panicked; the stream is tainted.
    #[error("dissector panicked: {0}")]
    Panicked(String),

    /// Reader failure outside a codec.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl DissectError {
    /// Taxonomy kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Amqp(e) => e.kind(),
            Self::Kafka(e) => e.kind(),
            Self::Panicked(_) => ErrorKind::ProtocolFormat,
            Self::Io(e) if is_transient(e) => ErrorKind::Transient,
            Self::Io(_) => ErrorKind::ProtocolFormat,
        }
    }
}

/// Errors that occur while running the tap.
#[derive(Error, Debug)]
pub enum ScopeError {
    /// TCP/IO error.
    #[error("connection error: {0}")]
    Connection(#[from] io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Dissection error surfaced to a caller.
    #[error("dissect error: {0}")]
    Dissect(#[from] DissectError),

    /// No extension registered under this name.
    #[error("unknown protocol '{0}'")]
    UnknownProtocol(String),

    /// The emission channel has no receiver.
    #[error("emission channel closed")]
    ChannelClosed,

    /// Shutdown signal received.
    #[error("tap shutting down")]
    Shutdown,
}

/// Errors that the reader may recover from by retrying.
#[must_use]
pub fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Result type alias for tap operations.
pub type Result<T> = std::result::Result<T, ScopeError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for wire-level reads.
pub type WireResult<T> = std::result::Result<T, WireError>;

/// Result type alias for AMQP decoding.
pub type AmqpResult<T> = std::result::Result<T, AmqpError>;

/// Result type alias for Kafka decoding.
pub type KafkaResult<T> = std::result::Result<T, KafkaError>;
