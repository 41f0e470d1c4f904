//! Protoscope Core Library
//!
//! Reconstructs application-layer exchanges from captured TCP traffic,
//! pairs requests with their responses and emits the pairs as structured
//! items for a downstream consumer.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Error types and the error-kind taxonomy
//! - [`wire`] - Byte readers, varints and page buffers
//! - [`model`] - Messages, connections, output items and entries
//! - [`extension`] - The contract every protocol extension implements
//! - [`registry`] - The ordered set of extensions and their matchers
//! - [`amqp`] - AMQP 0-9-1 dissection
//! - [`kafka`] - Kafka dissection
//! - [`matcher`] - Request/response correlation and orphan eviction
//! - [`pipeline`] - Bounded emission channel, service-IP filter and sinks
//! - [`network`] - Half-connection streams, sessions and the TCP relay
//! - [`metrics`] - Prometheus metrics collection
//!
//! # Example
//!
//! ```rust,ignore
//! use protoscope_core::config::ScopeConfig;
//! use protoscope_core::registry::ExtensionRegistry;
//!
//! let config = ScopeConfig::from_file("protoscope.yaml")?;
//! let registry = ExtensionRegistry::with_defaults(&config.matcher, &metrics);
//! let tap = ScopeTap::from_config(&config, Arc::new(registry), output, metrics);
//! let feed = tap.open_connection("kafka", tcp_id, false, CaptureSource::Pcap)?;
//! ```

#![forbid(unsafe_code)]

pub mod amqp;
pub mod config;
pub mod error;
pub mod extension;
pub mod kafka;
pub mod matcher;
pub mod metrics;
pub mod model;
pub mod network;
pub mod pipeline;
pub mod registry;
pub mod wire;

/// Test utilities for integration testing.
///
/// This module is only available when compiling tests or when the `testing` feature is enabled.
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use config::ScopeConfig;
pub use error::{ConfigError, DissectError, ErrorKind, Result, ScopeError};
pub use extension::{DissectOptions, Extension};
pub use matcher::{MatcherStats, OrphanSweeper, RequestResponseMatcher};
pub use metrics::ScopeMetrics;
pub use model::{CaptureSource, ConnectionInfo, Direction, GenericMessage, OutputItem, TcpId};
pub use network::{ScopeTap, TapListener};
pub use pipeline::{output_channel, EmissionPipeline, KnownServiceIps};
pub use registry::ExtensionRegistry;
