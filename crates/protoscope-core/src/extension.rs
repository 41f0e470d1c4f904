//! The contract every protocol extension implements.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::amqp::frame::MAX_FRAME_SIZE;
use crate::config::{MatcherConfig, ScopeConfig};
use crate::error::DissectError;
use crate::kafka::frame::DEFAULT_MAX_MESSAGE_SIZE;
use crate::matcher::RequestResponseMatcher;
use crate::metrics::ScopeMetrics;
use crate::model::{BaseEntry, Entry, OutputItem, ProtocolDescriptor};
use crate::network::{HalfStream, ReaderContext};

/// Limits and timeouts handed to every dissector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DissectOptions {
    pub amqp_max_frame_size: u32,
    pub kafka_max_message_size: usize,
    /// How long a Kafka response waits for its request to be registered.
    pub response_wait: Duration,
    /// Age after which a Kafka correlation id is forgotten.
    pub request_retention: Duration,
}

impl Default for DissectOptions {
    fn default() -> Self {
        Self {
            amqp_max_frame_size: MAX_FRAME_SIZE,
            kafka_max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            response_wait: Duration::from_millis(3000),
            request_retention: Duration::from_secs(30),
        }
    }
}

impl DissectOptions {
    #[must_use]
    pub fn from_config(config: &ScopeConfig) -> Self {
        Self {
            kafka_max_message_size: config.kafka.max_message_size,
            response_wait: config.matcher.response_wait(),
            request_retention: config.matcher.orphan_retention(),
            ..Self::default()
        }
    }
}

/// A protocol extension: descriptor, dissector, matcher factory and the
/// presentation functions for its entries.
#[async_trait]
pub trait Extension: Send + Sync {
    /// Static identity of the protocol.
    fn protocol(&self) -> &'static ProtocolDescriptor;

    /// Liveness reply, `"pong <name>"`.
    fn ping(&self) -> &'static str;

    /// Decode one half-connection until it ends.
    ///
    /// Decoded messages go to the matcher or the emitter through `ctx`.
    ///
    /// # Errors
    ///
    /// Returns the error that made the stream undecodable; the caller
    /// taints the stream and drains it.
    async fn dissect(
        &self,
        stream: &mut HalfStream,
        ctx: &ReaderContext,
        options: &DissectOptions,
    ) -> Result<(), DissectError>;

    /// Turn an emitted item into an indexable entry.
    fn analyze(
        &self,
        item: &OutputItem,
        resolved_source: Option<&str>,
        resolved_destination: Option<&str>,
    ) -> Entry;

    /// Compact listing form of an entry.
    fn summarize(&self, entry: &Entry) -> BaseEntry;

    /// JSON sections describing a request/response pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the representation cannot be serialized.
    fn represent(&self, request: &Value, response: &Value) -> Result<Vec<u8>, serde_json::Error>;

    /// Query-language macros contributed by the protocol.
    fn macros(&self) -> BTreeMap<String, String>;

    /// The matcher instance this extension's dissectors share.
    fn new_matcher(&self, config: &MatcherConfig, metrics: Arc<ScopeMetrics>) -> RequestResponseMatcher {
        RequestResponseMatcher::new(self.protocol(), config.clone(), metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = DissectOptions::default();
        assert_eq!(options.amqp_max_frame_size, 16 * 1024 * 1024);
        assert_eq!(options.kafka_max_message_size, 1024 * 1024);
        assert_eq!(options.response_wait, Duration::from_secs(3));
    }

    #[test]
    fn test_options_from_config() {
        let mut config = ScopeConfig::default();
        config.kafka.max_message_size = 4096;
        config.matcher.response_wait_ms = 50;
        let options = DissectOptions::from_config(&config);
        assert_eq!(options.kafka_max_message_size, 4096);
        assert_eq!(options.response_wait, Duration::from_millis(50));
        assert_eq!(options.amqp_max_frame_size, MAX_FRAME_SIZE);
    }
}
