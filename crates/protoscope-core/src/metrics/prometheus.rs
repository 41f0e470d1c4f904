//! Prometheus metrics for the dissection engine.
//!
//! Counters are labelled by protocol and, where it applies, by direction
//! and error kind. Each [`ScopeMetrics`] owns a private registry so tests
//! and embedded uses do not collide.

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

use crate::error::ErrorKind;
use crate::model::Direction;

/// Metrics exposed by the tap.
pub struct ScopeMetrics {
    /// The Prometheus registry.
    pub registry: Registry,

    /// Decoded messages by protocol and direction.
    pub messages_total: IntCounterVec,

    /// Dissection errors by protocol, direction and error kind.
    pub dissect_errors_total: IntCounterVec,

    /// Request/response pairs emitted by protocol.
    pub pairs_emitted_total: IntCounterVec,

    /// One-sided items emitted by protocol (orphans and one-way messages).
    pub orphans_emitted_total: IntCounterVec,

    /// Items dropped by the known-service-IP filter.
    pub items_filtered_total: IntCounter,

    /// Half-connections abandoned after a format error or panic.
    pub tainted_streams_total: IntCounterVec,

    /// Half-connections currently being dissected.
    pub active_streams: IntGauge,

    /// Bytes read from half-connections by protocol and direction.
    pub bytes_processed_total: IntCounterVec,

    /// Capture time between a request and its response.
    pub match_latency_seconds: HistogramVec,
}

impl ScopeMetrics {
    /// Create a new metrics collection.
    ///
    /// # Panics
    ///
    /// Panics if metric registration fails (should not happen with unique names).
    #[must_use]
    pub fn new() -> Self {
        let registry = Registry::new();

        let messages_total = IntCounterVec::new(
            Opts::new(
                "protoscope_messages_total",
                "Total number of decoded messages by protocol and direction",
            ),
            &["protocol", "direction"],
        )
        .expect("metric creation should succeed");

        let dissect_errors_total = IntCounterVec::new(
            Opts::new(
                "protoscope_dissect_errors_total",
                "Total number of dissection errors by protocol, direction and kind",
            ),
            &["protocol", "direction", "kind"],
        )
        .expect("metric creation should succeed");

        let pairs_emitted_total = IntCounterVec::new(
            Opts::new(
                "protoscope_pairs_emitted_total",
                "Total number of matched request/response pairs",
            ),
            &["protocol"],
        )
        .expect("metric creation should succeed");

        let orphans_emitted_total = IntCounterVec::new(
            Opts::new(
                "protoscope_orphans_emitted_total",
                "Total number of items emitted without a counterpart",
            ),
            &["protocol"],
        )
        .expect("metric creation should succeed");

        let items_filtered_total = IntCounter::new(
            "protoscope_items_filtered_total",
            "Total number of outgoing items dropped for known service IPs",
        )
        .expect("metric creation should succeed");

        let tainted_streams_total = IntCounterVec::new(
            Opts::new(
                "protoscope_tainted_streams_total",
                "Total number of half-connections abandoned after a format error",
            ),
            &["protocol"],
        )
        .expect("metric creation should succeed");

        let active_streams = IntGauge::new(
            "protoscope_active_streams",
            "Current number of half-connections being dissected",
        )
        .expect("metric creation should succeed");

        let bytes_processed_total = IntCounterVec::new(
            Opts::new(
                "protoscope_bytes_processed_total",
                "Total bytes read from half-connections",
            ),
            &["protocol", "direction"],
        )
        .expect("metric creation should succeed");

        let match_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "protoscope_match_latency_seconds",
                "Capture time between a request and its response in seconds",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0,
            ]),
            &["protocol"],
        )
        .expect("metric creation should succeed");

        registry
            .register(Box::new(messages_total.clone()))
            .expect("metric registration should succeed");
        registry
            .register(Box::new(dissect_errors_total.clone()))
            .expect("metric registration should succeed");
        registry
            .register(Box::new(pairs_emitted_total.clone()))
            .expect("metric registration should succeed");
        registry
            .register(Box::new(orphans_emitted_total.clone()))
            .expect("metric registration should succeed");
        registry
            .register(Box::new(items_filtered_total.clone()))
            .expect("metric registration should succeed");
        registry
            .register(Box::new(tainted_streams_total.clone()))
            .expect("metric registration should succeed");
        registry
            .register(Box::new(active_streams.clone()))
            .expect("metric registration should succeed");
        registry
            .register(Box::new(bytes_processed_total.clone()))
            .expect("metric registration should succeed");
        registry
            .register(Box::new(match_latency_seconds.clone()))
            .expect("metric registration should succeed");

        Self {
            registry,
            messages_total,
            dissect_errors_total,
            pairs_emitted_total,
            orphans_emitted_total,
            items_filtered_total,
            tainted_streams_total,
            active_streams,
            bytes_processed_total,
            match_latency_seconds,
        }
    }

    pub fn record_message(&self, protocol: &str, direction: Direction) {
        self.messages_total
            .with_label_values(&[protocol, direction.as_str()])
            .inc();
    }

    pub fn record_error(&self, protocol: &str, direction: Direction, kind: ErrorKind) {
        self.dissect_errors_total
            .with_label_values(&[protocol, direction.as_str(), kind.as_str()])
            .inc();
    }

    /// Current value of an error counter.
    #[must_use]
    pub fn error_count(&self, protocol: &str, direction: Direction, kind: ErrorKind) -> u64 {
        self.dissect_errors_total
            .with_label_values(&[protocol, direction.as_str(), kind.as_str()])
            .get()
    }

    /// Record a matched pair and its capture latency.
    pub fn record_pair(&self, protocol: &str, latency_seconds: f64) {
        self.pairs_emitted_total.with_label_values(&[protocol]).inc();
        self.match_latency_seconds
            .with_label_values(&[protocol])
            .observe(latency_seconds);
    }

    pub fn record_orphan(&self, protocol: &str) {
        self.orphans_emitted_total.with_label_values(&[protocol]).inc();
    }

    pub fn record_filtered(&self) {
        self.items_filtered_total.inc();
    }

    pub fn record_tainted(&self, protocol: &str) {
        self.tainted_streams_total.with_label_values(&[protocol]).inc();
    }

    pub fn inc_active_streams(&self) {
        self.active_streams.inc();
    }

    pub fn dec_active_streams(&self) {
        self.active_streams.dec();
    }

    pub fn record_bytes(&self, protocol: &str, direction: Direction, bytes: u64) {
        self.bytes_processed_total
            .with_label_values(&[protocol, direction.as_str()])
            .inc_by(bytes);
    }

    /// Encode metrics in Prometheus text format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = String::new();
        encoder.encode_utf8(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

impl Default for ScopeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ScopeMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeMetrics")
            .field("active_streams", &self.active_streams.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = ScopeMetrics::new();
        assert!(metrics.encode().is_ok());
    }

    #[test]
    fn test_record_message() {
        let metrics = ScopeMetrics::new();
        metrics.record_message("kafka", Direction::Request);
        metrics.record_message("kafka", Direction::Response);

        let output = metrics.encode().unwrap();
        assert!(output.contains("protoscope_messages_total"));
        assert!(output.contains("direction=\"response\""));
    }

    #[test]
    fn test_record_error() {
        let metrics = ScopeMetrics::new();
        metrics.record_error("amqp", Direction::Request, ErrorKind::ProtocolFormat);
        assert_eq!(
            metrics.error_count("amqp", Direction::Request, ErrorKind::ProtocolFormat),
            1
        );
        assert_eq!(
            metrics.error_count("amqp", Direction::Response, ErrorKind::ProtocolFormat),
            0
        );
        let output = metrics.encode().unwrap();
        assert!(output.contains("kind=\"protocol_format\""));
    }

    #[test]
    fn test_record_pair_latency() {
        let metrics = ScopeMetrics::new();
        metrics.record_pair("amqp", 0.004);

        let output = metrics.encode().unwrap();
        assert!(output.contains("protoscope_pairs_emitted_total"));
        assert!(output.contains("protoscope_match_latency_seconds"));
    }

    #[test]
    fn test_stream_gauge() {
        let metrics = ScopeMetrics::new();
        metrics.inc_active_streams();
        metrics.inc_active_streams();
        metrics.dec_active_streams();
        assert_eq!(metrics.active_streams.get(), 1);
    }

    #[test]
    fn test_bytes_and_filter_counters() {
        let metrics = ScopeMetrics::new();
        metrics.record_bytes("kafka", Direction::Request, 1024);
        metrics.record_filtered();

        let output = metrics.encode().unwrap();
        assert!(output.contains("protoscope_bytes_processed_total"));
        assert!(output.contains("protoscope_items_filtered_total 1"));
    }
}
