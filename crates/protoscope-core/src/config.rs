//! Configuration types for the protoscope tap.
//!
//! Configuration is loaded from YAML files and validated before use.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::model::CaptureSource;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ScopeConfig {
    /// Inline relays to run.
    #[serde(default)]
    pub taps: Vec<TapConfig>,

    /// Emission pipeline configuration.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Request/response matcher configuration.
    #[serde(default)]
    pub matcher: MatcherConfig,

    /// Kafka decoder limits.
    #[serde(default)]
    pub kafka: KafkaConfig,

    /// Where analyzed entries are written.
    #[serde(default)]
    pub output: OutputConfig,

    /// Prometheus metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// One inline relay: clients connect to `listen`, traffic is forwarded to
/// `upstream` and dissected with the named protocol.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TapConfig {
    /// Extension name, e.g. "kafka".
    pub protocol: String,

    /// Address to bind to, e.g. "0.0.0.0:19092".
    pub listen: String,

    /// Server to forward to. Supports `${VAR}` expansion.
    pub upstream: String,

    /// Marks this traffic as outgoing for the known-service filter.
    #[serde(default)]
    pub outgoing: bool,

    /// Capture source reported on emitted items.
    #[serde(default)]
    pub capture: CaptureSource,

    /// Maximum number of concurrent client connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl TapConfig {
    /// Upstream address with environment variables expanded.
    #[must_use]
    pub fn upstream(&self) -> String {
        expand_env_vars(&self.upstream)
    }
}

/// Emission pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Capacity of the bounded emission channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Capacity of the per-half segment queue feeding each dissector.
    #[serde(default = "default_segment_queue")]
    pub segment_queue: usize,

    /// Outgoing items whose server is one of these addresses are dropped.
    /// Entries support `${VAR}` expansion.
    #[serde(default)]
    pub known_service_ips: Vec<String>,
}

impl PipelineConfig {
    /// Parse the known service IPs.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry is not an IP address.
    pub fn parsed_service_ips(&self) -> ConfigResult<Vec<IpAddr>> {
        self.known_service_ips
            .iter()
            .map(|raw| {
                let expanded = expand_env_vars(raw);
                expanded
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidIp(expanded.clone()))
            })
            .collect()
    }
}

/// Request/response matcher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MatcherConfig {
    /// Age after which an unanswered request is evicted.
    #[serde(default = "default_orphan_retention_ms")]
    pub orphan_retention_ms: u64,

    /// Emit evicted requests with an empty response.
    #[serde(default = "default_true")]
    pub emit_orphans: bool,

    /// Period of the eviction sweep.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// How long a Kafka response waits for its request to be registered.
    #[serde(default = "default_response_wait_ms")]
    pub response_wait_ms: u64,
}

impl MatcherConfig {
    #[must_use]
    pub fn orphan_retention(&self) -> Duration {
        Duration::from_millis(self.orphan_retention_ms)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    #[must_use]
    pub fn response_wait(&self) -> Duration {
        Duration::from_millis(self.response_wait_ms)
    }
}

/// Kafka decoder limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KafkaConfig {
    /// Largest accepted message, excluding the 4-byte length prefix.
    #[serde(default = "default_kafka_max_message_size")]
    pub max_message_size: usize,
}

/// Output of analyzed entries.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    /// JSON-lines file; stdout when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Prometheus metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Whether to enable the metrics endpoint.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Address for the metrics HTTP server.
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output logs in JSON format (for production).
    #[serde(default)]
    pub json: bool,
}

/// Expand environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of the environment variable `VAR_NAME`.
/// If the variable is not set, replaces with an empty string.
fn expand_env_vars(s: &str) -> String {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex");
    re.replace_all(s, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_default()
    })
    .to_string()
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_max_connections() -> usize {
    1000
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_segment_queue() -> usize {
    64
}

fn default_orphan_retention_ms() -> u64 {
    30_000
}

fn default_sweep_interval_ms() -> u64 {
    1_000
}

fn default_response_wait_ms() -> u64 {
    3_000
}

fn default_kafka_max_message_size() -> usize {
    1 << 20 // 1 MiB
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// Default implementations

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            segment_queue: default_segment_queue(),
            known_service_ips: Vec::new(),
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            orphan_retention_ms: default_orphan_retention_ms(),
            emit_orphans: true,
            sweep_interval_ms: default_sweep_interval_ms(),
            response_wait_ms: default_response_wait_ms(),
        }
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_kafka_max_message_size(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_metrics_address(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Configuration loading and validation

impl ScopeConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if
    /// validation fails.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing or validation fails.
    pub fn from_str(content: &str) -> ConfigResult<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `pipeline.channel_capacity` or `pipeline.segment_queue` is zero
    /// - `matcher.sweep_interval_ms` is zero
    /// - `kafka.max_message_size` cannot hold a request header
    /// - a known service IP does not parse
    /// - a tap address is not `host:port`
    pub fn validate(&self) -> ConfigResult<()> {
        if self.pipeline.channel_capacity == 0 {
            return Err(ConfigError::OutOfRange {
                field: "pipeline.channel_capacity",
                constraint: "greater than 0",
                value: 0,
            });
        }
        if self.pipeline.segment_queue == 0 {
            return Err(ConfigError::OutOfRange {
                field: "pipeline.segment_queue",
                constraint: "greater than 0",
                value: 0,
            });
        }
        if self.matcher.sweep_interval_ms == 0 {
            return Err(ConfigError::OutOfRange {
                field: "matcher.sweep_interval_ms",
                constraint: "greater than 0",
                value: 0,
            });
        }
        // api key + version + correlation id
        const MIN_KAFKA_MESSAGE: usize = 8;
        if self.kafka.max_message_size < MIN_KAFKA_MESSAGE {
            return Err(ConfigError::OutOfRange {
                field: "kafka.max_message_size",
                constraint: "at least 8",
                value: self.kafka.max_message_size as u64,
            });
        }

        self.pipeline.parsed_service_ips()?;

        for tap in &self.taps {
            check_address(&tap.listen)?;
            check_address(&tap.upstream())?;
        }
        Ok(())
    }

    /// Check that every tap names a protocol in `known`.
    ///
    /// # Errors
    ///
    /// Returns the first unknown protocol name.
    pub fn validate_protocols(&self, known: &[&str]) -> ConfigResult<()> {
        for tap in &self.taps {
            if !known.contains(&tap.protocol.as_str()) {
                return Err(ConfigError::UnknownProtocol(tap.protocol.clone()));
            }
        }
        Ok(())
    }
}

fn check_address(addr: &str) -> ConfigResult<()> {
    let parts: Vec<&str> = addr.rsplitn(2, ':').collect();
    if parts.len() != 2 || parts[1].is_empty() || parts[0].parse::<u16>().is_err() {
        return Err(ConfigError::InvalidAddress(addr.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_values_applied() {
        let config = ScopeConfig::from_str("{}").unwrap();
        assert!(config.taps.is_empty());
        assert_eq!(config.pipeline.channel_capacity, 1024);
        assert_eq!(config.matcher.orphan_retention(), Duration::from_secs(30));
        assert!(config.matcher.emit_orphans);
        assert_eq!(config.matcher.response_wait(), Duration::from_millis(3000));
        assert_eq!(config.kafka.max_message_size, 1_048_576);
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.address, "0.0.0.0:9090");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_from_yaml_string() {
        let yaml = r"
taps:
  - protocol: kafka
    listen: '127.0.0.1:19092'
    upstream: 'kafka:9092'
    outgoing: true
    capture: envoy
pipeline:
  channel_capacity: 16
  known_service_ips: ['10.0.0.7']
matcher:
  orphan_retention_ms: 500
  emit_orphans: false
";
        let config = ScopeConfig::from_str(yaml).unwrap();
        assert_eq!(config.taps.len(), 1);
        let tap = &config.taps[0];
        assert_eq!(tap.protocol, "kafka");
        assert!(tap.outgoing);
        assert_eq!(tap.capture, CaptureSource::Envoy);
        assert_eq!(tap.max_connections, 1000);
        assert_eq!(config.pipeline.channel_capacity, 16);
        assert_eq!(
            config.pipeline.parsed_service_ips().unwrap(),
            vec!["10.0.0.7".parse::<IpAddr>().unwrap()]
        );
        assert!(!config.matcher.emit_orphans);
        assert_eq!(config.matcher.orphan_retention_ms, 500);
    }

    #[test]
    fn test_zero_channel_capacity_rejected() {
        let err = ScopeConfig::from_str("pipeline:\n  channel_capacity: 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::OutOfRange {
                field: "pipeline.channel_capacity",
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_service_ip_rejected() {
        let err =
            ScopeConfig::from_str("pipeline:\n  known_service_ips: ['not-an-ip']\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidIp(_)));
    }

    #[test]
    fn test_invalid_tap_address_rejected() {
        let yaml = r"
taps:
  - protocol: amqp
    listen: 'localhost'
    upstream: 'rabbit:5672'
";
        let err = ScopeConfig::from_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAddress(_)));
    }

    #[test]
    fn test_validate_protocols() {
        let yaml = r"
taps:
  - protocol: http
    listen: '0.0.0.0:8080'
    upstream: 'web:80'
";
        let config = ScopeConfig::from_str(yaml).unwrap();
        let err = config.validate_protocols(&["amqp", "kafka"]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProtocol(name) if name == "http"));
    }

    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("PROTOSCOPE_TEST_UPSTREAM", "broker-1:9092");
        std::env::set_var("PROTOSCOPE_TEST_SERVICE_IP", "10.1.2.3");

        let yaml = r"
taps:
  - protocol: kafka
    listen: '0.0.0.0:19092'
    upstream: '${PROTOSCOPE_TEST_UPSTREAM}'
pipeline:
  known_service_ips: ['${PROTOSCOPE_TEST_SERVICE_IP}']
";
        let config = ScopeConfig::from_str(yaml).unwrap();
        assert_eq!(config.taps[0].upstream(), "broker-1:9092");
        assert_eq!(
            config.pipeline.parsed_service_ips().unwrap()[0].to_string(),
            "10.1.2.3"
        );

        std::env::remove_var("PROTOSCOPE_TEST_UPSTREAM");
        std::env::remove_var("PROTOSCOPE_TEST_SERVICE_IP");
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "logging:\n  level: debug\n  json: true").unwrap();
        let config = ScopeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_from_missing_file() {
        let err = ScopeConfig::from_file("/nonexistent/protoscope.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError { .. }));
    }
}
