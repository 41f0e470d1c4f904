//! In-process dissection harness.
//!
//! Wires a registry, a tap and an emission pipeline ending in a
//! [`CollectingSink`], so tests can push bytes into connections and
//! inspect what comes out.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;

use super::sink::CollectingSink;
use crate::config::MatcherConfig;
use crate::error::Result;
use crate::extension::DissectOptions;
use crate::matcher::RequestResponseMatcher;
use crate::metrics::ScopeMetrics;
use crate::model::{CaptureSource, OutputItem, TcpId};
use crate::network::{ConnectionFeed, ScopeTap};
use crate::pipeline::{output_channel, EmissionPipeline, KnownServiceIps, OutputSender, PipelineStats};
use crate::registry::ExtensionRegistry;

/// Test environment for dissecting synthetic connections.
pub struct DissectHarness {
    pub metrics: Arc<ScopeMetrics>,
    pub registry: Arc<ExtensionRegistry>,
    pub tap: ScopeTap,
    pub sink: CollectingSink,
    pub known_ips: KnownServiceIps,
    output: OutputSender,
    pipeline: JoinHandle<Result<PipelineStats>>,
    next_port: AtomicU16,
}

impl DissectHarness {
    /// Harness with default limits. Must be called inside a runtime.
    #[must_use]
    pub fn new() -> Self {
        HarnessBuilder::new().build()
    }

    #[must_use]
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::new()
    }

    /// Open an incoming connection from a fresh client port to the
    /// protocol's default server port.
    ///
    /// # Errors
    ///
    /// Returns an error if `protocol` is not registered.
    pub fn open(&self, protocol: &str) -> Result<ConnectionFeed> {
        let server_port = self
            .registry
            .get(protocol)
            .and_then(|r| r.protocol().ports.last())
            .and_then(|port| port.parse().ok())
            .unwrap_or(9000);
        let client_port = self.next_port.fetch_add(1, Ordering::Relaxed);
        let tcp_id = TcpId::new(
            SocketAddr::from(([10, 0, 0, 1], client_port)),
            SocketAddr::from(([10, 0, 0, 2], server_port)),
        );
        self.open_with(protocol, tcp_id, false)
    }

    /// Open a connection with an explicit identity.
    ///
    /// # Errors
    ///
    /// Returns an error if `protocol` is not registered.
    pub fn open_with(&self, protocol: &str, tcp_id: TcpId, outgoing: bool) -> Result<ConnectionFeed> {
        self.tap
            .open_connection(protocol, tcp_id, outgoing, CaptureSource::Pcap)
    }

    #[must_use]
    pub fn matcher(&self, protocol: &str) -> Option<Arc<RequestResponseMatcher>> {
        self.registry.get(protocol).map(|r| Arc::clone(&r.matcher))
    }

    /// Run one eviction pass over every matcher at `now`.
    pub async fn sweep(&self, now: SystemTime) -> usize {
        let mut evicted = 0;
        for matcher in self.registry.matchers() {
            for item in matcher.evict_expired(now) {
                evicted += 1;
                let _ = self.output.send(item).await;
            }
        }
        evicted
    }

    /// Wait for at least `count` emitted items.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<OutputItem> {
        self.sink.wait_for(count, timeout).await
    }

    #[must_use]
    pub fn items(&self) -> Vec<OutputItem> {
        self.sink.items()
    }

    /// Stop the pipeline once every open connection has finished.
    ///
    /// # Errors
    ///
    /// Returns the pipeline's flush error.
    pub async fn shutdown(self) -> Result<PipelineStats> {
        let Self { tap, output, pipeline, .. } = self;
        drop(tap);
        drop(output);
        match pipeline.await {
            Ok(stats) => stats,
            Err(_) => Ok(PipelineStats::default()),
        }
    }
}

impl Default for DissectHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for a [`DissectHarness`] with custom limits.
#[derive(Debug, Clone)]
pub struct HarnessBuilder {
    matcher: MatcherConfig,
    options: DissectOptions,
    channel_capacity: usize,
    known_ips: Vec<IpAddr>,
}

impl HarnessBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            matcher: MatcherConfig::default(),
            options: DissectOptions::default(),
            channel_capacity: 64,
            known_ips: Vec::new(),
        }
    }

    #[must_use]
    pub fn orphan_retention(mut self, retention: Duration) -> Self {
        self.matcher.orphan_retention_ms = retention.as_millis() as u64;
        self.options.request_retention = retention;
        self
    }

    #[must_use]
    pub fn emit_orphans(mut self, emit: bool) -> Self {
        self.matcher.emit_orphans = emit;
        self
    }

    #[must_use]
    pub fn response_wait(mut self, wait: Duration) -> Self {
        self.matcher.response_wait_ms = wait.as_millis() as u64;
        self.options.response_wait = wait;
        self
    }

    #[must_use]
    pub fn kafka_max_message_size(mut self, size: usize) -> Self {
        self.options.kafka_max_message_size = size;
        self
    }

    #[must_use]
    pub fn amqp_max_frame_size(mut self, size: u32) -> Self {
        self.options.amqp_max_frame_size = size;
        self
    }

    #[must_use]
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    #[must_use]
    pub fn known_service_ip(mut self, ip: IpAddr) -> Self {
        self.known_ips.push(ip);
        self
    }

    /// Build the harness and start its pipeline.
    #[must_use]
    pub fn build(self) -> DissectHarness {
        let metrics = Arc::new(ScopeMetrics::new());
        let registry = Arc::new(ExtensionRegistry::with_defaults(&self.matcher, &metrics));
        let (output, input) = output_channel(self.channel_capacity);
        let known_ips = KnownServiceIps::new(self.known_ips);
        let sink = CollectingSink::new();

        let pipeline = EmissionPipeline::new(input, known_ips.clone(), Arc::clone(&metrics))
            .with_sink(sink.clone());
        let pipeline = tokio::spawn(pipeline.run());

        let tap = ScopeTap::new(
            Arc::clone(&registry),
            output.clone(),
            Arc::clone(&metrics),
            self.options,
            16,
        );

        DissectHarness {
            metrics,
            registry,
            tap,
            sink,
            known_ips,
            output,
            pipeline,
            next_port: AtomicU16::new(40000),
        }
    }
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}
