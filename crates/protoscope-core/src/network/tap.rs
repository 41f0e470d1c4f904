//! Entry point for captured connections.
//!
//! [`ScopeTap::open_connection`] starts both dissector halves of a
//! connection and hands back the senders its bytes are fed through.

use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::context::{Emitter, ReaderContext};
use super::session::{run_half, HalfReport};
use super::stream::{half_stream, Segment, SegmentSender};
use crate::config::ScopeConfig;
use crate::error::Result;
use crate::extension::DissectOptions;
use crate::metrics::ScopeMetrics;
use crate::model::{CaptureSource, Direction, TcpId};
use crate::pipeline::OutputSender;
use crate::registry::ExtensionRegistry;

/// Reports of both halves once a connection is done.
#[derive(Debug, Default)]
pub struct ConnectionReport {
    pub client: Option<HalfReport>,
    pub server: Option<HalfReport>,
    /// Orphan requests flushed when the connection closed.
    pub flushed: usize,
}

/// Feeds for one connection being dissected.
#[derive(Debug)]
pub struct ConnectionFeed {
    /// Client-to-server bytes.
    pub client: SegmentSender,
    /// Server-to-client bytes.
    pub server: SegmentSender,
    pub join: JoinHandle<ConnectionReport>,
}

impl ConnectionFeed {
    /// Queue client bytes. Returns `false` if the client half is gone.
    pub async fn client_bytes(&self, data: impl Into<Bytes>) -> bool {
        self.client.send(Ok(Segment::now(data))).await.is_ok()
    }

    /// Queue server bytes. Returns `false` if the server half is gone.
    pub async fn server_bytes(&self, data: impl Into<Bytes>) -> bool {
        self.server.send(Ok(Segment::now(data))).await.is_ok()
    }

    /// Close both halves and wait for the dissectors to finish.
    pub async fn finish(self) -> ConnectionReport {
        let Self { client, server, join } = self;
        drop(client);
        drop(server);
        match join.await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "connection task failed");
                ConnectionReport::default()
            }
        }
    }
}

/// Dispatches captured connections to their protocol's dissector.
#[derive(Debug, Clone)]
pub struct ScopeTap {
    registry: Arc<ExtensionRegistry>,
    output: OutputSender,
    metrics: Arc<ScopeMetrics>,
    options: Arc<DissectOptions>,
    segment_queue: usize,
}

impl ScopeTap {
    #[must_use]
    pub fn new(
        registry: Arc<ExtensionRegistry>,
        output: OutputSender,
        metrics: Arc<ScopeMetrics>,
        options: DissectOptions,
        segment_queue: usize,
    ) -> Self {
        Self {
            registry,
            output,
            metrics,
            options: Arc::new(options),
            segment_queue,
        }
    }

    #[must_use]
    pub fn from_config(
        config: &ScopeConfig,
        registry: Arc<ExtensionRegistry>,
        output: OutputSender,
        metrics: Arc<ScopeMetrics>,
    ) -> Self {
        Self::new(
            registry,
            output,
            metrics,
            DissectOptions::from_config(config),
            config.pipeline.segment_queue,
        )
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ExtensionRegistry> {
        &self.registry
    }

    /// Start dissecting a connection with the extension registered as
    /// `protocol`.
    ///
    /// Once both halves end, entries the connection left in the matcher
    /// are released and old orphan requests are emitted.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ScopeError::UnknownProtocol`] if no
    /// extension has that name.
    pub fn open_connection(
        &self,
        protocol: &str,
        tcp_id: TcpId,
        outgoing: bool,
        capture: CaptureSource,
    ) -> Result<ConnectionFeed> {
        let registered = self.registry.require(protocol)?.clone();
        let emitter = Emitter::new(
            Arc::clone(&registered.matcher),
            self.output.clone(),
            Arc::clone(&self.metrics),
        );

        let (client, client_stream) = half_stream(self.segment_queue);
        let (server, server_stream) = half_stream(self.segment_queue);
        let client_ctx = ReaderContext::new(
            tcp_id,
            Direction::Request,
            outgoing,
            capture,
            client_stream.clock(),
            emitter.clone(),
        );
        let server_ctx = ReaderContext::new(
            tcp_id,
            Direction::Response,
            outgoing,
            capture,
            server_stream.clock(),
            emitter,
        );

        let client_task = tokio::spawn(run_half(
            Arc::clone(&registered.extension),
            client_stream,
            client_ctx,
            Arc::clone(&self.options),
        ));
        let server_task = tokio::spawn(run_half(
            Arc::clone(&registered.extension),
            server_stream,
            server_ctx,
            Arc::clone(&self.options),
        ));

        let output = self.output.clone();
        let matcher = registered.matcher;
        let join = tokio::spawn(async move {
            let (client, server) = tokio::join!(client_task, server_task);
            let connection = tcp_id.connection_info(outgoing);
            let orphans = matcher.release_connection(&connection, SystemTime::now());
            let flushed = orphans.len();
            for item in orphans {
                if output.send(item).await.is_err() {
                    break;
                }
            }
            debug!(tcp = %tcp_id, flushed, "connection closed");
            ConnectionReport {
                client: client.ok(),
                server: server.ok(),
                flushed,
            }
        });

        Ok(ConnectionFeed { client, server, join })
    }
}
