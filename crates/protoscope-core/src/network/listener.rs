//! Inline TCP relay.
//!
//! The listener accepts clients, dials the configured upstream for each
//! one and copies bytes in both directions. A copy of every chunk is fed
//! to the tap so the connection is dissected as it flows.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use super::stream::{Segment, SegmentSender};
use super::tap::ScopeTap;
use crate::config::TapConfig;
use crate::error::{Result, ScopeError};
use crate::model::TcpId;

const READ_CHUNK: usize = 16 * 1024;

/// Relay listener for one configured tap.
pub struct TapListener {
    config: Arc<TapConfig>,
    tap: ScopeTap,
    shutdown_tx: broadcast::Sender<()>,
    active_connections: Arc<AtomicUsize>,
}

impl TapListener {
    #[must_use]
    pub fn new(config: TapConfig, tap: ScopeTap) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config: Arc::new(config),
            tap,
            shutdown_tx,
            active_connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Get a shutdown handle to signal the listener to stop.
    #[must_use]
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Bind the listen address and relay connections until shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails or the tap's protocol is unknown.
    #[instrument(skip(self), fields(protocol = %self.config.protocol, address = %self.config.listen))]
    pub async fn run(&self) -> Result<()> {
        self.tap.registry().require(&self.config.protocol)?;
        let listener = TcpListener::bind(&self.config.listen).await?;
        self.serve(listener).await
    }

    /// Relay connections accepted on an already bound listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's local address cannot be read.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!(
            address = %listener.local_addr()?,
            upstream = %self.config.upstream(),
            "tap listening"
        );
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((socket, peer)) => self.accept(socket, peer),
                        Err(e) => error!(error = %e, "accept error"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        let active = self.active_connections.load(Ordering::Relaxed);
        if active > 0 {
            info!(active, "connections still closing");
        }
        Ok(())
    }

    fn accept(&self, socket: TcpStream, peer: SocketAddr) {
        let current = self.active_connections.load(Ordering::Relaxed);
        if current >= self.config.max_connections {
            warn!(
                peer = %peer,
                active = current,
                max = self.config.max_connections,
                "connection rejected: limit reached"
            );
            return;
        }

        self.active_connections.fetch_add(1, Ordering::Relaxed);
        debug!(peer = %peer, active = current + 1, "accepted connection");

        let config = Arc::clone(&self.config);
        let tap = self.tap.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        let active_connections = Arc::clone(&self.active_connections);

        tokio::spawn(async move {
            if let Err(e) = relay(socket, peer, &config, &tap, shutdown_rx).await {
                match &e {
                    ScopeError::Shutdown => debug!(peer = %peer, "connection closed: shutdown"),
                    ScopeError::Connection(io_err)
                        if io_err.kind() == io::ErrorKind::UnexpectedEof =>
                    {
                        debug!(peer = %peer, "client disconnected");
                    }
                    _ => error!(peer = %peer, error = %e, "relay error"),
                }
            }
            active_connections.fetch_sub(1, Ordering::Relaxed);
        });
    }
}

#[instrument(skip_all, fields(peer = %peer))]
async fn relay(
    client: TcpStream,
    peer: SocketAddr,
    config: &TapConfig,
    tap: &ScopeTap,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let upstream = TcpStream::connect(config.upstream()).await?;
    let tcp_id = TcpId::new(peer, upstream.peer_addr()?);
    let feed = tap.open_connection(&config.protocol, tcp_id, config.outgoing, config.capture)?;
    debug!(tcp = %tcp_id, "relaying");

    let (client_read, client_write) = client.into_split();
    let (upstream_read, upstream_write) = upstream.into_split();

    let copied = tokio::select! {
        result = async {
            tokio::try_join!(
                pump(client_read, upstream_write, feed.client.clone()),
                pump(upstream_read, client_write, feed.server.clone()),
            )
        } => Some(result),
        _ = shutdown_rx.recv() => None,
    };

    let report = feed.finish().await;
    debug!(
        tcp = %tcp_id,
        flushed = report.flushed,
        client_tainted = report.client.as_ref().is_some_and(|r| r.is_tainted()),
        server_tainted = report.server.as_ref().is_some_and(|r| r.is_tainted()),
        "relay finished"
    );

    match copied {
        Some(Ok((up, down))) => {
            debug!(tcp = %tcp_id, up, down, "connection closed");
            Ok(())
        }
        Some(Err(e)) => Err(e.into()),
        None => Err(ScopeError::Shutdown),
    }
}

/// Copy `reader` to `writer` until EOF, teeing every chunk into `tap`.
async fn pump<R, W>(mut reader: R, mut writer: W, tap: SegmentSender) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    let mut total = 0u64;
    loop {
        buf.reserve(READ_CHUNK);
        let n = match reader.read_buf(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                let _ = tap.send(Err(io::Error::new(e.kind(), e.to_string()))).await;
                return Err(e);
            }
        };
        if n == 0 {
            writer.shutdown().await?;
            return Ok(total);
        }

        let chunk = buf.split().freeze();
        writer.write_all(&chunk).await?;
        total += n as u64;
        // a closed tap only stops dissection, never the relay
        let _ = tap.send(Ok(Segment::now(chunk))).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MatcherConfig, TapConfig};
    use crate::extension::DissectOptions;
    use crate::metrics::ScopeMetrics;
    use crate::model::CaptureSource;
    use crate::pipeline::output_channel;
    use crate::registry::ExtensionRegistry;
    use std::time::Duration;
    use tokio::time::timeout;

    fn tap() -> ScopeTap {
        let metrics = Arc::new(ScopeMetrics::new());
        let registry = Arc::new(ExtensionRegistry::with_defaults(&MatcherConfig::default(), &metrics));
        let (tx, _rx) = output_channel(16);
        ScopeTap::new(registry, tx, metrics, DissectOptions::default(), 16)
    }

    fn tap_config(protocol: &str, upstream: String) -> TapConfig {
        TapConfig {
            protocol: protocol.to_string(),
            listen: "127.0.0.1:0".to_string(),
            upstream,
            outgoing: false,
            capture: CaptureSource::Pcap,
            max_connections: 4,
        }
    }

    #[tokio::test]
    async fn test_run_rejects_unknown_protocol() {
        let listener = TapListener::new(tap_config("http", "127.0.0.1:1".into()), tap());
        let err = listener.run().await.unwrap_err();
        assert!(matches!(err, ScopeError::UnknownProtocol(name) if name == "http"));
    }

    #[tokio::test]
    async fn test_listener_shutdown() {
        let listener = TapListener::new(tap_config("kafka", "127.0.0.1:1".into()), tap());
        let shutdown_handle = listener.shutdown_handle();
        let bound = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let task = tokio::spawn(async move { listener.serve(bound).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = shutdown_handle.send(());

        let result = timeout(Duration::from_secs(1), task).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_pump_tees_bytes() {
        let (tap_tx, mut tap_rx) = tokio::sync::mpsc::channel(4);
        let reader: &[u8] = b"payload";
        let mut written = Vec::new();

        let total = pump(reader, &mut written, tap_tx).await.unwrap();
        assert_eq!(total, 7);
        assert_eq!(written, b"payload");
        let segment = tap_rx.recv().await.unwrap().unwrap();
        assert_eq!(&segment.data[..], b"payload");
    }
}
