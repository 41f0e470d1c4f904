//! Scripted Kafka server for relay tests.
//!
//! Accepts connections, records every request frame and answers with a
//! response chosen by api key.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, RwLock};

/// A request the upstream received.
#[derive(Debug, Clone)]
pub struct UpstreamCall {
    pub api_key: i16,
    pub api_version: i16,
    pub correlation_id: i32,
    /// The request frame without its length prefix.
    pub request_bytes: Bytes,
}

/// Builds the response body (without length prefix) for a call.
pub type ResponseGenerator = Arc<dyn Fn(&UpstreamCall) -> Bytes + Send + Sync>;

/// Kafka-framed mock server.
pub struct MockUpstream {
    address: String,
    shutdown_tx: Option<broadcast::Sender<()>>,
    calls: Arc<RwLock<Vec<UpstreamCall>>>,
    handlers: Arc<RwLock<HashMap<i16, ResponseGenerator>>>,
}

impl MockUpstream {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            shutdown_tx: None,
            calls: Arc::new(RwLock::new(Vec::new())),
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Bind and start serving. Returns the bound address.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails.
    pub async fn start(&mut self) -> std::io::Result<String> {
        let listener = TcpListener::bind(&self.address).await?;
        let bound = listener.local_addr()?.to_string();
        self.address.clone_from(&bound);

        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx.clone());
        let calls = Arc::clone(&self.calls);
        let handlers = Arc::clone(&self.handlers);
        let mut shutdown_rx = shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    result = listener.accept() => {
                        let Ok((stream, _)) = result else { break };
                        let calls = Arc::clone(&calls);
                        let handlers = Arc::clone(&handlers);
                        let shutdown_rx = shutdown_tx.subscribe();
                        tokio::spawn(Self::serve(stream, calls, handlers, shutdown_rx));
                    }
                }
            }
        });

        Ok(bound)
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Answer requests with `api_key` using `handler`.
    pub async fn register_handler(&self, api_key: i16, handler: ResponseGenerator) {
        self.handlers.write().await.insert(api_key, handler);
    }

    pub async fn calls(&self) -> Vec<UpstreamCall> {
        self.calls.read().await.clone()
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    async fn serve(
        mut stream: TcpStream,
        calls: Arc<RwLock<Vec<UpstreamCall>>>,
        handlers: Arc<RwLock<HashMap<i16, ResponseGenerator>>>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                result = Self::read_frame(&mut stream) => {
                    let Ok(Some(frame)) = result else { break };
                    if frame.len() < 8 {
                        continue;
                    }
                    let call = UpstreamCall {
                        api_key: i16::from_be_bytes([frame[0], frame[1]]),
                        api_version: i16::from_be_bytes([frame[2], frame[3]]),
                        correlation_id: i32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]),
                        request_bytes: frame,
                    };
                    calls.write().await.push(call.clone());

                    let response = match handlers.read().await.get(&call.api_key) {
                        Some(handler) => handler(&call),
                        None => Bytes::copy_from_slice(&call.correlation_id.to_be_bytes()),
                    };
                    if Self::write_frame(&mut stream, &response).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    async fn read_frame(stream: &mut TcpStream) -> std::io::Result<Option<Bytes>> {
        let mut len_buf = [0u8; 4];
        match stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }
        let mut buf = vec![0u8; u32::from_be_bytes(len_buf) as usize];
        stream.read_exact(&mut buf).await?;
        Ok(Some(Bytes::from(buf)))
    }

    async fn write_frame(stream: &mut TcpStream, body: &[u8]) -> std::io::Result<()> {
        let mut buf = BytesMut::with_capacity(4 + body.len());
        buf.put_u32(body.len() as u32);
        buf.put_slice(body);
        stream.write_all(&buf).await?;
        stream.flush().await
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.stop();
    }
}
