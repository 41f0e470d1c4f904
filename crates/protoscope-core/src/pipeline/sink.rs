//! Consumers at the end of the emission pipeline.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::broadcast;

use crate::error::{Result, ScopeError};
use crate::model::OutputItem;
use crate::registry::ExtensionRegistry;

/// Destination for emitted items.
#[async_trait]
pub trait OutputSink: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Deliver one item.
    ///
    /// # Errors
    ///
    /// Returns an error if the item could not be delivered.
    async fn write(&mut self, item: &OutputItem) -> Result<()>;

    /// Flush buffered output.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying writer fails.
    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes analyzed entries as JSON lines.
pub struct EntrySink<W> {
    writer: BufWriter<W>,
    registry: Arc<ExtensionRegistry>,
    written: u64,
}

impl<W: AsyncWrite + Unpin + Send> EntrySink<W> {
    #[must_use]
    pub fn new(writer: W, registry: Arc<ExtensionRegistry>) -> Self {
        Self {
            writer: BufWriter::new(writer),
            registry,
            written: 0,
        }
    }

    /// Entries written so far.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }

    #[must_use]
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> OutputSink for EntrySink<W> {
    fn name(&self) -> &'static str {
        "entries"
    }

    async fn write(&mut self, item: &OutputItem) -> Result<()> {
        let entry = self
            .registry
            .analyze(item)
            .ok_or_else(|| ScopeError::UnknownProtocol(item.protocol.name.to_string()))?;
        let mut line = serde_json::to_vec(&entry).map_err(io::Error::from)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.written += 1;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await?;
        Ok(())
    }
}

/// Fans items out to live subscribers.
///
/// Items are dropped when nobody is subscribed; slow subscribers see a
/// lag error rather than holding up the pipeline.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<Arc<OutputItem>>,
}

impl BroadcastSink {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<OutputItem>> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn subscribers(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl OutputSink for BroadcastSink {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    async fn write(&mut self, item: &OutputItem) -> Result<()> {
        let _ = self.tx.send(Arc::new(item.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatcherConfig;
    use crate::kafka::{ApiKey, KafkaMessage, Struct, KAFKA_PROTOCOL};
    use crate::metrics::ScopeMetrics;
    use crate::model::{CaptureSource, Direction, GenericMessage, MessagePayload, TcpId};
    use std::time::{Duration, UNIX_EPOCH};

    fn item() -> OutputItem {
        let conn = TcpId::new(
            "10.0.0.1:40000".parse().unwrap(),
            "10.0.0.2:9092".parse().unwrap(),
        )
        .connection_info(false);
        let request = GenericMessage::new(
            Direction::Request,
            UNIX_EPOCH + Duration::from_millis(5_000),
            20,
            MessagePayload::Kafka(KafkaMessage::request(ApiKey::ApiVersions, 3, 1, Some("cli"), Struct::new())),
        );
        OutputItem::new(
            &KAFKA_PROTOCOL,
            conn,
            request,
            GenericMessage::empty(Direction::Response),
            CaptureSource::Pcap,
        )
    }

    #[tokio::test]
    async fn test_entry_sink_writes_json_lines() {
        let registry = Arc::new(ExtensionRegistry::with_defaults(
            &MatcherConfig::default(),
            &Arc::new(ScopeMetrics::new()),
        ));
        let mut sink = EntrySink::new(Vec::new(), registry);
        sink.write(&item()).await.unwrap();
        sink.write(&item()).await.unwrap();
        sink.flush().await.unwrap();
        assert_eq!(sink.written(), 2);

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let entry: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(entry["method"], "ApiVersions");
        assert_eq!(entry["summary"], "cli");
        assert_eq!(entry["protocol"]["name"], "kafka");
        assert_eq!(entry["timestamp"], 5_000);
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers() {
        let mut sink = BroadcastSink::new(4);
        assert_eq!(sink.subscribers(), 0);
        assert!(sink.write(&item()).await.is_ok());

        let mut rx = sink.subscribe();
        sink.write(&item()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().timestamp, 5_000);
    }
}
