//! Background eviction of expired matcher entries.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::RequestResponseMatcher;
use crate::pipeline::OutputSender;

/// Periodically evicts expired entries from every matcher and forwards
/// orphan requests to the output channel.
pub struct OrphanSweeper {
    matchers: Vec<Arc<RequestResponseMatcher>>,
    output: OutputSender,
    interval: Duration,
    shutdown_rx: watch::Receiver<bool>,
}

impl OrphanSweeper {
    #[must_use]
    pub fn new(
        matchers: Vec<Arc<RequestResponseMatcher>>,
        output: OutputSender,
        interval: Duration,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            matchers,
            output,
            interval,
            shutdown_rx,
        }
    }

    /// Run until a shutdown signal is received or the output channel closes.
    pub async fn run(mut self) {
        if self.interval.is_zero() {
            info!("orphan sweep disabled (interval=0)");
            return;
        }

        info!(
            interval_ms = self.interval.as_millis() as u64,
            matchers = self.matchers.len(),
            "starting orphan sweeper"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if !self.sweep(SystemTime::now()).await {
                        warn!("output channel closed, stopping orphan sweeper");
                        break;
                    }
                }
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("orphan sweeper shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Evict once at `now`. Returns `false` if the output channel is closed.
    pub async fn sweep(&self, now: SystemTime) -> bool {
        for matcher in &self.matchers {
            let items = matcher.evict_expired(now);
            if items.is_empty() {
                continue;
            }
            debug!(
                protocol = matcher.protocol().name,
                orphans = items.len(),
                pending = matcher.pending_len(),
                "evicted expired entries"
            );
            for item in items {
                if self.output.send(item).await.is_err() {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatcherConfig;
    use crate::kafka::KAFKA_PROTOCOL;
    use crate::metrics::ScopeMetrics;
    use crate::model::{CaptureSource, Direction, GenericMessage, MessagePayload, TcpId};
    use crate::pipeline::output_channel;
    use std::time::UNIX_EPOCH;

    fn matcher() -> Arc<RequestResponseMatcher> {
        Arc::new(RequestResponseMatcher::new(
            &KAFKA_PROTOCOL,
            MatcherConfig::default(),
            Arc::new(ScopeMetrics::new()),
        ))
    }

    #[tokio::test]
    async fn test_sweep_forwards_orphans() {
        let m = matcher();
        let conn = TcpId::new(
            "10.0.0.1:40000".parse().unwrap(),
            "10.0.0.2:9092".parse().unwrap(),
        )
        .connection_info(false);
        let request = GenericMessage::new(
            Direction::Request,
            UNIX_EPOCH + Duration::from_secs(1),
            16,
            MessagePayload::Empty,
        );
        m.register(Direction::Request, "k".into(), request, &conn, CaptureSource::Pcap);

        let (tx, mut rx) = output_channel(4);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweeper = OrphanSweeper::new(vec![Arc::clone(&m)], tx, Duration::from_secs(1), shutdown_rx);

        assert!(sweeper.sweep(UNIX_EPOCH + Duration::from_secs(10)).await);
        assert_eq!(m.pending_len(), 1);

        assert!(sweeper.sweep(UNIX_EPOCH + Duration::from_secs(60)).await);
        let item = rx.recv().await.unwrap();
        assert_eq!(item.timestamp, 1_000);
        assert!(item.pair.response.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_when_interval_zero() {
        let (tx, _rx) = output_channel(1);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweeper = OrphanSweeper::new(vec![matcher()], tx, Duration::ZERO, shutdown_rx);

        let result = tokio::time::timeout(Duration::from_millis(100), sweeper.run()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_stops_on_shutdown() {
        let (tx, _rx) = output_channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweeper = OrphanSweeper::new(vec![matcher()], tx, Duration::from_millis(10), shutdown_rx);

        let task = tokio::spawn(sweeper.run());
        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown_tx.send(true).unwrap();
        assert!(tokio::time::timeout(Duration::from_secs(1), task).await.is_ok());
    }
}
