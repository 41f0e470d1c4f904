//! Emission pipeline.
//!
//! Dissector tasks push [`OutputItem`]s into a bounded channel; a full
//! channel suspends them, which pushes back into the byte readers. The
//! [`EmissionPipeline`] drains the channel, drops outgoing traffic whose
//! server is a known internal service, and hands the rest to every sink.
//!
//! Items already queued together are written in
//! [`OutputItem::ordering_key`] order. Items that arrive after a batch has
//! been written are not reordered against it, so the total order holds
//! within a batch and each connection stays in arrival order.

pub mod sink;

pub use sink::{BroadcastSink, EntrySink, OutputSink};

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Result, ScopeError};
use crate::metrics::ScopeMetrics;
use crate::model::OutputItem;

/// Most items taken from the channel and ordered as one batch.
pub const MAX_BATCH: usize = 256;

/// Create the bounded emission channel.
#[must_use]
pub fn output_channel(capacity: usize) -> (OutputSender, OutputReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (OutputSender { tx }, OutputReceiver { rx })
}

/// Producer side of the emission channel, cloned into every dissector task.
#[derive(Debug, Clone)]
pub struct OutputSender {
    tx: mpsc::Sender<OutputItem>,
}

impl OutputSender {
    /// Enqueue an item, waiting while the channel is full.
    ///
    /// # Errors
    ///
    /// Returns [`ScopeError::ChannelClosed`] if the pipeline has stopped.
    pub async fn send(&self, item: OutputItem) -> Result<()> {
        self.tx.send(item).await.map_err(|_| ScopeError::ChannelClosed)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Free slots left in the channel.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.tx.capacity()
    }
}

/// Consumer side of the emission channel.
#[derive(Debug)]
pub struct OutputReceiver {
    rx: mpsc::Receiver<OutputItem>,
}

impl OutputReceiver {
    /// Next item, or `None` once every sender is gone and the channel is drained.
    pub async fn recv(&mut self) -> Option<OutputItem> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<OutputItem> {
        self.rx.try_recv().ok()
    }
}

/// Addresses of internal services. Outgoing items towards them are not
/// emitted.
///
/// Readers take a snapshot; updates swap in a new set, so the filter
/// stage never waits on a writer.
#[derive(Debug, Clone, Default)]
pub struct KnownServiceIps {
    current: Arc<RwLock<Arc<HashSet<IpAddr>>>>,
}

impl KnownServiceIps {
    #[must_use]
    pub fn new(ips: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(ips.into_iter().collect()))),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<HashSet<IpAddr>> {
        Arc::clone(&self.current.read())
    }

    #[must_use]
    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.current.read().contains(ip)
    }

    /// Replace the whole set.
    pub fn replace(&self, ips: impl IntoIterator<Item = IpAddr>) {
        *self.current.write() = Arc::new(ips.into_iter().collect());
    }

    pub fn insert(&self, ip: IpAddr) {
        let mut current = self.current.write();
        let mut next = HashSet::clone(&current);
        next.insert(ip);
        *current = Arc::new(next);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }
}

/// Whether the filter stage drops `item`.
#[must_use]
pub fn is_filtered(item: &OutputItem, known: &HashSet<IpAddr>) -> bool {
    item.connection.is_outgoing && known.contains(&item.connection.server_ip)
}

/// Counts reported when the pipeline stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub received: u64,
    pub filtered: u64,
    pub emitted: u64,
    pub sink_errors: u64,
}

/// Filter stage plus fan-out to sinks.
pub struct EmissionPipeline {
    input: OutputReceiver,
    known_ips: KnownServiceIps,
    sinks: Vec<Box<dyn OutputSink>>,
    metrics: Arc<ScopeMetrics>,
}

impl EmissionPipeline {
    #[must_use]
    pub fn new(input: OutputReceiver, known_ips: KnownServiceIps, metrics: Arc<ScopeMetrics>) -> Self {
        Self {
            input,
            known_ips,
            sinks: Vec::new(),
            metrics,
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: impl OutputSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Drain the channel until every sender is dropped, then flush the sinks.
    ///
    /// Each wakeup takes every queued item, up to [`MAX_BATCH`], and writes
    /// them sorted by [`OutputItem::ordering_key`]. The sort is stable, so
    /// items with equal keys keep their arrival order.
    ///
    /// A failing sink is logged and skipped for that item; it does not stop
    /// the pipeline.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while flushing.
    pub async fn run(mut self) -> Result<PipelineStats> {
        info!(sinks = self.sinks.len(), known_ips = self.known_ips.len(), "emission pipeline started");
        let mut stats = PipelineStats::default();

        let mut batch = Vec::with_capacity(MAX_BATCH);
        while let Some(first) = self.input.recv().await {
            batch.push(first);
            while batch.len() < MAX_BATCH {
                match self.input.try_recv() {
                    Some(item) => batch.push(item),
                    None => break,
                }
            }
            batch.sort_by_key(OutputItem::ordering_key);

            let known = self.known_ips.snapshot();
            for item in batch.drain(..) {
                stats.received += 1;
                if is_filtered(&item, &known) {
                    debug!(server = %item.connection.server_ip, "dropping item for known service");
                    self.metrics.record_filtered();
                    stats.filtered += 1;
                    continue;
                }

                for sink in &mut self.sinks {
                    if let Err(e) = sink.write(&item).await {
                        warn!(sink = sink.name(), error = %e, "sink write failed");
                        stats.sink_errors += 1;
                    }
                }
                stats.emitted += 1;
            }
        }

        for sink in &mut self.sinks {
            sink.flush().await?;
        }
        info!(
            received = stats.received,
            filtered = stats.filtered,
            emitted = stats.emitted,
            "emission pipeline stopped"
        );
        Ok(stats)
    }
}
