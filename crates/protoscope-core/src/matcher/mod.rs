//! Request/response correlation.
//!
//! A [`RequestResponseMatcher`] holds at most one pending message per
//! correlation key. The first side to arrive is stored; the second side
//! removes it under the same shard lock and the pair is emitted. Every
//! extension owns one matcher shared by all of its dissector tasks.

mod sweeper;

pub use sweeper::OrphanSweeper;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::config::MatcherConfig;
use crate::error::ErrorKind;
use crate::metrics::ScopeMetrics;
use crate::model::{CaptureSource, ConnectionInfo, Direction, GenericMessage, OutputItem, ProtocolDescriptor};

/// A message waiting for its counterpart.
#[derive(Debug, Clone)]
struct PendingEntry {
    message: GenericMessage,
    connection: ConnectionInfo,
    capture: CaptureSource,
}

impl PendingEntry {
    fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.message.capture_time)
            .unwrap_or(Duration::ZERO)
    }
}

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    responses: AtomicU64,
    pairs: AtomicU64,
    orphans: AtomicU64,
    dropped: AtomicU64,
}

/// Snapshot of matcher accounting.
///
/// Every message handed to the matcher ends up in exactly one bucket, so
/// `requests + responses == 2 * pairs + orphans + dropped + pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatcherStats {
    pub requests: u64,
    pub responses: u64,
    pub pairs: u64,
    pub orphans: u64,
    pub dropped: u64,
    pub pending: u64,
}

impl MatcherStats {
    /// Whether the accounting identity holds.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.requests + self.responses == 2 * self.pairs + self.orphans + self.dropped + self.pending
    }
}

/// Concurrent correlation store for one protocol.
#[derive(Debug)]
pub struct RequestResponseMatcher {
    protocol: &'static ProtocolDescriptor,
    config: MatcherConfig,
    pending: DashMap<String, PendingEntry>,
    inserted: Notify,
    counters: Counters,
    metrics: Arc<ScopeMetrics>,
}

impl RequestResponseMatcher {
    #[must_use]
    pub fn new(
        protocol: &'static ProtocolDescriptor,
        config: MatcherConfig,
        metrics: Arc<ScopeMetrics>,
    ) -> Self {
        Self {
            protocol,
            config,
            pending: DashMap::new(),
            inserted: Notify::new(),
            counters: Counters::default(),
            metrics,
        }
    }

    #[must_use]
    pub fn protocol(&self) -> &'static ProtocolDescriptor {
        self.protocol
    }

    #[must_use]
    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Offer a decoded message under `key`.
    ///
    /// If the opposite side is pending it is removed and the pair is
    /// returned. Otherwise the message is stored; a pending message of
    /// the same direction is overwritten and counted as dropped.
    pub fn register(
        &self,
        direction: Direction,
        key: String,
        message: GenericMessage,
        connection: &ConnectionInfo,
        capture: CaptureSource,
    ) -> Option<OutputItem> {
        self.count_arrival(direction);

        let stored = PendingEntry {
            message,
            connection: connection.clone(),
            capture,
        };

        match self.pending.entry(key) {
            Entry::Occupied(mut occupied) if occupied.get().message.direction == direction => {
                warn!(
                    protocol = self.protocol.name,
                    key = %occupied.key(),
                    %direction,
                    "overwriting unmatched message"
                );
                occupied.insert(stored);
                drop(occupied);
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                self.metrics
                    .record_error(self.protocol.name, direction, ErrorKind::MatchTimeout);
                self.inserted.notify_waiters();
                None
            }
            Entry::Occupied(occupied) => {
                let (key, counterpart) = occupied.remove_entry();
                let (request, response) = match direction {
                    Direction::Request => (stored.message, counterpart.message),
                    Direction::Response => (counterpart.message, stored.message),
                };
                let item = OutputItem::new(
                    self.protocol,
                    counterpart.connection,
                    request,
                    response,
                    counterpart.capture,
                );
                self.counters.pairs.fetch_add(1, Ordering::Relaxed);
                self.metrics
                    .record_pair(self.protocol.name, item.elapsed().as_secs_f64());
                debug!(protocol = self.protocol.name, key = %key, "pair emitted");
                Some(item)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(stored);
                self.inserted.notify_waiters();
                None
            }
        }
    }

    /// Wrap a self-contained message as a one-sided item.
    pub fn one_way(
        &self,
        message: GenericMessage,
        connection: &ConnectionInfo,
        capture: CaptureSource,
    ) -> OutputItem {
        let direction = message.direction;
        self.count_arrival(direction);
        self.counters.orphans.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_orphan(self.protocol.name);

        let (request, response) = match direction {
            Direction::Request => (message, GenericMessage::empty(Direction::Response)),
            Direction::Response => (GenericMessage::empty(Direction::Request), message),
        };
        OutputItem::new(self.protocol, connection.clone(), request, response, capture)
    }

    /// Wait until a request is pending under `key`, then project it with
    /// `extract`.
    ///
    /// Wakes on every insert instead of polling. Returns `None` once
    /// `timeout` has passed without a matching request.
    pub async fn wait_for_request<T>(
        &self,
        key: &str,
        timeout: Duration,
        extract: impl Fn(&GenericMessage) -> Option<T>,
    ) -> Option<T> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.inserted.notified();
            tokio::pin!(notified);
            // register interest before looking, so an insert in between is not lost
            notified.as_mut().enable();

            let found = self
                .pending
                .get(key)
                .filter(|entry| entry.message.is_request())
                .and_then(|entry| extract(&entry.message));
            if found.is_some() {
                return found;
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    /// Remove entries older than the retention window.
    ///
    /// Expired requests come back as one-sided items when orphan emission
    /// is enabled; everything else is dropped. Items are ordered by
    /// [`OutputItem::ordering_key`].
    pub fn evict_expired(&self, now: SystemTime) -> Vec<OutputItem> {
        let retention = self.config.orphan_retention();
        self.evict_where(now, |entry| entry.age(now) > retention, |entry| {
            entry.age(now) > retention
        })
    }

    /// Flush the entries of a closed connection.
    ///
    /// Requests past the retention window are emitted as orphans, the
    /// rest can no longer be answered and are released.
    pub fn release_connection(&self, connection: &ConnectionInfo, now: SystemTime) -> Vec<OutputItem> {
        let retention = self.config.orphan_retention();
        self.evict_where(
            now,
            |entry| &entry.connection == connection,
            |entry| entry.age(now) > retention,
        )
    }

    fn evict_where(
        &self,
        now: SystemTime,
        select: impl Fn(&PendingEntry) -> bool,
        expired: impl Fn(&PendingEntry) -> bool,
    ) -> Vec<OutputItem> {
        let keys: Vec<String> = self
            .pending
            .iter()
            .filter(|entry| select(entry.value()))
            .map(|entry| entry.key().clone())
            .collect();

        let mut items = Vec::new();
        for key in keys {
            // the entry may have been paired since the scan
            let Some((key, entry)) = self.pending.remove_if(&key, |_, entry| select(entry)) else {
                continue;
            };
            let direction = entry.message.direction;

            if entry.message.is_request() && self.config.emit_orphans && expired(&entry) {
                debug!(protocol = self.protocol.name, key = %key, "emitting orphan request");
                self.counters.orphans.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_orphan(self.protocol.name);
                self.metrics
                    .record_error(self.protocol.name, direction, ErrorKind::MatchTimeout);
                items.push(OutputItem::new(
                    self.protocol,
                    entry.connection,
                    entry.message,
                    GenericMessage::empty(Direction::Response),
                    entry.capture,
                ));
            } else {
                debug!(
                    protocol = self.protocol.name,
                    key = %key,
                    %direction,
                    age_ms = entry.age(now).as_millis() as u64,
                    "releasing unmatched message"
                );
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                if expired(&entry) {
                    self.metrics
                        .record_error(self.protocol.name, direction, ErrorKind::MatchTimeout);
                }
            }
        }

        items.sort_by_key(OutputItem::ordering_key);
        items
    }

    /// Number of messages waiting for a counterpart.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn stats(&self) -> MatcherStats {
        MatcherStats {
            requests: self.counters.requests.load(Ordering::Relaxed),
            responses: self.counters.responses.load(Ordering::Relaxed),
            pairs: self.counters.pairs.load(Ordering::Relaxed),
            orphans: self.counters.orphans.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            pending: self.pending.len() as u64,
        }
    }

    fn count_arrival(&self, direction: Direction) {
        let counter = match direction {
            Direction::Request => &self.counters.requests,
            Direction::Response => &self.counters.responses,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
