//! A sink that keeps everything it receives.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::Result;
use crate::model::OutputItem;
use crate::pipeline::OutputSink;

/// Records items in arrival order. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    items: Arc<Mutex<Vec<OutputItem>>>,
    arrived: Arc<Notify>,
}

impl CollectingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn items(&self) -> Vec<OutputItem> {
        self.items.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Wait until at least `count` items arrived or `timeout` passed, then
    /// return what is there.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<OutputItem> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.arrived.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.len() >= count {
                return self.items();
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.items();
            }
        }
    }
}

#[async_trait]
impl OutputSink for CollectingSink {
    fn name(&self) -> &'static str {
        "collecting"
    }

    async fn write(&mut self, item: &OutputItem) -> Result<()> {
        self.items.lock().push(item.clone());
        self.arrived.notify_waiters();
        Ok(())
    }
}
