//! Detached store writes.
//!
//! Populating the store is a side effect of answering a request, so writes
//! run as tasks the response path never joins. A failed write is logged and
//! dropped here and goes no further.

use std::sync::{Arc, Mutex, PoisonError};

use offcache_core::{ResponseSnapshot, ResponseStore, StoreKey};
use tokio::task::JoinSet;

#[derive(Debug, Default)]
struct Pending {
    tasks: JoinSet<()>,
    closed: bool,
}

/// Owner of in-flight detached writes.
#[derive(Debug, Default)]
pub struct WriteBoundary {
    pending: Mutex<Pending>,
}

impl WriteBoundary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start writing `snapshot` under `key` without waiting for it.
    ///
    /// Must be called from within a tokio runtime. Ignored once closed.
    pub fn detach(&self, store: Arc<dyn ResponseStore>, key: StoreKey, snapshot: ResponseSnapshot) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.closed {
            tracing::debug!(url = %key.url, "write boundary closed, skipping store write");
            return;
        }

        while pending.tasks.try_join_next().is_some() {}

        pending.tasks.spawn(async move {
            match store.put(&key, &snapshot).await {
                Ok(()) => tracing::debug!(tag = store.tag(), url = %key.url, "stored snapshot"),
                Err(e) => tracing::warn!(tag = store.tag(), url = %key.url, error = %e, "discarding failed store write"),
            }
        });
    }

    /// Number of writes not yet reaped.
    pub fn in_flight(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).tasks.len()
    }

    /// Wait until every detached write has finished.
    ///
    /// Returns the number of writes awaited.
    pub async fn settle(&self) -> usize {
        let mut settled = 0;
        loop {
            let mut batch = self.take();
            if batch.is_empty() {
                return settled;
            }
            while let Some(result) = batch.join_next().await {
                if let Err(e) = result
                    && e.is_panic()
                {
                    tracing::warn!(error = %e, "store write task panicked");
                }
                settled += 1;
            }
        }
    }

    /// Refuse further writes and abort those still running.
    ///
    /// A write whose statement already reached the connection thread may
    /// still commit; pair this with [`ResponseStore::barrier`] to wait it out.
    pub async fn close(&self) {
        let mut aborted = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending.closed = true;
            std::mem::take(&mut pending.tasks)
        };
        let count = aborted.len();
        aborted.shutdown().await;
        if count > 0 {
            tracing::info!(count, "aborted in-flight store writes");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).closed
    }

    fn take(&self) -> JoinSet<()> {
        std::mem::take(&mut self.pending.lock().unwrap_or_else(PoisonError::into_inner).tasks)
    }
}
