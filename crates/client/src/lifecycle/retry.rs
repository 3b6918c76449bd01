//! Background-sync retry queue.
//!
//! A task stays queued until its action succeeds. Draining a tag runs each
//! matching task once; there is no backoff here, pacing belongs to the
//! action or to whoever sends sync triggers.

use std::sync::Arc;

use async_trait::async_trait;
use offcache_core::{Error, RequestDescriptor};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::fetch::Network;

/// An idempotent action re-attempted on every sync trigger until it succeeds.
#[async_trait]
pub trait RetryAction: Send + Sync {
    /// Short label for logs and status output.
    fn describe(&self) -> String;

    async fn run(&self) -> Result<(), Error>;
}

/// A queued action and the sync tag that drains it.
#[derive(Clone)]
pub struct RetryTask {
    tag: String,
    action: Arc<dyn RetryAction>,
}

impl RetryTask {
    pub fn new(tag: impl Into<String>, action: Arc<dyn RetryAction>) -> Self {
        Self { tag: tag.into(), action }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn describe(&self) -> String {
        self.action.describe()
    }
}

impl std::fmt::Debug for RetryTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryTask")
            .field("tag", &self.tag)
            .field("action", &self.action.describe())
            .finish()
    }
}

/// Queued task as reported to hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct PendingRetry {
    pub tag: String,
    pub action: String,
}

/// One task that failed during a drain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct RetryFailure {
    pub action: String,
    pub error: String,
}

/// Aggregate outcome of draining one tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SyncReport {
    pub tag: String,
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<RetryFailure>,
    /// Tasks still queued under this tag after the drain.
    pub remaining: usize,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// FIFO of retry tasks across all tags.
#[derive(Debug, Default)]
pub struct RetryQueue {
    tasks: Mutex<Vec<RetryTask>>,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enqueue(&self, task: RetryTask) {
        tracing::debug!(tag = task.tag(), action = %task.describe(), "queued retry task");
        self.tasks.lock().await.push(task);
    }

    pub async fn pending(&self) -> Vec<PendingRetry> {
        self.tasks
            .lock()
            .await
            .iter()
            .map(|t| PendingRetry { tag: t.tag.clone(), action: t.describe() })
            .collect()
    }

    /// Run every task queued under `tag` once.
    ///
    /// Matching tasks are taken out before running so concurrent enqueues
    /// and drains of other tags are not blocked; failures go back on the queue.
    pub async fn drain(&self, tag: &str) -> SyncReport {
        let batch: Vec<RetryTask> = {
            let mut tasks = self.tasks.lock().await;
            let (matching, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut *tasks).into_iter().partition(|t| t.tag == tag);
            *tasks = rest;
            matching
        };

        let attempted = batch.len();
        let mut failures = Vec::new();
        let mut requeue = Vec::new();

        for task in batch {
            match task.action.run().await {
                Ok(()) => tracing::debug!(tag, action = %task.describe(), "retry task succeeded"),
                Err(e) => {
                    tracing::debug!(tag, action = %task.describe(), error = %e, "retry task failed, keeping it");
                    failures.push(RetryFailure { action: task.describe(), error: e.to_string() });
                    requeue.push(task);
                }
            }
        }

        let mut tasks = self.tasks.lock().await;
        tasks.extend(requeue);
        let remaining = tasks.iter().filter(|t| t.tag == tag).count();

        SyncReport { tag: tag.to_string(), attempted, succeeded: attempted - failures.len(), failures, remaining }
    }
}

/// Replays a write that failed while offline.
pub struct ReplayRequest {
    network: Arc<dyn Network>,
    request: RequestDescriptor,
}

impl ReplayRequest {
    pub fn new(network: Arc<dyn Network>, request: RequestDescriptor) -> Self {
        Self { network, request }
    }
}

#[async_trait]
impl RetryAction for ReplayRequest {
    fn describe(&self) -> String {
        format!("{} {}", self.request.method, self.request.url)
    }

    async fn run(&self) -> Result<(), Error> {
        let response = self.network.fetch(&self.request).await?;
        if response.is_success() {
            Ok(())
        } else {
            Err(Error::HttpError(format!("status {}", response.status)))
        }
    }
}
