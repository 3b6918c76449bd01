//! Worker lifecycle: provision, cutover, intercept.
//!
//! The host drives every transition by dispatching a [`LifecycleEvent`]; the
//! controller never advances on its own.
//!
//! ```text
//! Idle --Install--> Provisioning --> Installed --Activate--> Activating --> Active
//!                                                  Active --Activate--> Activating --> Active
//! any --Terminate--> Terminated
//! ```
//!
//! Install and activate are awaited to completion by `dispatch`, which is
//! the only place the lifecycle holds itself back. Fetches are never blocked
//! by a transition: outside `Active` they go straight to the network.

pub mod host;
pub mod retry;

use std::sync::{Arc, PoisonError, RwLock};

use offcache_core::{
    AppConfig, ConfigError, Error, RequestDescriptor, ResourceClassifier, Response, ResponseSnapshot, ResponseStore,
    StoreCatalog, StoreKey, StoreStats, Strategy,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::fetch::Network;
use crate::strategy::StrategyExecutor;

pub use host::{DetachedHost, HostSignals};
pub use retry::{PendingRetry, ReplayRequest, RetryAction, RetryFailure, RetryQueue, RetryTask, SyncReport};

/// Lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Provisioning,
    Installed,
    Activating,
    Active,
    Terminated,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Provisioning => "provisioning",
            Phase::Installed => "installed",
            Phase::Activating => "activating",
            Phase::Active => "active",
            Phase::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Event kinds, without payloads, for the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Install,
    Activate,
    Fetch,
    Sync,
    Terminate,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventKind::Install => "install",
            EventKind::Activate => "activate",
            EventKind::Fetch => "fetch",
            EventKind::Sync => "sync",
            EventKind::Terminate => "terminate",
        };
        f.write_str(name)
    }
}

impl Phase {
    /// Transition table: whether `event` may be dispatched in this phase.
    pub fn accepts(self, event: EventKind) -> bool {
        match event {
            EventKind::Install => self == Phase::Idle,
            EventKind::Activate => matches!(self, Phase::Installed | Phase::Active),
            EventKind::Fetch | EventKind::Terminate => true,
            EventKind::Sync => self != Phase::Terminated,
        }
    }
}

/// Host runtime trigger.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Install,
    Activate,
    Fetch(RequestDescriptor),
    Sync { tag: String },
    Terminate,
}

impl LifecycleEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LifecycleEvent::Install => EventKind::Install,
            LifecycleEvent::Activate => EventKind::Activate,
            LifecycleEvent::Fetch(_) => EventKind::Fetch,
            LifecycleEvent::Sync { .. } => EventKind::Sync,
            LifecycleEvent::Terminate => EventKind::Terminate,
        }
    }
}

/// Result of a dispatched event.
#[derive(Debug, Clone)]
pub enum EventOutcome {
    Installed(InstallReport),
    Activated(ActivationReport),
    Response(Response),
    Synced(SyncReport),
    Terminated,
}

/// A manifest entry that could not be stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ManifestFailure {
    pub url: String,
    pub reason: String,
}

/// Outcome of provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct InstallReport {
    pub tag: String,
    /// Stored entries, in manifest order.
    pub cached: Vec<String>,
    /// Entries that failed, in manifest order.
    pub failed: Vec<ManifestFailure>,
}

/// Outcome of cutover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ActivationReport {
    pub tag: String,
    pub deleted: Vec<String>,
    /// Stale tags whose deletion failed; left in place.
    pub retained: Vec<String>,
    pub clients_claimed: usize,
}

/// Snapshot of controller state for hosts.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ControllerStatus {
    pub phase: Phase,
    pub version_tag: String,
    pub stores: Vec<StoreStats>,
    pub pending_retries: Vec<PendingRetry>,
}

/// Deployment-time inputs to the controller.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub version_tag: String,
    pub manifest: Vec<RequestDescriptor>,
    pub offline_fallback: Option<StoreKey>,
    pub classifier: ResourceClassifier,
    pub store_quota_bytes: Option<u64>,
}

impl WorkerConfig {
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            version_tag: config.version_tag.clone(),
            manifest: config.manifest_requests()?,
            offline_fallback: config.offline_fallback_key()?,
            classifier: config.classifier()?,
            store_quota_bytes: config.store_quota_bytes,
        })
    }
}

/// Owns the active store and routes host events through the transition table.
pub struct LifecycleController {
    config: WorkerConfig,
    catalog: Arc<dyn StoreCatalog>,
    network: Arc<dyn Network>,
    host: Arc<dyn HostSignals>,
    transition: Mutex<()>,
    phase: RwLock<Phase>,
    executor: RwLock<Option<Arc<StrategyExecutor>>>,
    retries: RetryQueue,
}

impl LifecycleController {
    pub fn new(
        config: WorkerConfig, catalog: Arc<dyn StoreCatalog>, network: Arc<dyn Network>, host: Arc<dyn HostSignals>,
    ) -> Self {
        Self {
            config,
            catalog,
            network,
            host,
            transition: Mutex::new(()),
            phase: RwLock::new(Phase::Idle),
            executor: RwLock::new(None),
            retries: RetryQueue::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn version_tag(&self) -> &str {
        &self.config.version_tag
    }

    pub fn retries(&self) -> &RetryQueue {
        &self.retries
    }

    fn set_phase(&self, next: Phase) {
        let mut phase = self.phase.write().unwrap_or_else(PoisonError::into_inner);
        tracing::info!(from = %*phase, to = %next, tag = %self.config.version_tag, "lifecycle transition");
        *phase = next;
    }

    fn executor(&self) -> Option<Arc<StrategyExecutor>> {
        self.executor.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn check(&self, event: EventKind) -> Result<Phase, Error> {
        let phase = self.phase();
        if phase.accepts(event) {
            Ok(phase)
        } else {
            Err(Error::InvalidTransition { phase: phase.to_string(), event: event.to_string() })
        }
    }

    /// Route one host event.
    pub async fn dispatch(&self, event: LifecycleEvent) -> Result<EventOutcome, Error> {
        match event {
            LifecycleEvent::Install => self.install().await.map(EventOutcome::Installed),
            LifecycleEvent::Activate => self.activate().await.map(EventOutcome::Activated),
            LifecycleEvent::Fetch(request) => self.intercept(&request).await.map(EventOutcome::Response),
            LifecycleEvent::Sync { tag } => self.sync(&tag).await.map(EventOutcome::Synced),
            LifecycleEvent::Terminate => {
                self.terminate().await;
                Ok(EventOutcome::Terminated)
            }
        }
    }

    /// Open the store for the current tag and fetch the manifest into it.
    ///
    /// Completes once every entry has settled, whether or not it succeeded.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        let _guard = self.transition.lock().await;
        self.check(EventKind::Install)?;
        self.set_phase(Phase::Provisioning);

        let store = match self
            .catalog
            .open(&self.config.version_tag, self.config.store_quota_bytes)
            .await
        {
            Ok(store) => store,
            Err(e) => {
                self.set_phase(Phase::Idle);
                return Err(e);
            }
        };

        let report = provision(self.network.clone(), store.clone(), &self.config.manifest).await;
        for failure in &report.failed {
            tracing::warn!(url = %failure.url, reason = %failure.reason, "manifest entry not cached");
        }

        let executor = StrategyExecutor::new(self.network.clone(), store, self.config.offline_fallback.clone());
        *self.executor.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(executor));

        self.set_phase(Phase::Installed);
        self.host.skip_waiting().await;

        Ok(report)
    }

    /// Delete every store but the current one, then claim open clients.
    pub async fn activate(&self) -> Result<ActivationReport, Error> {
        let _guard = self.transition.lock().await;
        self.check(EventKind::Activate)?;
        self.set_phase(Phase::Activating);

        let tags = self.catalog.tags().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "could not enumerate stores, skipping cutover");
            Vec::new()
        });

        let mut deleted = Vec::new();
        let mut retained = Vec::new();
        for tag in tags.into_iter().filter(|t| *t != self.config.version_tag) {
            match self.catalog.delete(&tag).await {
                Ok(_) => {
                    tracing::info!(tag = %tag, "deleted stale store");
                    deleted.push(tag);
                }
                Err(e) => {
                    tracing::warn!(tag = %tag, error = %e, "failed to delete stale store");
                    retained.push(tag);
                }
            }
        }

        let clients_claimed = self.host.claim_clients().await;
        self.set_phase(Phase::Active);

        Ok(ActivationReport { tag: self.config.version_tag.clone(), deleted, retained, clients_claimed })
    }

    /// Answer an intercepted request.
    ///
    /// # Errors
    ///
    /// Propagates the transport error where the chosen strategy does, and
    /// always when the request is passed through outside `Active`.
    pub async fn intercept(&self, request: &RequestDescriptor) -> Result<Response, Error> {
        let phase = self.phase();
        let executor = if phase == Phase::Active { self.executor() } else { None };
        let Some(executor) = executor else {
            tracing::debug!(phase = %phase, url = %request.url, "passing request through");
            return self.network.fetch(request).await;
        };

        let strategy = self.config.classifier.classify(request);
        tracing::debug!(%strategy, method = %request.method, url = %request.url, "intercepted");

        if strategy != Strategy::Bypass
            && !request.is_cacheable()
            && let Some(tag) = request.sync_tag.as_deref()
        {
            return self.deferrable_write(request, tag).await;
        }

        executor.execute(strategy, request).await
    }

    /// Send a write; if no response came back at all, queue it for the next
    /// sync trigger. Failures after the server answered are returned as is.
    async fn deferrable_write(&self, request: &RequestDescriptor, tag: &str) -> Result<Response, Error> {
        match self.network.fetch(request).await {
            Err(Error::Network(reason)) => {
                tracing::warn!(tag, url = %request.url, error = %reason, "write deferred to background sync");
                let action = ReplayRequest::new(self.network.clone(), request.clone());
                self.retries.enqueue(RetryTask::new(tag, Arc::new(action))).await;
                Ok(Response::unavailable("offline, queued for background sync"))
            }
            outcome => outcome,
        }
    }

    /// Drain retry tasks queued under `tag`.
    pub async fn sync(&self, tag: &str) -> Result<SyncReport, Error> {
        self.check(EventKind::Sync)?;
        let report = self.retries.drain(tag).await;
        if report.is_clean() {
            tracing::info!(tag, succeeded = report.succeeded, "background sync drained");
        } else {
            tracing::warn!(
                tag,
                succeeded = report.succeeded,
                failed = report.failures.len(),
                remaining = report.remaining,
                "background sync left tasks queued"
            );
        }
        Ok(report)
    }

    /// Stop all store mutation. Returns once no write can land any more.
    pub async fn terminate(&self) {
        let _guard = self.transition.lock().await;
        if self.phase() == Phase::Terminated {
            return;
        }
        if let Some(executor) = self.executor() {
            executor.shutdown().await;
        }
        self.set_phase(Phase::Terminated);
    }

    /// Wait for detached store writes started so far.
    pub async fn settle_writes(&self) -> usize {
        match self.executor() {
            Some(executor) => executor.writes().settle().await,
            None => 0,
        }
    }

    pub async fn status(&self) -> Result<ControllerStatus, Error> {
        Ok(ControllerStatus {
            phase: self.phase(),
            version_tag: self.config.version_tag.clone(),
            stores: self.catalog.stats().await?,
            pending_retries: self.retries.pending().await,
        })
    }
}

/// Fetch and store every manifest entry independently.
async fn provision(
    network: Arc<dyn Network>, store: Arc<dyn ResponseStore>, manifest: &[RequestDescriptor],
) -> InstallReport {
    let mut join_set = JoinSet::new();

    for (index, request) in manifest.iter().cloned().enumerate() {
        let network = network.clone();
        let store = store.clone();
        join_set.spawn(async move {
            let url = request.url.to_string();
            let result = fetch_and_store(network.as_ref(), store.as_ref(), &request).await;
            (index, url, result)
        });
    }

    let mut settled = Vec::with_capacity(manifest.len());
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(entry) => settled.push(entry),
            Err(e) => tracing::warn!(error = %e, "manifest task did not complete"),
        }
    }
    settled.sort_by_key(|(index, _, _)| *index);

    let mut report = InstallReport { tag: store.tag().to_string(), cached: Vec::new(), failed: Vec::new() };
    for (_, url, result) in settled {
        match result {
            Ok(()) => report.cached.push(url),
            Err(reason) => report.failed.push(ManifestFailure { url, reason }),
        }
    }
    report
}

async fn fetch_and_store(
    network: &dyn Network, store: &dyn ResponseStore, request: &RequestDescriptor,
) -> Result<(), String> {
    let key = request
        .store_key()
        .ok_or_else(|| format!("{} requests are not cacheable", request.method))?;
    let response = network.fetch(request).await.map_err(|e| e.to_string())?;
    if !response.is_storable() {
        return Err(format!("status {}", response.status));
    }
    store
        .put(&key, &ResponseSnapshot::capture(&response))
        .await
        .map_err(|e| e.to_string())
}
