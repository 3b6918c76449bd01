//! Signals sent back to the host runtime at phase boundaries.

use async_trait::async_trait;

/// Host-side effects of the lifecycle.
#[async_trait]
pub trait HostSignals: Send + Sync {
    /// Provisioning settled; the host may retire the previous version now
    /// instead of waiting for its clients to close.
    async fn skip_waiting(&self);

    /// Route every open client through this version. Returns how many were claimed.
    async fn claim_clients(&self) -> usize;
}

/// Host with no clients of its own, for embedding and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedHost;

#[async_trait]
impl HostSignals for DetachedHost {
    async fn skip_waiting(&self) {
        tracing::debug!("skip-waiting requested with no host attached");
    }

    async fn claim_clients(&self) -> usize {
        0
    }
}
