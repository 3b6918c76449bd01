//! Client side of offcache.
//!
//! This crate provides the network transport, the caching strategies and the
//! lifecycle controller that the MCP server drives.

pub mod fetch;
pub mod lifecycle;
pub mod strategy;

#[cfg(test)]
mod testing;

pub use fetch::{FetchClient, FetchConfig, Network};
pub use lifecycle::{
    ActivationReport, ControllerStatus, DetachedHost, EventKind, EventOutcome, HostSignals, InstallReport,
    LifecycleController, LifecycleEvent, ManifestFailure, Phase, RetryAction, RetryQueue, RetryTask, SyncReport,
    WorkerConfig,
};
pub use strategy::{StrategyExecutor, WriteBoundary};
