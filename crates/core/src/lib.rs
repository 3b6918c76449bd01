//! Core types and shared functionality for offcache.
//!
//! This crate provides:
//! - Versioned response stores with a SQLite backend
//! - Request descriptors, responses and immutable snapshots
//! - The resource classifier that picks a caching strategy per request
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod request;
pub mod response;

pub use cache::{CacheDb, ResponseStore, StoreCatalog, StoreStats, VersionedStore};
pub use classify::{ResourceClassifier, Strategy};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use request::{RequestDescriptor, StoreKey};
pub use response::{Response, ResponseKind, ResponseSnapshot, ResponseSource};
