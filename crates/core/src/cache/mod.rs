//! SQLite-backed versioned response stores.
//!
//! All stores live in one database file; a store is the set of entries
//! sharing a version tag. This module provides:
//!
//! - Content-addressed row keys using SHA-256 over `(method, url)`
//! - Automatic schema migrations
//! - WAL mode for concurrent readers alongside the writer thread
//! - Structural deletion of superseded stores

pub mod connection;
pub mod hash;
pub mod migrations;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use store::{ResponseStore, StoreCatalog, StoreStats, VersionedStore};
