//! MCP tool implementations.
//!
//! This module contains all tools exposed by the offcache server.

pub mod fetch;
pub mod lifecycle;
pub mod status;
pub mod sync;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

pub use fetch::{ResourceFetchOutput, ResourceFetchParams, fetch_impl};
pub use lifecycle::{activate_impl, install_impl};
pub use status::status_impl;
pub use sync::{BackgroundSyncParams, sync_impl};

/// Render a tool output as pretty JSON text content.
fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| offcache_core::Error::Serialization(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
