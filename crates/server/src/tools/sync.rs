//! background_sync tool implementation.
//!
//! Replays the writes queued under one sync tag.

use offcache_client::{EventOutcome, LifecycleController, LifecycleEvent};
use offcache_core::Error;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Parameters for the background_sync tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BackgroundSyncParams {
    /// Sync tag whose queued tasks should be drained.
    pub tag: String,
}

/// Implementation of the background_sync tool.
pub async fn sync_impl(controller: &LifecycleController, params: BackgroundSyncParams) -> Result<CallToolResult, McpError> {
    let tag = params.tag.trim();
    if tag.is_empty() {
        return Err(Error::InvalidInput("tag cannot be empty".into()).into());
    }

    match controller.dispatch(LifecycleEvent::Sync { tag: tag.to_string() }).await? {
        EventOutcome::Synced(report) => json_result(&report),
        other => Err(McpError::internal_error(format!("sync produced {other:?}"), None)),
    }
}
