//! cache_status tool implementation.
//!
//! Reports the lifecycle phase, every store on disk and the retry queue.

use offcache_client::LifecycleController;
use rmcp::{ErrorData as McpError, model::CallToolResult};

use super::json_result;

/// Implementation of the cache_status tool.
pub async fn status_impl(controller: &LifecycleController) -> Result<CallToolResult, McpError> {
    let status = controller.status().await?;
    json_result(&status)
}
