//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the lifecycle controller.
use std::sync::Arc;

use crate::tools::{
    BackgroundSyncParams, ResourceFetchParams, activate_impl, fetch_impl, install_impl, status_impl, sync_impl,
};

use offcache_client::LifecycleController;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use url::Url;

/// The main MCP server handler for offcache.
#[derive(Clone)]
pub struct OffcacheServer {
    controller: Arc<LifecycleController>,
    app_origin: Url,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl OffcacheServer {
    /// Create a new server handler around a controller.
    pub fn new(controller: Arc<LifecycleController>, app_origin: Url) -> Self {
        Self { controller, app_origin, tool_router: Self::tool_router() }
    }

    #[tool(description = "Provision the current version's store by fetching the prefetch manifest. Failed entries are reported, not fatal.")]
    async fn lifecycle_install(&self) -> Result<CallToolResult, McpError> {
        install_impl(&self.controller).await
    }

    #[tool(description = "Activate the installed version: delete every store except the current one and claim open clients.")]
    async fn lifecycle_activate(&self) -> Result<CallToolResult, McpError> {
        activate_impl(&self.controller).await
    }

    /// Answer one request the way the worker would.
    ///
    /// The classifier picks a strategy from the URL; the answer reports whether
    /// it came from the network, the store, the offline document or was
    /// synthesized.
    #[tool(description = "Fetch a resource through the offline cache. Returns status, headers, body and the source of the answer.")]
    async fn resource_fetch(&self, params: Parameters<ResourceFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.controller, &self.app_origin, params.0).await
    }

    #[tool(description = "Replay writes queued while offline under a sync tag.")]
    async fn background_sync(&self, params: Parameters<BackgroundSyncParams>) -> Result<CallToolResult, McpError> {
        sync_impl(&self.controller, params.0).await
    }

    #[tool(description = "Report the lifecycle phase, stored entries per version and pending retries.")]
    async fn cache_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.controller).await
    }
}

impl ServerHandler for OffcacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "offcache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{APP, StubNetwork, controller};

    #[tokio::test]
    async fn test_router_lists_every_tool() {
        let controller = Arc::new(controller(Arc::new(StubNetwork::default())).await);
        let server = OffcacheServer::new(controller, Url::parse(APP).unwrap());

        let mut names: Vec<String> = server.tool_router.list_all().into_iter().map(|t| t.name.to_string()).collect();
        names.sort();
        assert_eq!(
            names,
            vec!["background_sync", "cache_status", "lifecycle_activate", "lifecycle_install", "resource_fetch"]
        );
    }
}
