//! lifecycle_install and lifecycle_activate tool implementations.
//!
//! Both forward one host event to the controller and report what changed.

use offcache_client::{EventOutcome, LifecycleController, LifecycleEvent};
use rmcp::{ErrorData as McpError, model::CallToolResult};

use super::json_result;

/// Provision the current version's store from the prefetch manifest.
pub async fn install_impl(controller: &LifecycleController) -> Result<CallToolResult, McpError> {
    match controller.dispatch(LifecycleEvent::Install).await? {
        EventOutcome::Installed(report) => json_result(&report),
        other => Err(unexpected("install", &other)),
    }
}

/// Delete stale stores and take control of open clients.
pub async fn activate_impl(controller: &LifecycleController) -> Result<CallToolResult, McpError> {
    match controller.dispatch(LifecycleEvent::Activate).await? {
        EventOutcome::Activated(report) => json_result(&report),
        other => Err(unexpected("activate", &other)),
    }
}

fn unexpected(event: &str, outcome: &EventOutcome) -> McpError {
    McpError::internal_error(format!("{event} produced {outcome:?}"), None)
}
