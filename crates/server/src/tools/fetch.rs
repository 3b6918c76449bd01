//! resource_fetch tool implementation.
//!
//! Dispatches one intercepted request through the lifecycle and returns the
//! answer together with where it came from.

use offcache_client::{EventOutcome, LifecycleController, LifecycleEvent};
use offcache_core::{Error, RequestDescriptor, Response, ResponseKind, ResponseSource};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

use super::json_result;

/// Input parameters for resource_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResourceFetchParams {
    /// Absolute URL, or a path relative to the application origin.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,

    /// Treat the request as a top-level navigation.
    #[serde(default)]
    pub navigate: bool,

    /// Request body for writes.
    #[serde(default)]
    pub body: Option<String>,

    /// Background-sync tag; a failed write is queued under it.
    #[serde(default)]
    pub sync_tag: Option<String>,
}

fn default_method() -> String {
    "GET".into()
}

/// Output structure for resource_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResourceFetchOutput {
    pub url: String,
    pub status: u16,
    pub kind: ResponseKind,
    pub source: ResponseSource,
    pub headers: Vec<(String, String)>,
    /// Body decoded as UTF-8, lossily.
    pub body: String,
    pub body_bytes: usize,
}

impl ResourceFetchOutput {
    fn new(url: &Url, response: Response) -> Self {
        Self {
            url: url.to_string(),
            status: response.status,
            kind: response.kind,
            source: response.source,
            body: String::from_utf8_lossy(&response.body).into_owned(),
            body_bytes: response.body.len(),
            headers: response.headers,
        }
    }
}

/// Implementation of the resource_fetch tool.
pub async fn fetch_impl(
    controller: &LifecycleController, app_origin: &Url, params: ResourceFetchParams,
) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(Error::InvalidInput("url cannot be empty".into()).into());
    }

    let mut request = RequestDescriptor::parse(&params.method, &params.url, app_origin)?.with_navigation(params.navigate);
    if let Some(body) = params.body {
        request = request.with_body(body);
    }
    if let Some(tag) = params.sync_tag {
        request = request.with_sync_tag(tag);
    }

    let url = request.url.clone();
    match controller.dispatch(LifecycleEvent::Fetch(request)).await? {
        EventOutcome::Response(response) => json_result(&ResourceFetchOutput::new(&url, response)),
        other => Err(McpError::internal_error(format!("fetch produced {other:?}"), None)),
    }
}
