//! Network transport behind the cache strategies.
//!
//! ### Contract
//! - `Ok(Response)` for every HTTP response, whatever its status.
//! - `Err(Error::Network)` only when no response was produced (DNS, TLS,
//!   connection reset, timeout).
//!
//! ### Response kind
//! - `Basic` when the final URL (after redirects) shares the application origin.
//! - `Cors` for allowed cross-origin hosts.
//!
//! ### Limits
//! - Max redirects: 5 (configurable)
//! - Max body bytes: 5MB (configurable)

use async_trait::async_trait;
use reqwest::{Client, Method, header};
use std::time::{Duration, Instant};
use url::Url;

use offcache_core::{AppConfig, ConfigError, Error, RequestDescriptor, Response, ResponseKind};

/// Anything that can answer a request from the network.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &RequestDescriptor) -> Result<Response, Error>;
}

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "offcache/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,

    /// Origin whose responses count as `Basic`
    pub app_origin: Option<Url>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "offcache/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
            app_origin: None,
        }
    }
}

impl FetchConfig {
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            max_redirects: config.max_redirects,
            app_origin: Some(config.app_origin_url()?),
        })
    }
}

/// HTTP client implementing [`Network`] with reqwest.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    fn kind_for(&self, final_url: &Url) -> ResponseKind {
        match &self.config.app_origin {
            Some(origin) if origin.origin() == final_url.origin() => ResponseKind::Basic,
            _ => ResponseKind::Cors,
        }
    }
}

#[async_trait]
impl Network for FetchClient {
    async fn fetch(&self, request: &RequestDescriptor) -> Result<Response, Error> {
        let start = Instant::now();
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| Error::InvalidInput(format!("invalid method {}: {e}", request.method)))?;

        let mut builder = self.http.request(method, request.url.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Network(format!("timeout after {}ms: {e}", self.config.timeout.as_millis()))
            } else {
                Error::Network(e.to_string())
            }
        })?;

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let status = response.status();
        let final_url = response.url().clone();
        let headers = header_pairs(response.headers());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("failed to read response: {e}")))?;

        if bytes.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", bytes.len(), self.config.max_bytes)));
        }

        tracing::debug!(
            "fetched {} {} -> {} in {}ms ({} bytes)",
            request.method,
            request.url,
            status.as_u16(),
            start.elapsed().as_millis(),
            bytes.len()
        );

        Ok(Response::network(status.as_u16(), headers, bytes, self.kind_for(&final_url)))
    }
}

/// Header pairs in wire order; values that are not valid UTF-8 are dropped.
fn header_pairs(headers: &header::HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
        .collect()
}
