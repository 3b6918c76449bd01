//! offcache server entry point.
//!
//! Boots the lifecycle controller and serves it over MCP on stdio.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use offcache_client::{DetachedHost, FetchClient, FetchConfig, LifecycleController, LifecycleEvent, WorkerConfig};
use offcache_core::{AppConfig, CacheDb};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(version_tag = %config.version_tag, db = %config.db_path.display(), "Starting offcache server on stdio transport");

    let db = CacheDb::open(&config.db_path).await?;
    let network = Arc::new(FetchClient::new(FetchConfig::from_app_config(&config)?)?);
    let worker = WorkerConfig::from_app_config(&config)?;
    let controller = Arc::new(LifecycleController::new(worker, Arc::new(db), network, Arc::new(DetachedHost)));

    let handler = handler::OffcacheServer::new(controller.clone(), config.app_origin_url()?);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    controller.dispatch(LifecycleEvent::Terminate).await?;
    tracing::info!("offcache server stopped");

    Ok(())
}
