//! Caching strategies over {network, store}.
//!
//! Each strategy is an independent algorithm:
//!
//! - **NetworkFirst**: live 200s are stored and returned; on failure or any
//!   other status the stored snapshot wins, else the live outcome is returned
//!   unchanged.
//! - **CacheFirst**: a stored snapshot short-circuits the network; on a miss
//!   only a same-origin 200 is stored.
//! - **NetworkFirstWithFallback**: like NetworkFirst, but a full miss never
//!   fails: navigations get the offline document, everything else a 503.
//! - **Bypass**: straight to the network.
//!
//! Store reads that fail count as misses. Store writes go through
//! [`WriteBoundary`] and never delay or alter the returned response.

pub mod writes;

use std::sync::Arc;

use offcache_core::{
    Error, RequestDescriptor, Response, ResponseKind, ResponseSnapshot, ResponseSource, ResponseStore, StoreKey,
    Strategy,
};

use crate::fetch::Network;

pub use writes::WriteBoundary;

/// Runs strategies against one network and the active store.
pub struct StrategyExecutor {
    network: Arc<dyn Network>,
    store: Arc<dyn ResponseStore>,
    offline_fallback: Option<StoreKey>,
    writes: WriteBoundary,
}

impl StrategyExecutor {
    pub fn new(network: Arc<dyn Network>, store: Arc<dyn ResponseStore>, offline_fallback: Option<StoreKey>) -> Self {
        Self { network, store, offline_fallback, writes: WriteBoundary::new() }
    }

    pub fn store(&self) -> &Arc<dyn ResponseStore> {
        &self.store
    }

    pub fn writes(&self) -> &WriteBoundary {
        &self.writes
    }

    /// Stop store mutation: refuse new writes, abort pending ones, and wait
    /// until anything already handed to the store has landed.
    pub async fn shutdown(&self) {
        self.writes.close().await;
        if let Err(e) = self.store.barrier().await {
            tracing::warn!(tag = self.store.tag(), error = %e, "store barrier failed during shutdown");
        }
    }

    /// Answer `request` using `strategy`.
    ///
    /// # Errors
    ///
    /// Only `NetworkFirst`, `CacheFirst` and `Bypass` return the transport
    /// error, and only when the store has nothing for the request.
    pub async fn execute(&self, strategy: Strategy, request: &RequestDescriptor) -> Result<Response, Error> {
        match strategy {
            Strategy::NetworkFirst => self.network_first(request).await,
            Strategy::CacheFirst => self.cache_first(request).await,
            Strategy::NetworkFirstWithFallback => Ok(self.network_first_with_fallback(request).await),
            Strategy::Bypass => self.network.fetch(request).await,
        }
    }

    async fn network_first(&self, request: &RequestDescriptor) -> Result<Response, Error> {
        let key = request.store_key();
        let outcome = self.network.fetch(request).await;

        if let Ok(response) = &outcome
            && response.is_storable()
        {
            if let Some(key) = key {
                self.store_detached(key, response);
            }
            return outcome;
        }

        if let Some(key) = &key
            && let Some(snapshot) = self.lookup(key).await
        {
            match &outcome {
                Ok(response) => tracing::debug!(url = %request.url, status = response.status, "serving stored copy"),
                Err(e) => tracing::debug!(url = %request.url, error = %e, "network failed, serving stored copy"),
            }
            return Ok(snapshot.to_response(ResponseSource::Store));
        }

        outcome
    }

    async fn cache_first(&self, request: &RequestDescriptor) -> Result<Response, Error> {
        let key = request.store_key();

        if let Some(key) = &key
            && let Some(snapshot) = self.lookup(key).await
        {
            tracing::debug!(url = %request.url, "store hit");
            return Ok(snapshot.to_response(ResponseSource::Store));
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_storable()
                    && response.kind == ResponseKind::Basic
                    && let Some(key) = key
                {
                    self.store_detached(key, &response);
                }
                Ok(response)
            }
            Err(e) => {
                // another in-flight request may have populated the key meanwhile
                if let Some(key) = &key
                    && let Some(snapshot) = self.lookup(key).await
                {
                    return Ok(snapshot.to_response(ResponseSource::Store));
                }
                Err(e)
            }
        }
    }

    async fn network_first_with_fallback(&self, request: &RequestDescriptor) -> Response {
        let key = request.store_key();

        let error = match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_storable()
                    && let Some(key) = key
                {
                    self.store_detached(key, &response);
                }
                return response;
            }
            Err(e) => e,
        };

        if let Some(key) = &key
            && let Some(snapshot) = self.lookup(key).await
        {
            tracing::debug!(url = %request.url, error = %error, "network failed, serving stored copy");
            return snapshot.to_response(ResponseSource::Store);
        }

        if request.navigation
            && let Some(fallback) = &self.offline_fallback
        {
            if let Some(snapshot) = self.lookup(fallback).await {
                tracing::debug!(url = %request.url, fallback = %fallback.url, "serving offline document");
                return snapshot.to_response(ResponseSource::OfflineFallback);
            }
            tracing::warn!(fallback = %fallback.url, "offline document is not in the store");
        }

        tracing::debug!(url = %request.url, error = %error, "no stored copy, answering 503");
        Response::unavailable(&error.to_string())
    }

    /// Store read that treats failures as misses.
    async fn lookup(&self, key: &StoreKey) -> Option<ResponseSnapshot> {
        match self.store.get(key).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(tag = self.store.tag(), url = %key.url, error = %e, "store read failed, treating as miss");
                None
            }
        }
    }

    fn store_detached(&self, key: StoreKey, response: &Response) {
        self.writes
            .detach(self.store.clone(), key, ResponseSnapshot::capture(response));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedNetwork, app_url};
    use offcache_core::{CacheDb, VersionedStore};
    use std::time::Duration;
    use url::Url;

    /// Store whose reads fail for the listed URLs.
    struct UnreadableStore {
        inner: VersionedStore,
        broken: Vec<String>,
    }

    #[async_trait::async_trait]
    impl ResponseStore for UnreadableStore {
        fn tag(&self) -> &str {
            self.inner.tag()
        }

        async fn get(&self, key: &StoreKey) -> Result<Option<ResponseSnapshot>, Error> {
            if self.broken.iter().any(|u| *u == key.url) {
                return Err(Error::Serialization("corrupt headers column".into()));
            }
            self.inner.get(key).await
        }

        async fn put(&self, key: &StoreKey, snapshot: &ResponseSnapshot) -> Result<(), Error> {
            self.inner.put(key, snapshot).await
        }

        async fn entry_count(&self) -> Result<u64, Error> {
            self.inner.entry_count().await
        }

        async fn barrier(&self) -> Result<(), Error> {
            self.inner.barrier().await
        }
    }

    async fn unreadable_fixture(broken: &[&Url]) -> Fixture {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = UnreadableStore {
            inner: db.open_store("v1", None).await.unwrap(),
            broken: broken.iter().map(|u| u.to_string()).collect(),
        };
        let network = Arc::new(ScriptedNetwork::new());
        let fallback = RequestDescriptor::get(app_url("/offline.html")).store_key();
        let executor = StrategyExecutor::new(network.clone(), Arc::new(store), fallback);
        Fixture { network, executor }
    }

    struct Fixture {
        network: Arc<ScriptedNetwork>,
        executor: StrategyExecutor,
    }

    async fn fixture() -> Fixture {
        fixture_with_quota(None).await
    }

    async fn fixture_with_quota(quota: Option<u64>) -> Fixture {
        let db = CacheDb::open_in_memory().await.unwrap();
        let store = Arc::new(db.open_store("v1", quota).await.unwrap());
        let network = Arc::new(ScriptedNetwork::new());
        let fallback = RequestDescriptor::get(app_url("/offline.html")).store_key();
        let executor = StrategyExecutor::new(network.clone(), store, fallback);
        Fixture { network, executor }
    }

    async fn seed(fx: &Fixture, url: &Url, body: &str) {
        let key = RequestDescriptor::get(url.clone()).store_key().unwrap();
        let response = Response::network(200, vec![], body.to_string(), ResponseKind::Basic);
        fx.executor.store().put(&key, &ResponseSnapshot::capture(&response)).await.unwrap();
    }

    #[tokio::test]
    async fn test_cache_first_second_request_skips_network() {
        let fx = fixture().await;
        let url = app_url("/style.css");
        fx.network.reply(&url, 200, "body{}");
        let request = RequestDescriptor::get(url.clone());

        let first = fx.executor.execute(Strategy::CacheFirst, &request).await.unwrap();
        assert_eq!(first.source, ResponseSource::Network);
        fx.executor.writes().settle().await;

        let second = fx.executor.execute(Strategy::CacheFirst, &request).await.unwrap();
        assert_eq!(second.source, ResponseSource::Store);
        assert_eq!(second.body.as_ref(), b"body{}");
        assert_eq!(fx.network.calls(&url), 1);
    }

    #[tokio::test]
    async fn test_cache_first_does_not_store_cross_origin() {
        let fx = fixture().await;
        let url = Url::parse("https://cdn.example/font.woff2").unwrap();
        fx.network.reply(&url, 200, "font");
        let request = RequestDescriptor::get(url.clone());

        let response = fx.executor.execute(Strategy::CacheFirst, &request).await.unwrap();
        assert_eq!(response.kind, ResponseKind::Cors);
        fx.executor.writes().settle().await;

        assert_eq!(fx.executor.store().entry_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cache_first_does_not_store_errors() {
        let fx = fixture().await;
        let url = app_url("/missing.png");
        let request = RequestDescriptor::get(url.clone());

        let response = fx.executor.execute(Strategy::CacheFirst, &request).await.unwrap();
        assert_eq!(response.status, 404);
        fx.executor.writes().settle().await;
        assert_eq!(fx.executor.store().entry_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cache_first_propagates_failure_on_full_miss() {
        let fx = fixture().await;
        let url = app_url("/logo.svg");
        fx.network.fail(&url);

        let result = fx.executor.execute(Strategy::CacheFirst, &RequestDescriptor::get(url)).await;
        assert!(matches!(result, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_network_first_serves_stored_body_when_offline() {
        let fx = fixture().await;
        let url = app_url("/app/shell.js");
        fx.network.reply(&url, 200, "console.log(1)");
        let request = RequestDescriptor::get(url.clone());

        fx.executor.execute(Strategy::NetworkFirst, &request).await.unwrap();
        fx.executor.writes().settle().await;

        fx.network.set_offline(true);
        let offline = fx.executor.execute(Strategy::NetworkFirst, &request).await.unwrap();
        assert_eq!(offline.source, ResponseSource::Store);
        assert_eq!(offline.body.as_ref(), b"console.log(1)");
    }

    #[tokio::test]
    async fn test_network_first_prefers_fresh_network() {
        let fx = fixture().await;
        let url = app_url("/app/shell.js");
        seed(&fx, &url, "old build").await;
        fx.network.reply(&url, 200, "new build");

        let response = fx
            .executor
            .execute(Strategy::NetworkFirst, &RequestDescriptor::get(url.clone()))
            .await
            .unwrap();
        assert_eq!(response.body.as_ref(), b"new build");
        fx.executor.writes().settle().await;

        let key = RequestDescriptor::get(url).store_key().unwrap();
        let stored = fx.executor.store().get(&key).await.unwrap().unwrap();
        assert_eq!(stored.body().as_ref(), b"new build");
        assert_eq!(fx.executor.store().entry_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_network_first_non_200_falls_back_to_store() {
        let fx = fixture().await;
        let url = app_url("/app/shell.js");
        seed(&fx, &url, "cached").await;
        fx.network.reply(&url, 500, "oops");

        let response = fx.executor.execute(Strategy::NetworkFirst, &RequestDescriptor::get(url)).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body.as_ref(), b"cached");
    }

    #[tokio::test]
    async fn test_network_first_returns_non_200_unchanged_on_miss() {
        let fx = fixture().await;
        let url = app_url("/app/gone.js");
        fx.network.reply(&url, 410, "gone");

        let response = fx.executor.execute(Strategy::NetworkFirst, &RequestDescriptor::get(url)).await.unwrap();
        assert_eq!(response.status, 410);
        assert_eq!(response.source, ResponseSource::Network);
    }

    #[tokio::test]
    async fn test_network_first_propagates_failure_on_miss() {
        let fx = fixture().await;
        let url = app_url("/app/new.js");
        fx.network.fail(&url);

        let result = fx.executor.execute(Strategy::NetworkFirst, &RequestDescriptor::get(url)).await;
        assert!(matches!(result, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_fallback_navigation_gets_offline_document() {
        let fx = fixture().await;
        seed(&fx, &app_url("/offline.html"), "<h1>offline</h1>").await;
        fx.network.set_offline(true);

        let request = RequestDescriptor::navigate(app_url("/records/42"));
        let response = fx.executor.execute(Strategy::NetworkFirstWithFallback, &request).await.unwrap();

        let key = RequestDescriptor::get(app_url("/offline.html")).store_key().unwrap();
        let fallback = fx.executor.store().get(&key).await.unwrap().unwrap();
        assert_eq!(response.source, ResponseSource::OfflineFallback);
        assert_eq!(response.body, *fallback.body());
        assert_eq!(response.status, fallback.status());
    }

    #[tokio::test]
    async fn test_fallback_prefers_exact_stored_match() {
        let fx = fixture().await;
        seed(&fx, &app_url("/offline.html"), "offline").await;
        seed(&fx, &app_url("/records"), "records page").await;
        fx.network.set_offline(true);

        let request = RequestDescriptor::navigate(app_url("/records"));
        let response = fx.executor.execute(Strategy::NetworkFirstWithFallback, &request).await.unwrap();
        assert_eq!(response.source, ResponseSource::Store);
        assert_eq!(response.body.as_ref(), b"records page");
    }

    #[tokio::test]
    async fn test_fallback_api_call_gets_503() {
        let fx = fixture().await;
        seed(&fx, &app_url("/offline.html"), "offline").await;
        fx.network.set_offline(true);

        let request = RequestDescriptor::get(app_url("/api/rows"));
        let response = fx.executor.execute(Strategy::NetworkFirstWithFallback, &request).await.unwrap();
        assert_eq!(response.status, 503);
        assert_eq!(response.source, ResponseSource::Synthesized);
    }

    #[tokio::test]
    async fn test_fallback_navigation_without_document_gets_503() {
        let fx = fixture().await;
        fx.network.set_offline(true);

        let request = RequestDescriptor::navigate(app_url("/"));
        let response = fx.executor.execute(Strategy::NetworkFirstWithFallback, &request).await.unwrap();
        assert_eq!(response.status, 503);
    }

    #[tokio::test]
    async fn test_fallback_refreshes_store_on_success() {
        let fx = fixture().await;
        let url = app_url("/api/rows");
        fx.network.reply(&url, 200, "[1,2]");

        let response = fx
            .executor
            .execute(Strategy::NetworkFirstWithFallback, &RequestDescriptor::get(url.clone()))
            .await
            .unwrap();
        assert_eq!(response.body.as_ref(), b"[1,2]");
        fx.executor.writes().settle().await;

        fx.network.set_offline(true);
        let offline = fx
            .executor
            .execute(Strategy::NetworkFirstWithFallback, &RequestDescriptor::get(url))
            .await
            .unwrap();
        assert_eq!(offline.body.as_ref(), b"[1,2]");
    }

    #[tokio::test]
    async fn test_store_write_failure_does_not_affect_response() {
        let fx = fixture_with_quota(Some(2)).await;
        let url = app_url("/app/big.js");
        fx.network.reply(&url, 200, "a very large bundle");

        let response = fx.executor.execute(Strategy::NetworkFirst, &RequestDescriptor::get(url)).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body.as_ref(), b"a very large bundle");

        fx.executor.writes().settle().await;
        assert_eq!(fx.executor.store().entry_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bypass_never_touches_store() {
        let fx = fixture().await;
        let url = Url::parse("https://evil.example/x.js").unwrap();
        fx.network.reply(&url, 200, "x");

        fx.executor.execute(Strategy::Bypass, &RequestDescriptor::get(url)).await.unwrap();
        fx.executor.writes().settle().await;
        assert_eq!(fx.executor.store().entry_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_non_get_is_never_stored() {
        let fx = fixture().await;
        let url = app_url("/api/rows");
        fx.network.reply(&url, 200, "created");
        let request = RequestDescriptor::new("POST", url).unwrap().with_body("{}");

        let response = fx.executor.execute(Strategy::NetworkFirstWithFallback, &request).await.unwrap();
        assert_eq!(response.status, 200);
        fx.executor.writes().settle().await;
        assert_eq!(fx.executor.store().entry_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_read_counts_as_miss_for_cache_first() {
        let url = app_url("/style.css");
        let fx = unreadable_fixture(&[&url]).await;
        seed(&fx, &url, "stale").await;
        fx.network.reply(&url, 200, "fresh");

        let response = fx.executor.execute(Strategy::CacheFirst, &RequestDescriptor::get(url.clone())).await.unwrap();
        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(response.body.as_ref(), b"fresh");
        assert_eq!(fx.network.calls(&url), 1);
    }

    #[tokio::test]
    async fn test_failed_read_falls_through_to_offline_document() {
        let page = app_url("/records/42");
        let fx = unreadable_fixture(&[&page]).await;
        seed(&fx, &page, "records").await;
        seed(&fx, &app_url("/offline.html"), "offline").await;
        fx.network.set_offline(true);

        let response = fx
            .executor
            .execute(Strategy::NetworkFirstWithFallback, &RequestDescriptor::navigate(page))
            .await
            .unwrap();
        assert_eq!(response.source, ResponseSource::OfflineFallback);
        assert_eq!(response.body.as_ref(), b"offline");
    }

    #[tokio::test]
    async fn test_failed_reads_everywhere_answer_503() {
        let page = app_url("/records/42");
        let offline = app_url("/offline.html");
        let fx = unreadable_fixture(&[&page, &offline]).await;
        seed(&fx, &offline, "offline").await;
        fx.network.set_offline(true);

        let response = fx
            .executor
            .execute(Strategy::NetworkFirstWithFallback, &RequestDescriptor::navigate(page))
            .await
            .unwrap();
        assert_eq!(response.status, 503);
        assert_eq!(response.source, ResponseSource::Synthesized);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_store_mutation_after_shutdown() {
        let fx = fixture().await;
        let store = fx.executor.store().clone();

        for i in 0..400 {
            let key = RequestDescriptor::get(app_url(&format!("/asset-{i}.css"))).store_key().unwrap();
            let response = Response::network(200, vec![], format!("body {i}"), ResponseKind::Basic);
            fx.executor.writes().detach(store.clone(), key, ResponseSnapshot::capture(&response));
        }

        fx.executor.shutdown().await;
        let at_shutdown = store.entry_count().await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.entry_count().await.unwrap(), at_shutdown);

        let late = RequestDescriptor::get(app_url("/late.css")).store_key().unwrap();
        let response = Response::network(200, vec![], "late", ResponseKind::Basic);
        fx.executor.writes().detach(store.clone(), late, ResponseSnapshot::capture(&response));
        assert_eq!(fx.executor.writes().in_flight(), 0);
        assert!(fx.executor.writes().is_closed());
    }
}
