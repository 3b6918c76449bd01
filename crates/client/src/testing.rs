//! In-process network double for strategy and lifecycle tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use offcache_core::{Error, RequestDescriptor, Response, ResponseKind};
use url::Url;

use crate::fetch::Network;

pub(crate) const APP: &str = "https://app.example/";

pub(crate) fn app_url(path: &str) -> Url {
    Url::parse(APP).unwrap().join(path).unwrap()
}

#[derive(Clone)]
enum Reply {
    Status(u16, String),
    Fail,
    TooLarge,
}

/// Scripted replies keyed by absolute URL, with per-URL call counters.
///
/// Unscripted URLs answer 404.
pub(crate) struct ScriptedNetwork {
    origin: Url,
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<HashMap<String, usize>>,
    offline: AtomicBool,
}

impl ScriptedNetwork {
    pub(crate) fn new() -> Self {
        Self {
            origin: Url::parse(APP).unwrap(),
            replies: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            offline: AtomicBool::new(false),
        }
    }

    pub(crate) fn reply(&self, url: &Url, status: u16, body: &str) {
        self.replies
            .lock()
            .unwrap()
            .insert(url.to_string(), Reply::Status(status, body.to_string()));
    }

    pub(crate) fn fail(&self, url: &Url) {
        self.replies.lock().unwrap().insert(url.to_string(), Reply::Fail);
    }

    pub(crate) fn too_large(&self, url: &Url) {
        self.replies.lock().unwrap().insert(url.to_string(), Reply::TooLarge);
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self, url: &Url) -> usize {
        self.calls.lock().unwrap().get(url.as_str()).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &RequestDescriptor) -> Result<Response, Error> {
        *self.calls.lock().unwrap().entry(request.url.to_string()).or_default() += 1;

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network("offline".into()));
        }

        let reply = self.replies.lock().unwrap().get(request.url.as_str()).cloned();
        let kind = if request.url.origin() == self.origin.origin() { ResponseKind::Basic } else { ResponseKind::Cors };

        match reply {
            Some(Reply::Status(status, body)) => Ok(Response::network(status, vec![], body, kind)),
            Some(Reply::Fail) => Err(Error::Network(format!("connection reset: {}", request.url))),
            Some(Reply::TooLarge) => Err(Error::FetchTooLarge(format!("body of {} over limit", request.url))),
            None => Ok(Response::network(404, vec![], "not found", kind)),
        }
    }
}
