//! Per-request strategy selection.
//!
//! Rules are evaluated in order and the first match wins:
//!
//! 1. Origin neither the application's own nor allow-listed: [`Strategy::Bypass`]
//! 2. Script path: [`Strategy::NetworkFirst`]
//! 3. Stylesheet, image or font path: [`Strategy::CacheFirst`]
//! 4. Anything else (documents, API calls): [`Strategy::NetworkFirstWithFallback`]

use serde::{Deserialize, Serialize};
use url::{Origin, Url};

use crate::request::{RequestDescriptor, UrlError, parse_origin};

/// Extensions served network-first so new deployments win when reachable.
const CODE_EXTENSIONS: &[&str] = &["js", "mjs"];

/// Extensions served cache-first.
const STATIC_EXTENSIONS: &[&str] =
    &["css", "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "woff", "woff2", "ttf", "otf"];

/// Source-of-truth ordering for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    NetworkFirst,
    CacheFirst,
    NetworkFirstWithFallback,
    Bypass,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Strategy::NetworkFirst => "network_first",
            Strategy::CacheFirst => "cache_first",
            Strategy::NetworkFirstWithFallback => "network_first_with_fallback",
            Strategy::Bypass => "bypass",
        };
        f.write_str(name)
    }
}

/// One trusted external origin.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AllowedOrigin {
    /// Bare host: any scheme or port.
    Host(String),
    /// Full origin: scheme, host and port must all match.
    Exact(Origin),
}

impl AllowedOrigin {
    fn parse(entry: &str) -> Result<Self, UrlError> {
        let entry = entry.trim();
        if entry.contains("://") {
            Ok(Self::Exact(parse_origin(entry)?.origin()))
        } else if entry.is_empty() {
            Err(UrlError::Empty)
        } else {
            Ok(Self::Host(entry.to_ascii_lowercase()))
        }
    }

    fn matches(&self, url: &Url) -> bool {
        match self {
            Self::Host(host) => url.host_str().is_some_and(|h| h.eq_ignore_ascii_case(host)),
            Self::Exact(origin) => &url.origin() == origin,
        }
    }
}

/// Maps request descriptors to strategies. Holds no mutable state.
#[derive(Debug, Clone)]
pub struct ResourceClassifier {
    app_origin: Origin,
    allowed: Vec<AllowedOrigin>,
}

impl ResourceClassifier {
    /// Build a classifier for `app_origin` trusting each entry of `allowed`.
    ///
    /// Entries are either bare hosts (`cdn.example`) or full origins
    /// (`https://cdn.example:8443`).
    pub fn new<I, S>(app_origin: &Url, allowed: I) -> Result<Self, UrlError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = allowed
            .into_iter()
            .map(|entry| AllowedOrigin::parse(entry.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { app_origin: app_origin.origin(), allowed })
    }

    /// Whether `url` shares the application origin.
    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.app_origin
    }

    pub fn classify(&self, request: &RequestDescriptor) -> Strategy {
        self.classify_url(&request.url)
    }

    pub fn classify_url(&self, url: &Url) -> Strategy {
        if !self.is_same_origin(url) && !self.allowed.iter().any(|a| a.matches(url)) {
            return Strategy::Bypass;
        }

        match extension(url) {
            Some(ext) if CODE_EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext)) => Strategy::NetworkFirst,
            Some(ext) if STATIC_EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext)) => Strategy::CacheFirst,
            _ => Strategy::NetworkFirstWithFallback,
        }
    }
}

/// Extension of the last path segment, if any.
fn extension(url: &Url) -> Option<&str> {
    let segment = url.path().rsplit('/').next()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty()).then_some(ext)
}
