//! Intercepted request descriptors and their store identity.
//!
//! A [`RequestDescriptor`] is what the host hands over for every outbound
//! request. Only `GET` descriptors produce a [`StoreKey`]; everything else
//! passes through without touching a store.

pub mod url;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub use self::url::{UrlError, normalize, parse_origin};

use crate::Error;
use crate::cache::hash::compute_store_key;

/// An intercepted outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    /// Upper-cased HTTP method.
    pub method: String,
    /// Normalized absolute URL.
    pub url: ::url::Url,
    /// Top-level navigation (document load) rather than a subresource.
    pub navigation: bool,
    /// Request body for writes; never part of the store key.
    pub body: Option<Bytes>,
    /// Background-sync tag under which a failed write may be deferred.
    pub sync_tag: Option<String>,
}

impl RequestDescriptor {
    /// Build a descriptor, validating and upper-casing the method.
    pub fn new(method: &str, url: ::url::Url) -> Result<Self, Error> {
        let method = method.trim();
        if method.is_empty() || !method.chars().all(|c| c.is_ascii_alphabetic() || c == '-') {
            return Err(Error::InvalidInput(format!("invalid method: {method:?}")));
        }

        Ok(Self { method: method.to_ascii_uppercase(), url, navigation: false, body: None, sync_tag: None })
    }

    /// A plain subresource `GET`.
    pub fn get(url: ::url::Url) -> Self {
        Self { method: "GET".into(), url, navigation: false, body: None, sync_tag: None }
    }

    /// A top-level navigation `GET`.
    pub fn navigate(url: ::url::Url) -> Self {
        Self { navigation: true, ..Self::get(url) }
    }

    /// Parse a method and a URL or path relative to the application origin.
    pub fn parse(method: &str, input: &str, base: &::url::Url) -> Result<Self, Error> {
        let url = normalize(input, base).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Self::new(method, url)
    }

    pub fn with_navigation(mut self, navigation: bool) -> Self {
        self.navigation = navigation;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_sync_tag(mut self, tag: impl Into<String>) -> Self {
        self.sync_tag = Some(tag.into());
        self
    }

    /// Whether responses to this request may be stored.
    pub fn is_cacheable(&self) -> bool {
        self.method == "GET"
    }

    /// Store identity, `None` for anything but `GET`.
    pub fn store_key(&self) -> Option<StoreKey> {
        self.is_cacheable()
            .then(|| StoreKey { method: self.method.clone(), url: self.url.as_str().to_string() })
    }
}

/// Identity of a snapshot within a store: `(method, absolute URL)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreKey {
    pub method: String,
    pub url: String,
}

impl StoreKey {
    /// Content-addressed hash used as the row key.
    pub fn hash(&self) -> String {
        compute_store_key(&self.method, &self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ::url::Url {
        ::url::Url::parse("https://app.example/").unwrap()
    }

    #[test]
    fn test_parse_uppercases_method() {
        let req = RequestDescriptor::parse("post", "/api/rows", &base()).unwrap();
        assert_eq!(req.method, "POST");
        assert_eq!(req.url.as_str(), "https://app.example/api/rows");
    }

    #[test]
    fn test_parse_rejects_bad_method() {
        assert!(matches!(RequestDescriptor::parse("", "/", &base()), Err(Error::InvalidInput(_))));
        assert!(matches!(RequestDescriptor::parse("GE T", "/", &base()), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_parse_rejects_bad_url() {
        let result = RequestDescriptor::parse("GET", "javascript:alert(1)", &base());
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_only_get_has_store_key() {
        let url = base().join("/api/rows").unwrap();
        assert!(RequestDescriptor::get(url.clone()).store_key().is_some());
        assert!(RequestDescriptor::new("POST", url).unwrap().store_key().is_none());
    }

    #[test]
    fn test_store_key_ignores_navigation_and_body() {
        let url = base().join("/index.html").unwrap();
        let plain = RequestDescriptor::get(url.clone()).store_key().unwrap();
        let nav = RequestDescriptor::navigate(url).with_body("ignored").store_key().unwrap();
        assert_eq!(plain, nav);
        assert_eq!(plain.hash(), nav.hash());
    }
}
