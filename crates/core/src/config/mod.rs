//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (OFFCACHE_*)
//! 2. TOML config file (if OFFCACHE_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! The deployment collaborator owns `version_tag`, `prefetch_manifest` and
//! `offline_fallback`; they are literals that change with every release.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::classify::ResourceClassifier;
use crate::request::{RequestDescriptor, StoreKey, normalize, parse_origin};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (OFFCACHE_*)
/// 2. TOML config file (if OFFCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Tag of the store this build serves from.
    ///
    /// Set via OFFCACHE_VERSION_TAG environment variable.
    #[serde(default = "default_version_tag")]
    pub version_tag: String,

    /// Origin of the hosted application; requests to it are same-origin.
    ///
    /// Set via OFFCACHE_APP_ORIGIN environment variable.
    #[serde(default = "default_app_origin")]
    pub app_origin: String,

    /// Trusted external origins (CDN, identity and storage hosts).
    ///
    /// Bare hosts or full origins. Set via OFFCACHE_ALLOWED_ORIGINS as an
    /// array, e.g. `["cdn.example", "https://accounts.example"]`.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Application shell resources fetched at install time, in order.
    ///
    /// Set via OFFCACHE_PREFETCH_MANIFEST as an array of paths or URLs.
    #[serde(default = "default_prefetch_manifest")]
    pub prefetch_manifest: Vec<String>,

    /// Cached document returned for failed navigations.
    ///
    /// Set via OFFCACHE_OFFLINE_FALLBACK environment variable.
    #[serde(default = "default_offline_fallback")]
    pub offline_fallback: Option<String>,

    /// Path to SQLite store database.
    ///
    /// Set via OFFCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via OFFCACHE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to fetch per request.
    ///
    /// Set via OFFCACHE_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via OFFCACHE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum redirects followed per request.
    ///
    /// Set via OFFCACHE_MAX_REDIRECTS environment variable.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Upper bound on total body bytes held by the active store.
    ///
    /// Set via OFFCACHE_STORE_QUOTA_BYTES environment variable. Unbounded when unset.
    #[serde(default)]
    pub store_quota_bytes: Option<u64>,
}

fn default_version_tag() -> String {
    "offcache-v1".into()
}

fn default_app_origin() -> String {
    "http://localhost:8080".into()
}

fn default_prefetch_manifest() -> Vec<String> {
    vec!["/".into(), "/offline.html".into()]
}

fn default_offline_fallback() -> Option<String> {
    Some("/offline.html".into())
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./offcache.sqlite")
}

fn default_user_agent() -> String {
    "offcache/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_redirects() -> usize {
    5
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version_tag: default_version_tag(),
            app_origin: default_app_origin(),
            allowed_origins: Vec::new(),
            prefetch_manifest: default_prefetch_manifest(),
            offline_fallback: default_offline_fallback(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            max_redirects: default_max_redirects(),
            store_quota_bytes: None,
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `OFFCACHE_`
    /// 2. TOML file from `OFFCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("OFFCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("OFFCACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// The application origin as a URL rooted at `/`.
    pub fn app_origin_url(&self) -> Result<Url, ConfigError> {
        parse_origin(&self.app_origin)
            .map_err(|e| ConfigError::Invalid { field: "app_origin".into(), reason: e.to_string() })
    }

    /// Classifier for the configured origin and allow-list.
    pub fn classifier(&self) -> Result<ResourceClassifier, ConfigError> {
        ResourceClassifier::new(&self.app_origin_url()?, &self.allowed_origins)
            .map_err(|e| ConfigError::Invalid { field: "allowed_origins".into(), reason: e.to_string() })
    }

    /// Manifest entries resolved to `GET` descriptors, in declared order.
    pub fn manifest_requests(&self) -> Result<Vec<RequestDescriptor>, ConfigError> {
        let base = self.app_origin_url()?;
        self.prefetch_manifest
            .iter()
            .map(|entry| {
                normalize(entry, &base).map(RequestDescriptor::get).map_err(|e| ConfigError::Invalid {
                    field: "prefetch_manifest".into(),
                    reason: format!("{entry}: {e}"),
                })
            })
            .collect()
    }

    /// Store key of the offline fallback document, if configured.
    pub fn offline_fallback_key(&self) -> Result<Option<StoreKey>, ConfigError> {
        let Some(path) = self.offline_fallback.as_deref() else {
            return Ok(None);
        };
        let base = self.app_origin_url()?;
        let url = normalize(path, &base)
            .map_err(|e| ConfigError::Invalid { field: "offline_fallback".into(), reason: e.to_string() })?;
        Ok(RequestDescriptor::get(url).store_key())
    }
}
