//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if `version_tag` is blank, and
    /// `ConfigError::Invalid` if:
    /// - `app_origin` is not an http(s) origin
    /// - an allow-list or manifest entry cannot be parsed
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    /// - `store_quota_bytes` is 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version_tag.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "version_tag".into(),
                hint: "Set OFFCACHE_VERSION_TAG to the release identifier".into(),
            });
        }

        self.classifier()?;
        let manifest = self.manifest_requests()?;
        let fallback = self.offline_fallback_key()?;

        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must not exceed 50MB".into() });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if self.store_quota_bytes == Some(0) {
            return Err(ConfigError::Invalid {
                field: "store_quota_bytes".into(),
                reason: "must be greater than 0 when set".into(),
            });
        }

        if let Some(key) = fallback
            && !manifest.iter().any(|req| req.store_key().as_ref() == Some(&key))
        {
            tracing::warn!(
                offline_fallback = %key.url,
                "offline_fallback is not in prefetch_manifest; failed navigations will get a 503"
            );
        }

        Ok(())
    }
}
