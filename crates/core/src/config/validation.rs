//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;
use url::Url;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

fn require_http_url(field: &str, raw: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw).map_err(|e| invalid(field, format!("not a valid URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(field, format!("unsupported scheme '{other}'"))),
    }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `api_base_url`, `asset_origin`, an external asset or the push endpoint is not an http(s) URL
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent`, `cache_prefix` or `cache_version` is empty
    /// - `freshness_hours` or `max_bytes` is 0
    /// - a fallback asset is not part of `shell_assets`
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_http_url("api_base_url", &self.api_base_url)?;
        require_http_url("asset_origin", &self.asset_origin)?;
        for asset in &self.external_assets {
            require_http_url("external_assets", asset)?;
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.freshness_hours == 0 {
            return Err(invalid("freshness_hours", "must be at least 1 hour"));
        }

        if self.cache_prefix.is_empty() {
            return Err(invalid("cache_prefix", "must not be empty"));
        }
        if self.cache_version.is_empty() {
            return Err(invalid("cache_version", "must not be empty"));
        }

        if let Some(bad) = self.shell_assets.iter().find(|path| !path.starts_with('/')) {
            return Err(invalid("shell_assets", format!("'{bad}' must be an absolute path")));
        }
        if !self.shell_assets.contains(&self.offline_page) {
            return Err(invalid("offline_page", "must be listed in shell_assets"));
        }
        if !self.shell_assets.contains(&self.offline_image) {
            return Err(invalid("offline_image", "must be listed in shell_assets"));
        }

        if let Some(push) = &self.push {
            require_http_url("push.endpoint", &push.endpoint)?;
        }

        if self.vapid_public_key.is_empty() {
            tracing::warn!("vapid_public_key is empty; push subscriptions will be rejected by most services");
        }

        Ok(())
    }
}
