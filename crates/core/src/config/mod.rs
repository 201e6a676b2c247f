//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (STORYLINE_*)
//! 2. TOML config file (if STORYLINE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Push endpoint and keys handed out by the device host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushConfig {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (STORYLINE_*)
/// 2. TOML config file (if STORYLINE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the story API.
    ///
    /// Set via STORYLINE_API_BASE_URL environment variable.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Origin serving the application shell assets.
    #[serde(default = "default_asset_origin")]
    pub asset_origin: String,

    /// Path to the SQLite database.
    ///
    /// Set via STORYLINE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via STORYLINE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes accepted for one intercepted response.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Age after which cached stories are refreshed.
    #[serde(default = "default_freshness_hours")]
    pub freshness_hours: u64,

    /// Prefix shared by every cache tier name.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Version suffix of the current tier set. Bumping it retires old tiers on activation.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Shell asset paths on the asset origin.
    #[serde(default = "default_shell_assets")]
    pub shell_assets: Vec<String>,

    /// Absolute URLs of third-party shell assets. Failures to pre-fetch these are tolerated.
    #[serde(default = "default_external_assets")]
    pub external_assets: Vec<String>,

    #[serde(default = "default_offline_page")]
    pub offline_page: String,

    #[serde(default = "default_offline_image")]
    pub offline_image: String,

    /// Application server key used when creating a push subscription.
    #[serde(default = "default_vapid_public_key")]
    pub vapid_public_key: String,

    /// Device push endpoint. Without it the device host reports push as unsupported.
    #[serde(default)]
    pub push: Option<PushConfig>,
}

fn default_api_base_url() -> String {
    "https://story-api.dicoding.dev/v1".into()
}

fn default_asset_origin() -> String {
    "http://localhost:5173".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./storyline.sqlite")
}

fn default_user_agent() -> String {
    "storyline/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_freshness_hours() -> u64 {
    24
}

fn default_cache_prefix() -> String {
    "story-app".into()
}

fn default_cache_version() -> String {
    "v2".into()
}

fn default_shell_assets() -> Vec<String> {
    [
        "/",
        "/index.html",
        "/src/main.js",
        "/src/App.js",
        "/src/App.css",
        "/src/index.css",
        "/manifest.json",
        "/offline.html",
        "/offline-image.svg",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_external_assets() -> Vec<String> {
    [
        "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css",
        "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_offline_page() -> String {
    "/offline.html".into()
}

fn default_offline_image() -> String {
    "/offline-image.svg".into()
}

fn default_vapid_public_key() -> String {
    "BCCs2eonMI-6H2ctvFaWg-UYdDv387Vno_bzUzALpB442r2lCnsHmtrx8biyPi_E-1fSGABK_Qs_GlvPoJJqxbk".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            asset_origin: default_asset_origin(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            freshness_hours: default_freshness_hours(),
            cache_prefix: default_cache_prefix(),
            cache_version: default_cache_version(),
            shell_assets: default_shell_assets(),
            external_assets: default_external_assets(),
            offline_page: default_offline_page(),
            offline_image: default_offline_image(),
            vapid_public_key: default_vapid_public_key(),
            push: None,
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn freshness_window(&self) -> Duration {
        Duration::from_secs(self.freshness_hours * 3600)
    }

    pub fn static_tier(&self) -> String {
        self.tier_name("static")
    }

    pub fn dynamic_tier(&self) -> String {
        self.tier_name("dynamic")
    }

    pub fn images_tier(&self) -> String {
        self.tier_name("images")
    }

    /// The complete set of tiers that survive activation.
    pub fn expected_tiers(&self) -> Vec<String> {
        vec![self.static_tier(), self.dynamic_tier(), self.images_tier()]
    }

    fn tier_name(&self, class: &str) -> String {
        format!("{}-{class}-{}", self.cache_prefix, self.cache_version)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `STORYLINE_`
    /// 2. TOML file from `STORYLINE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment().extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("STORYLINE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment.merge(
            Env::prefixed("STORYLINE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        )
    }
}
