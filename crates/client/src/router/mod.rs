//! Request interception and caching strategies.
//!
//! ### Strategies
//!
//! | Class  | Strategy      | Tier      | Failure fallback                              |
//! |--------|---------------|-----------|-----------------------------------------------|
//! | Shell  | cache-first   | static    | offline page for navigations, else none       |
//! | Api    | network-first | dynamic   | tier copy, else a synthesized offline body    |
//! | Image  | cache-first   | images    | offline placeholder image                     |
//! | Other  | network-first | none      | any tier copy, then offline page for navigations |
//!
//! Only responses with status 200 are stored. Tier read failures count as a
//! miss and tier write failures are logged; neither reaches the requester.
//!
//! ### Lifecycle
//!
//! - Install pre-fetches every shell asset and writes the successes in one batch.
//! - Activation deletes every tier outside the current expected set.

pub mod classify;

pub use classify::{Classifier, Destination, InterceptedRequest, RequestMode, ResourceClass};

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use url::Url;

use storyline_core::{AppConfig, CacheDb, Error, TierEntry};

use crate::fetch::{FetchedResponse, Fetcher, canonicalize, resolve};

const OFFLINE_API_MESSAGE: &str = "Unable to reach the server. Showing offline data.";

/// Where a routed response came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "tier")]
pub enum ResponseSource {
    Network,
    Tier(String),
    /// Offline fallback page or image from the shell tier.
    Fallback(String),
    /// Built locally because neither the network nor a tier could answer.
    Synthesized,
}

/// A response handed back to the requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl RoutedResponse {
    fn from_tier(entry: TierEntry, source: ResponseSource) -> Self {
        Self { status: entry.status, content_type: entry.content_type, body: Bytes::from(entry.body), source }
    }

    fn from_network(response: FetchedResponse) -> Self {
        Self {
            status: response.status,
            content_type: response.content_type,
            body: response.body,
            source: ResponseSource::Network,
        }
    }

    fn offline_api() -> Self {
        let body = serde_json::json!({ "error": true, "message": OFFLINE_API_MESSAGE });
        Self {
            status: 200,
            content_type: Some("application/json".into()),
            body: Bytes::from(body.to_string()),
            source: ResponseSource::Synthesized,
        }
    }
}

/// Outcome of intercepting one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interception {
    Respond(RoutedResponse),
    /// Intercepted, but nothing could be served.
    NoResponse,
    /// Not intercepted; the request goes to the network untouched.
    PassThrough,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub cached: usize,
    pub skipped: Vec<String>,
}

/// Lifecycle callbacks a platform drives the router through.
#[async_trait]
pub trait InterceptionHost: Send + Sync {
    /// Pre-fetch the shell tier.
    async fn on_install(&self) -> Result<InstallReport, Error>;

    /// Delete unexpected tiers, returning their names.
    async fn on_activate(&self) -> Result<Vec<String>, Error>;

    /// Serve one outbound request. Never fails: every failure maps to a fallback.
    async fn on_intercept(&self, request: &InterceptedRequest) -> Interception;
}

/// Names of the three tiers of the current cache version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierSet {
    pub shell: String,
    pub dynamic: String,
    pub media: String,
}

impl TierSet {
    pub fn from_config(config: &AppConfig) -> Self {
        Self { shell: config.static_tier(), dynamic: config.dynamic_tier(), media: config.images_tier() }
    }

    pub fn contains(&self, name: &str) -> bool {
        [&self.shell, &self.dynamic, &self.media].iter().any(|t| t.as_str() == name)
    }
}

/// Tier-backed strategy router.
pub struct StrategyRouter {
    db: CacheDb,
    fetcher: Arc<dyn Fetcher>,
    classifier: Classifier,
    tiers: TierSet,
    shell_urls: Vec<Url>,
    external_urls: Vec<Url>,
    offline_page: Url,
    offline_image: Url,
}

impl StrategyRouter {
    pub fn new(db: CacheDb, fetcher: Arc<dyn Fetcher>, config: &AppConfig) -> Result<Self, Error> {
        let origin = canonicalize(&config.asset_origin)?;
        let shell_urls = config.shell_assets.iter().map(|path| resolve(&origin, path)).collect::<Result<_, _>>()?;
        let external_urls = config.external_assets.iter().map(|raw| canonicalize(raw)).collect::<Result<_, _>>()?;

        Ok(Self {
            classifier: Classifier::from_config(config)?,
            tiers: TierSet::from_config(config),
            offline_page: resolve(&origin, &config.offline_page)?,
            offline_image: resolve(&origin, &config.offline_image)?,
            db,
            fetcher,
            shell_urls,
            external_urls,
        })
    }

    async fn lookup(&self, tier: &str, url: &Url) -> Option<TierEntry> {
        match self.db.match_tier(tier, url.as_str()).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(tier, %url, error = %e, "tier lookup failed; treating as miss");
                None
            }
        }
    }

    async fn lookup_any(&self, url: &Url) -> Option<TierEntry> {
        match self.db.match_any_tier(url.as_str()).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(%url, error = %e, "tier lookup failed; treating as miss");
                None
            }
        }
    }

    async fn store(&self, tier: &str, url: &Url, response: &FetchedResponse) {
        if response.status != 200 {
            return;
        }

        let entry = TierEntry::new(url.as_str(), response.status, response.content_type.clone(), response.body.to_vec());
        if let Err(e) = self.db.put_tier_entry(tier, &entry).await {
            tracing::warn!(tier, %url, error = %e, "failed to store response in tier");
        }
    }

    async fn fallback(&self, url: &Url) -> Interception {
        match self.lookup(&self.tiers.shell, url).await {
            Some(entry) => {
                Interception::Respond(RoutedResponse::from_tier(entry, ResponseSource::Fallback(url.to_string())))
            }
            None => {
                tracing::warn!(%url, "offline fallback missing from shell tier");
                Interception::NoResponse
            }
        }
    }

    /// Serve from `tier`, else fetch and store.
    async fn cache_first(&self, tier: &str, url: &Url) -> Result<Interception, Error> {
        if let Some(entry) = self.lookup(tier, url).await {
            tracing::debug!(tier, %url, "cache hit");
            return Ok(Interception::Respond(RoutedResponse::from_tier(entry, ResponseSource::Tier(tier.to_string()))));
        }

        tracing::debug!(tier, %url, "cache miss");
        let response = self.fetcher.fetch(url).await?;
        self.store(tier, url, &response).await;
        Ok(Interception::Respond(RoutedResponse::from_network(response)))
    }

    async fn serve_shell(&self, request: &InterceptedRequest) -> Interception {
        match self.cache_first(&self.tiers.shell, &request.url).await {
            Ok(served) => served,
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "shell fetch failed");
                if request.is_navigation() { self.fallback(&self.offline_page).await } else { Interception::NoResponse }
            }
        }
    }

    async fn serve_image(&self, request: &InterceptedRequest) -> Interception {
        match self.cache_first(&self.tiers.media, &request.url).await {
            Ok(served) => served,
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "image fetch failed");
                self.fallback(&self.offline_image).await
            }
        }
    }

    async fn serve_api(&self, request: &InterceptedRequest) -> Interception {
        let url = &request.url;
        match self.fetcher.fetch(url).await {
            Ok(response) => {
                self.store(&self.tiers.dynamic, url, &response).await;
                Interception::Respond(RoutedResponse::from_network(response))
            }
            Err(e) => {
                tracing::debug!(%url, error = %e, "api fetch failed");
                match self.lookup(&self.tiers.dynamic, url).await {
                    Some(entry) => Interception::Respond(RoutedResponse::from_tier(
                        entry,
                        ResponseSource::Tier(self.tiers.dynamic.clone()),
                    )),
                    None => Interception::Respond(RoutedResponse::offline_api()),
                }
            }
        }
    }

    async fn serve_other(&self, request: &InterceptedRequest) -> Interception {
        let url = &request.url;
        match self.fetcher.fetch(url).await {
            Ok(response) => Interception::Respond(RoutedResponse::from_network(response)),
            Err(e) => {
                tracing::debug!(%url, error = %e, "fetch failed");
                if let Some(entry) = self.lookup_any(url).await {
                    let source = ResponseSource::Tier("any".into());
                    return Interception::Respond(RoutedResponse::from_tier(entry, source));
                }
                if request.is_navigation() { self.fallback(&self.offline_page).await } else { Interception::NoResponse }
            }
        }
    }
}

#[async_trait]
impl InterceptionHost for StrategyRouter {
    async fn on_install(&self) -> Result<InstallReport, Error> {
        self.db.open_tier(&self.tiers.shell).await?;

        let mut entries = Vec::new();
        let mut skipped = Vec::new();

        for url in self.shell_urls.iter().chain(&self.external_urls) {
            match self.fetcher.fetch(url).await {
                Ok(response) if response.status == 200 => {
                    entries.push(TierEntry::new(url.as_str(), response.status, response.content_type, response.body.to_vec()));
                }
                Ok(response) => {
                    tracing::warn!(%url, status = response.status, "skipping shell asset");
                    skipped.push(url.to_string());
                }
                Err(e) => {
                    tracing::warn!(%url, error = %e, "skipping shell asset");
                    skipped.push(url.to_string());
                }
            }
        }

        let cached = self.db.put_tier_entries(&self.tiers.shell, entries).await?;
        tracing::info!(tier = %self.tiers.shell, cached, skipped = skipped.len(), "installed shell tier");

        Ok(InstallReport { cached, skipped })
    }

    async fn on_activate(&self) -> Result<Vec<String>, Error> {
        let mut deleted = Vec::new();

        for name in self.db.tier_names().await? {
            if !self.tiers.contains(&name) && self.db.delete_tier(&name).await? {
                tracing::info!(tier = %name, "deleted stale tier");
                deleted.push(name);
            }
        }

        Ok(deleted)
    }

    async fn on_intercept(&self, request: &InterceptedRequest) -> Interception {
        if !request.is_read() {
            return Interception::PassThrough;
        }

        let request = match canonicalize(request.url.as_str()) {
            Ok(url) => InterceptedRequest { url, ..request.clone() },
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "not interceptable");
                return Interception::PassThrough;
            }
        };

        match self.classifier.classify(&request) {
            ResourceClass::Shell => self.serve_shell(&request).await,
            ResourceClass::Api => self.serve_api(&request).await,
            ResourceClass::Image => self.serve_image(&request).await,
            ResourceClass::Other => self.serve_other(&request).await,
        }
    }
}
