//! Request model and resource classification.
//!
//! A request is classified once, into a [`ResourceClass`], and the router
//! switches on that tag exhaustively.

use std::collections::HashSet;

use url::Url;

use storyline_core::{AppConfig, Error};

use crate::fetch::{canonicalize, resolve};

/// What the requester intends to do with the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    Document,
    Image,
    Script,
    Style,
    Font,
    Manifest,
    #[default]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Full-page navigation.
    Navigate,
    #[default]
    Cors,
    NoCors,
    SameOrigin,
}

/// An outbound request seen by the interception host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedRequest {
    pub method: String,
    pub url: Url,
    pub destination: Destination,
    pub mode: RequestMode,
}

impl InterceptedRequest {
    /// A plain GET.
    pub fn get(url: Url) -> Self {
        Self { method: "GET".into(), url, destination: Destination::Other, mode: RequestMode::Cors }
    }

    /// A full-page navigation to `url`.
    pub fn navigate(url: Url) -> Self {
        Self { destination: Destination::Document, mode: RequestMode::Navigate, ..Self::get(url) }
    }

    pub fn image(url: Url) -> Self {
        Self { destination: Destination::Image, mode: RequestMode::NoCors, ..Self::get(url) }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Only reads are intercepted.
    pub fn is_read(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }
}

/// The fixed resource classes, each bound to exactly one strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    /// Application shell and static assets: cache-first, shell tier.
    Shell,
    /// Origin API data: network-first, dynamic tier.
    Api,
    /// Images: cache-first, media tier.
    Image,
    /// Everything else: network-first, no tier.
    Other,
}

/// Maps requests to resource classes.
#[derive(Debug, Clone)]
pub struct Classifier {
    asset_origin: Url,
    shell_paths: HashSet<String>,
    external_assets: HashSet<String>,
    api_host: String,
}

impl Classifier {
    pub fn new(
        asset_origin: Url, shell_paths: impl IntoIterator<Item = String>, external_assets: &[Url], api_host: String,
    ) -> Self {
        Self {
            asset_origin,
            shell_paths: shell_paths.into_iter().collect(),
            external_assets: external_assets.iter().map(|u| u.as_str().to_string()).collect(),
            api_host: api_host.to_ascii_lowercase(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let asset_origin = canonicalize(&config.asset_origin)?;
        let external_assets =
            config.external_assets.iter().map(|raw| canonicalize(raw)).collect::<Result<Vec<_>, _>>()?;
        let api_host = canonicalize(&config.api_base_url)?
            .host_str()
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidUrl(format!("{} has no host", config.api_base_url)))?;

        for path in &config.shell_assets {
            resolve(&asset_origin, path)?;
        }

        Ok(Self::new(asset_origin, config.shell_assets.iter().cloned(), &external_assets, api_host))
    }

    /// Classify a request whose URL has already been canonicalized.
    pub fn classify(&self, request: &InterceptedRequest) -> ResourceClass {
        let url = &request.url;

        let same_origin = url.origin() == self.asset_origin.origin();
        if (same_origin && self.shell_paths.contains(url.path())) || self.external_assets.contains(url.as_str()) {
            return ResourceClass::Shell;
        }

        if url.host_str().is_some_and(|host| host == self.api_host) {
            return ResourceClass::Api;
        }

        if request.destination == Destination::Image {
            return ResourceClass::Image;
        }

        ResourceClass::Other
    }
}
