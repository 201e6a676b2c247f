//! Wiring of configuration, storage and the client components.

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use storyline_client::{
    FetchConfig, FetchedResponse, Fetcher, HttpFetcher, OriginConfig, StoryApiClient, StrategyRouter,
    SubscriptionManager, SyncController,
};
use storyline_core::{
    AppConfig, CacheDb, CredentialStore, Error, MemoryCredentials, StoryStore, SubscriptionLedger, UnavailableStore,
};

use crate::device::ConfiguredRegistrationHost;

/// Fetcher used with `--offline`: every request fails as unreachable.
struct DisconnectedFetcher;

#[async_trait]
impl Fetcher for DisconnectedFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedResponse, Error> {
        Err(Error::remote(None, format!("offline: {url}")))
    }
}

pub struct App {
    pub config: AppConfig,
    db: CacheDb,
    store: Arc<dyn StoryStore>,
    ledger: Arc<dyn SubscriptionLedger>,
    credentials: Arc<dyn CredentialStore>,
    api: Arc<StoryApiClient>,
    offline: bool,
}

impl App {
    /// Open local storage and build the origin client.
    ///
    /// When the database cannot be opened the story store degrades to
    /// [`UnavailableStore`], credentials are kept in memory and the cache
    /// tiers live in a throwaway in-memory database.
    pub async fn open(config: AppConfig, offline: bool) -> Result<Self, Error> {
        let (db, store, ledger, credentials) = match CacheDb::open(&config.db_path).await {
            Ok(db) => (
                db.clone(),
                Arc::new(db.clone()) as Arc<dyn StoryStore>,
                Arc::new(db.clone()) as Arc<dyn SubscriptionLedger>,
                Arc::new(db) as Arc<dyn CredentialStore>,
            ),
            Err(e) => {
                tracing::warn!(error = %e, path = %config.db_path.display(), "local storage unavailable");
                let fallback = Arc::new(UnavailableStore::new(e.to_string()));
                (
                    CacheDb::open_in_memory().await?,
                    fallback.clone() as Arc<dyn StoryStore>,
                    fallback as Arc<dyn SubscriptionLedger>,
                    Arc::new(MemoryCredentials::new()) as Arc<dyn CredentialStore>,
                )
            }
        };

        let api = Arc::new(StoryApiClient::new(OriginConfig::from(&config), credentials.clone())?);

        Ok(Self { config, db, store, ledger, credentials, api, offline })
    }

    pub fn api(&self) -> &StoryApiClient {
        &self.api
    }

    pub fn credentials(&self) -> &dyn CredentialStore {
        self.credentials.as_ref()
    }

    pub fn sync(&self) -> SyncController {
        let controller = SyncController::new(self.store.clone(), self.api.clone(), self.credentials.clone())
            .with_freshness_window(self.config.freshness_window());
        controller.set_online(!self.offline);
        controller
    }

    pub fn router(&self) -> Result<StrategyRouter, Error> {
        let fetcher: Arc<dyn Fetcher> = if self.offline {
            Arc::new(DisconnectedFetcher)
        } else {
            Arc::new(HttpFetcher::new(FetchConfig::from(&self.config))?)
        };
        StrategyRouter::new(self.db.clone(), fetcher, &self.config)
    }

    pub fn subscriptions(&self, grant: bool) -> SubscriptionManager {
        let host = ConfiguredRegistrationHost::new(self.db.clone(), self.config.push.clone(), grant);
        SubscriptionManager::new(
            Arc::new(host),
            self.api.clone(),
            self.credentials.clone(),
            self.ledger.clone(),
            self.config.vapid_public_key.clone(),
        )
    }
}
