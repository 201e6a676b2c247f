//! Story synchronization between the origin and the local store.
//!
//! The controller decides per call whether to ask the origin, falls back to
//! the local store when the origin cannot answer, and tags every result with
//! its [`Provenance`]. Writes to the local store that only serve as a cache
//! are logged and swallowed; reads that are the only source of data surface
//! their errors.
//!
//! Connectivity changes only flip a flag. Nothing refreshes until the next
//! explicit read.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;

use storyline_core::model::OFFLINE_ID_PREFIX;
use storyline_core::{CacheEnvelope, CredentialStore, Error, StorageStats, Story, StoryStore};

use crate::origin::{NewStory, Origin, Photo};

/// Default freshness window.
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Where returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Fetched from the origin during this call.
    Live,
    /// Read from the local store while connected.
    Cache,
    /// Read from the local store while disconnected.
    Offline,
}

/// Data plus its provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Synced<T> {
    pub data: T,
    pub provenance: Provenance,
}

impl<T> Synced<T> {
    pub fn using_cache(&self) -> bool {
        self.provenance != Provenance::Live
    }
}

/// Result of submitting a new story.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "story")]
pub enum CreateOutcome {
    /// Accepted by the origin.
    Published,
    /// The origin was unreachable; kept locally as an offline-authored story.
    SavedOffline(Story),
}

/// Offline-authored stories first, newest first, then the rest newest first.
fn order(mut envelopes: Vec<CacheEnvelope>) -> Vec<Story> {
    envelopes.sort_by_key(|e| (!e.is_offline, Reverse(e.record.created_at)));
    envelopes.into_iter().map(|e| e.record).collect()
}

/// Error for an id the local store does not hold and the origin was not asked about.
///
/// Only a disconnected device reports `NotFoundOffline`. While online this
/// happens for locally minted ids, which the origin never issues.
fn missing_locally(id: &str, online: bool) -> Error {
    if online {
        Error::InvalidInput(format!("no story with local id {id} on this device"))
    } else {
        Error::NotFoundOffline(id.to_string())
    }
}

/// Orchestrates story reads and writes across the origin and the local store.
pub struct SyncController {
    store: Arc<dyn StoryStore>,
    origin: Arc<dyn Origin>,
    credentials: Arc<dyn CredentialStore>,
    online: AtomicBool,
    using_cache: AtomicBool,
    freshness_window: Duration,
    author_name: String,
    refresh_guard: Mutex<()>,
}

impl SyncController {
    pub fn new(store: Arc<dyn StoryStore>, origin: Arc<dyn Origin>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            origin,
            credentials,
            online: AtomicBool::new(true),
            using_cache: AtomicBool::new(false),
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
            author_name: "You".into(),
            refresh_guard: Mutex::new(()),
        }
    }

    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    /// Name shown on stories authored while offline.
    pub fn with_author_name(mut self, name: impl Into<String>) -> Self {
        self.author_name = name.into();
        self
    }

    /// Record a connectivity transition. Never triggers a refresh.
    pub fn set_online(&self, online: bool) {
        let was = self.online.swap(online, Ordering::SeqCst);
        if was != online {
            tracing::info!(online, "connectivity changed");
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Whether the most recent read was answered from the local store.
    pub fn using_cache(&self) -> bool {
        self.using_cache.load(Ordering::SeqCst)
    }

    fn tag<T>(&self, data: T, provenance: Provenance) -> Synced<T> {
        self.using_cache.store(provenance != Provenance::Live, Ordering::SeqCst);
        Synced { data, provenance }
    }

    fn local_provenance(&self) -> Provenance {
        if self.is_online() { Provenance::Cache } else { Provenance::Offline }
    }

    /// True when the store is empty, its newest entry is older than the
    /// freshness window, or its statistics cannot be read.
    pub async fn is_stale(&self) -> bool {
        let stats = match self.store.stats().await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::debug!(error = %e, "cannot read cache statistics; treating as stale");
                return true;
            }
        };

        match stats.newest_cache_timestamp {
            Some(newest) if stats.total_records > 0 => {
                let age = Utc::now().signed_duration_since(newest);
                age.to_std().is_ok_and(|age| age > self.freshness_window)
            }
            _ => true,
        }
    }

    /// Persist a fresh origin listing and return it with any offline-authored stories in front.
    async fn accept_remote(&self, records: Vec<Story>) -> Synced<Vec<Story>> {
        if let Err(e) = self.store.put_all(&records).await {
            tracing::warn!(error = %e, "failed to cache fetched stories");
        }

        let ids: Vec<String> = records.iter().map(|s| s.id.clone()).collect();
        match self.store.reconcile(&ids).await {
            Ok(0) => {}
            Ok(count) => tracing::debug!(count, "stories no longer confirmed by origin"),
            Err(e) => tracing::warn!(error = %e, "failed to reconcile cached stories"),
        }

        let offline = match self.store.offline_records().await {
            Ok(offline) => offline,
            Err(e) => {
                tracing::debug!(error = %e, "cannot read offline stories");
                Vec::new()
            }
        };

        let known: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut data: Vec<Story> = order(offline).into_iter().filter(|s| !known.contains(s.id.as_str())).collect();
        let mut live = records;
        live.sort_by_key(|s| Reverse(s.created_at));
        data.extend(live);

        tracing::debug!(count = data.len(), "stories refreshed from origin");
        self.tag(data, Provenance::Live)
    }

    /// List stories.
    ///
    /// Asks the origin when online and either `force_refresh` is set or the
    /// cache is stale. Otherwise, or when the origin fails, answers from the
    /// local store. An empty store while offline yields an empty list. An
    /// empty store while online gets one last attempt at the origin unless
    /// this call already asked it, and that error is surfaced.
    pub async fn get_all_records(&self, force_refresh: bool) -> Result<Synced<Vec<Story>>, Error> {
        let _guard = self.refresh_guard.lock().await;

        let online = self.is_online();
        let mut remote_error = None;

        if online && (force_refresh || self.is_stale().await) {
            match self.origin.list_records().await {
                Ok(records) => return Ok(self.accept_remote(records).await),
                Err(e) => {
                    tracing::warn!(error = %e, "origin list failed; falling back to local store");
                    remote_error = Some(e);
                }
            }
        }

        match self.store.get_all().await {
            Ok(envelopes) if !envelopes.is_empty() => {
                return Ok(self.tag(order(envelopes), self.local_provenance()));
            }
            Ok(_) if !online => return Ok(self.tag(Vec::new(), Provenance::Offline)),
            Ok(_) => {}
            Err(e) if !online => return Err(e),
            Err(e) => tracing::warn!(error = %e, "local store unreadable"),
        }

        if let Some(e) = remote_error {
            return Err(e);
        }

        let records = self.origin.list_records().await?;
        Ok(self.accept_remote(records).await)
    }

    /// `get_all_records(true)`.
    pub async fn refresh(&self) -> Result<Synced<Vec<Story>>, Error> {
        self.get_all_records(true).await
    }

    /// Fetch one story, preferring the origin when online.
    pub async fn get_record_by_id(&self, id: &str) -> Result<Synced<Story>, Error> {
        let online = self.is_online();
        let mut remote_error = None;

        if online && !id.starts_with(OFFLINE_ID_PREFIX) {
            match self.origin.get_record(id).await {
                Ok(story) => {
                    if let Err(e) = self.store.put(&story).await {
                        tracing::warn!(id, error = %e, "failed to cache fetched story");
                    }
                    return Ok(self.tag(story, Provenance::Live));
                }
                Err(e) => {
                    tracing::warn!(id, error = %e, "origin detail failed; falling back to local store");
                    remote_error = Some(e);
                }
            }
        }

        match self.store.get(id).await {
            Ok(Some(envelope)) => Ok(self.tag(envelope.record, self.local_provenance())),
            Ok(None) => Err(remote_error.unwrap_or_else(|| missing_locally(id, online))),
            Err(e) => Err(remote_error.unwrap_or(e)),
        }
    }

    /// Keep a story authored while the origin was unreachable.
    ///
    /// It is visible to the very next listing, ahead of origin stories.
    pub async fn add_offline_record(&self, story: &Story) -> Result<(), Error> {
        self.store.put_offline(story).await?;
        tracing::info!(id = %story.id, "stored offline-authored story");
        Ok(())
    }

    /// Publish a story, keeping it locally when the origin cannot be reached.
    ///
    /// Rejections from a reachable origin are returned as errors.
    pub async fn create_record(&self, draft: &NewStory, photo: &Photo) -> Result<CreateOutcome, Error> {
        draft.validate()?;

        let credential = self
            .credentials
            .get_credential()
            .await?
            .ok_or_else(|| Error::SessionExpired("log in before publishing stories".into()))?;

        if self.is_online() {
            match self.origin.create_record(draft, photo, &credential).await {
                Ok(()) => {
                    tracing::info!("story published");
                    return Ok(CreateOutcome::Published);
                }
                Err(e) if e.is_unreachable() => {
                    tracing::warn!(error = %e, "origin unreachable; keeping story offline");
                }
                Err(e) => return Err(e),
            }
        }

        let story = Story::authored_offline(
            self.author_name.clone(),
            draft.description.clone(),
            photo.local_reference(),
            draft.location,
        );
        self.add_offline_record(&story).await?;

        Ok(CreateOutcome::SavedOffline(story))
    }

    /// Every cached story, in display order.
    pub async fn cached_records(&self) -> Result<Vec<CacheEnvelope>, Error> {
        let mut envelopes = self.store.get_all().await?;
        envelopes.sort_by_key(|e| (!e.is_offline, Reverse(e.record.created_at)));
        Ok(envelopes)
    }

    pub async fn offline_created_records(&self) -> Result<Vec<CacheEnvelope>, Error> {
        let mut envelopes = self.store.offline_records().await?;
        envelopes.sort_by_key(|e| Reverse(e.record.created_at));
        Ok(envelopes)
    }

    pub async fn delete_cached(&self, id: &str) -> Result<(), Error> {
        self.store.delete(id).await
    }

    pub async fn clear_cache(&self) -> Result<(), Error> {
        let _guard = self.refresh_guard.lock().await;
        self.store.clear().await
    }

    pub async fn storage_stats(&self) -> Result<StorageStats, Error> {
        self.store.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockOrigin, story};
    use storyline_core::{CacheDb, MemoryCredentials, UnavailableStore};

    struct Fixture {
        db: CacheDb,
        origin: Arc<MockOrigin>,
        sync: SyncController,
    }

    async fn fixture(origin: MockOrigin) -> Fixture {
        let db = CacheDb::open_in_memory().await.unwrap();
        let origin = Arc::new(origin);
        let sync = SyncController::new(
            Arc::new(db.clone()),
            origin.clone(),
            Arc::new(MemoryCredentials::with_token("token")),
        );
        Fixture { db, origin, sync }
    }

    fn photo() -> Photo {
        Photo { file_name: "beach.jpg".into(), mime_type: "image/jpeg".into(), bytes: vec![0xff, 0xd8] }
    }

    #[tokio::test]
    async fn test_remote_success_populates_store() {
        let f = fixture(MockOrigin::with_stories(vec![story("1", "A")])).await;

        let result = f.sync.get_all_records(false).await.unwrap();
        assert_eq!(result.data.len(), 1);
        assert_eq!(result.data[0].id, "1");
        assert_eq!(result.provenance, Provenance::Live);
        assert!(!f.sync.using_cache());

        let envelope = f.db.get("1").await.unwrap().unwrap();
        assert_eq!(envelope.record.name, "A");
    }

    #[tokio::test]
    async fn test_network_failure_serves_cache() {
        let f = fixture(MockOrigin::unreachable()).await;
        f.db.put(&story("2", "B")).await.unwrap();

        let result = f.sync.get_all_records(true).await.unwrap();
        assert_eq!(result.data.len(), 1);
        assert_eq!(result.data[0].id, "2");
        assert!(result.using_cache());
        assert!(f.sync.using_cache());
    }

    #[tokio::test]
    async fn test_offline_empty_store_is_empty_list() {
        let f = fixture(MockOrigin::unreachable()).await;
        f.sync.set_online(false);

        let result = f.sync.get_all_records(false).await.unwrap();
        assert!(result.data.is_empty());
        assert_eq!(result.provenance, Provenance::Offline);
        assert_eq!(f.origin.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_force_refresh_persists_everything() {
        let f = fixture(MockOrigin::with_stories(vec![story("1", "A"), story("2", "B"), story("3", "C")])).await;
        f.db.put(&story("1", "old")).await.unwrap();

        let result = f.sync.get_all_records(true).await.unwrap();
        assert!(!result.using_cache());
        assert_eq!(f.db.get_all().await.unwrap().len(), 3);
        assert_eq!(f.db.get("1").await.unwrap().unwrap().record.name, "A");
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_origin() {
        let f = fixture(MockOrigin::with_stories(vec![story("1", "A")])).await;
        f.db.put(&story("9", "cached")).await.unwrap();

        let result = f.sync.get_all_records(false).await.unwrap();
        assert_eq!(result.data[0].id, "9");
        assert_eq!(result.provenance, Provenance::Cache);
        assert_eq!(f.origin.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_stale_cache_refreshes() {
        let f = fixture(MockOrigin::with_stories(vec![story("1", "A")])).await;
        f.db.put(&story("9", "cached")).await.unwrap();
        let sync = f.sync.with_freshness_window(Duration::ZERO);

        tokio::time::sleep(Duration::from_millis(5)).await;
        let result = sync.get_all_records(false).await.unwrap();
        assert_eq!(result.provenance, Provenance::Live);
        assert_eq!(f.origin.list_calls(), 1);

        // The origin no longer lists story 9.
        assert!(f.db.get("9").await.unwrap().unwrap().is_cache_only);
    }

    #[tokio::test]
    async fn test_online_empty_store_surfaces_error() {
        let f = fixture(MockOrigin::unreachable()).await;

        let err = f.sync.get_all_records(false).await.unwrap_err();
        assert!(err.is_unreachable());
        // Step one already asked the origin; no second attempt.
        assert_eq!(f.origin.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_offline_record_visible_without_network() {
        let f = fixture(MockOrigin::unreachable()).await;
        f.sync.set_online(false);

        let offline = Story::authored_offline("me", "on the train", "local://train.jpg", None);
        f.sync.add_offline_record(&offline).await.unwrap();

        let found = f.sync.get_record_by_id(&offline.id).await.unwrap();
        assert_eq!(found.data, offline);
        assert_eq!(found.provenance, Provenance::Offline);

        let listed = f.sync.get_all_records(false).await.unwrap();
        assert_eq!(listed.data[0].id, offline.id);
    }

    #[tokio::test]
    async fn test_offline_records_lead_live_listing() {
        let f = fixture(MockOrigin::with_stories(vec![story("1", "A")])).await;
        let offline = Story::authored_offline("me", "draft", "local://a.jpg", None);
        f.sync.add_offline_record(&offline).await.unwrap();

        let result = f.sync.refresh().await.unwrap();
        let ids: Vec<&str> = result.data.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec![offline.id.as_str(), "1"]);
    }

    #[tokio::test]
    async fn test_ordering_newest_first() {
        let f = fixture(MockOrigin::unreachable()).await;
        f.sync.set_online(false);

        let mut older = story("old", "A");
        older.created_at = Utc::now() - chrono::Duration::days(2);
        f.db.put_all(&[older, story("new", "B")]).await.unwrap();

        let result = f.sync.get_all_records(false).await.unwrap();
        assert_eq!(result.data[0].id, "new");
        assert_eq!(result.data[1].id, "old");
    }

    #[tokio::test]
    async fn test_get_record_caches_live_result() {
        let f = fixture(MockOrigin::with_stories(vec![story("7", "G")])).await;

        let result = f.sync.get_record_by_id("7").await.unwrap();
        assert_eq!(result.provenance, Provenance::Live);
        assert!(f.db.get("7").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_get_record_missing_offline() {
        let f = fixture(MockOrigin::unreachable()).await;
        f.sync.set_online(false);

        let err = f.sync.get_record_by_id("nope").await.unwrap_err();
        assert!(matches!(err, Error::NotFoundOffline(id) if id == "nope"));
        assert_eq!(f.origin.get_calls(), 0);
    }

    #[tokio::test]
    async fn test_get_record_unknown_local_id_online() {
        let f = fixture(MockOrigin::with_stories(Vec::new())).await;

        let err = f.sync.get_record_by_id("offline-abc").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(f.origin.get_calls(), 0);
    }

    #[tokio::test]
    async fn test_get_record_falls_back_when_origin_fails() {
        let f = fixture(MockOrigin::unreachable()).await;
        f.db.put(&story("5", "E")).await.unwrap();

        let result = f.sync.get_record_by_id("5").await.unwrap();
        assert_eq!(result.provenance, Provenance::Cache);
        assert!(f.sync.using_cache());
    }

    #[tokio::test]
    async fn test_create_record_online() {
        let f = fixture(MockOrigin::with_stories(Vec::new())).await;

        let outcome = f.sync.create_record(&NewStory::new("sunset", None, None), &photo()).await.unwrap();
        assert_eq!(outcome, CreateOutcome::Published);
        assert_eq!(f.origin.create_calls(), 1);
        assert!(f.db.offline_records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_record_unreachable_goes_offline() {
        let f = fixture(MockOrigin::unreachable()).await;

        let outcome = f.sync.create_record(&NewStory::new("sunset", Some(1.0), Some(2.0)), &photo()).await.unwrap();
        let CreateOutcome::SavedOffline(story) = outcome else { panic!("expected offline story") };

        assert!(story.has_local_id());
        assert_eq!(story.photo_reference, "local://beach.jpg");
        assert_eq!(f.db.offline_records().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_record_rejection_is_surfaced() {
        let f = fixture(MockOrigin::rejecting(400, "photo is required")).await;

        let err = f.sync.create_record(&NewStory::new("sunset", None, None), &photo()).await.unwrap_err();
        assert!(matches!(err, Error::Remote { status: Some(400), .. }));
        assert!(f.db.offline_records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_record_requires_credential() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let sync = SyncController::new(
            Arc::new(db),
            Arc::new(MockOrigin::with_stories(Vec::new())),
            Arc::new(MemoryCredentials::new()),
        );

        let err = sync.create_record(&NewStory::new("sunset", None, None), &photo()).await.unwrap_err();
        assert!(matches!(err, Error::SessionExpired(_)));
    }

    #[tokio::test]
    async fn test_connectivity_change_does_not_refresh() {
        let f = fixture(MockOrigin::with_stories(vec![story("1", "A")])).await;
        f.sync.set_online(false);
        f.sync.set_online(true);
        assert_eq!(f.origin.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_runs_without_persistent_storage() {
        let origin = Arc::new(MockOrigin::with_stories(vec![story("1", "A")]));
        let sync = SyncController::new(
            Arc::new(UnavailableStore::new("denied")),
            origin,
            Arc::new(MemoryCredentials::new()),
        );

        let result = sync.get_all_records(false).await.unwrap();
        assert_eq!(result.data.len(), 1);
        assert_eq!(result.provenance, Provenance::Live);

        sync.set_online(false);
        let offline = sync.get_all_records(false).await.unwrap();
        assert!(offline.data.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_serialize() {
        let f = fixture(MockOrigin::with_stories(vec![story("1", "A"), story("2", "B")])).await;
        let sync = Arc::new(f.sync);

        let a = tokio::spawn({
            let sync = sync.clone();
            async move { sync.refresh().await }
        });
        let b = tokio::spawn({
            let sync = sync.clone();
            async move { sync.refresh().await }
        });

        assert_eq!(a.await.unwrap().unwrap().data.len(), 2);
        assert_eq!(b.await.unwrap().unwrap().data.len(), 2);
        assert_eq!(f.db.get_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cache_management_passthrough() {
        let f = fixture(MockOrigin::unreachable()).await;
        f.db.put_all(&[story("1", "A"), story("2", "B")]).await.unwrap();

        assert_eq!(f.sync.cached_records().await.unwrap().len(), 2);
        f.sync.delete_cached("1").await.unwrap();
        assert_eq!(f.sync.storage_stats().await.unwrap().total_records, 1);
        f.sync.clear_cache().await.unwrap();
        assert_eq!(f.sync.storage_stats().await.unwrap().total_records, 0);
    }
}
