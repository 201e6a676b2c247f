//! Storage seams shared by the synchronization and subscription components.
//!
//! The SQLite [`CacheDb`](crate::CacheDb) implements every trait here. When
//! the persistent store cannot be opened, [`UnavailableStore`] stands in so the
//! rest of the client keeps running without a cache.

use async_trait::async_trait;

use crate::Error;
use crate::model::{CacheEnvelope, StorageStats, Story, SubscriptionRecord};

/// Keyed record storage with per-record cache metadata.
#[async_trait]
pub trait StoryStore: Send + Sync {
    /// Write or overwrite the envelope for `story.id` as a confirmed record.
    async fn put(&self, story: &Story) -> Result<(), Error>;

    /// Write or overwrite the envelope for `story.id` flagged as authored offline.
    async fn put_offline(&self, story: &Story) -> Result<(), Error>;

    /// Apply `put` to every record. Successful writes are kept even when
    /// others fail; any failure is reported as [`Error::PartialWrite`].
    async fn put_all(&self, stories: &[Story]) -> Result<(), Error>;

    /// Envelope for `id`, or `None` when absent.
    async fn get(&self, id: &str) -> Result<Option<CacheEnvelope>, Error>;

    /// Every envelope, in no particular order.
    async fn get_all(&self) -> Result<Vec<CacheEnvelope>, Error>;

    /// Envelopes still flagged as authored offline.
    async fn offline_records(&self) -> Result<Vec<CacheEnvelope>, Error>;

    /// Mark every envelope whose id is not in `confirmed_ids` as cache-only.
    ///
    /// Returns the number of envelopes that lost confirmation.
    async fn reconcile(&self, confirmed_ids: &[String]) -> Result<u64, Error>;

    /// Remove the envelope for `id`. Absent ids are not an error.
    async fn delete(&self, id: &str) -> Result<(), Error>;

    /// Remove every envelope.
    async fn clear(&self) -> Result<(), Error>;

    /// Statistics over the current envelope set.
    async fn stats(&self) -> Result<StorageStats, Error>;
}

/// On-device persistence of the push subscription state.
#[async_trait]
pub trait SubscriptionLedger: Send + Sync {
    async fn load_subscription(&self) -> Result<Option<SubscriptionRecord>, Error>;

    async fn save_subscription(&self, record: &SubscriptionRecord) -> Result<(), Error>;

    async fn clear_subscription(&self) -> Result<(), Error>;
}

/// Store used when persistent storage is absent or denied.
#[derive(Debug, Clone)]
pub struct UnavailableStore {
    reason: String,
}

impl UnavailableStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }

    fn unavailable(&self) -> Error {
        Error::StorageUnavailable(self.reason.clone())
    }
}

#[async_trait]
impl StoryStore for UnavailableStore {
    async fn put(&self, _story: &Story) -> Result<(), Error> {
        Err(self.unavailable())
    }

    async fn put_offline(&self, _story: &Story) -> Result<(), Error> {
        Err(self.unavailable())
    }

    async fn put_all(&self, _stories: &[Story]) -> Result<(), Error> {
        Err(self.unavailable())
    }

    async fn get(&self, _id: &str) -> Result<Option<CacheEnvelope>, Error> {
        Err(self.unavailable())
    }

    async fn get_all(&self) -> Result<Vec<CacheEnvelope>, Error> {
        // Never initialized and never written to.
        Ok(Vec::new())
    }

    async fn offline_records(&self) -> Result<Vec<CacheEnvelope>, Error> {
        Err(self.unavailable())
    }

    async fn reconcile(&self, _confirmed_ids: &[String]) -> Result<u64, Error> {
        Err(self.unavailable())
    }

    async fn delete(&self, _id: &str) -> Result<(), Error> {
        Err(self.unavailable())
    }

    async fn clear(&self) -> Result<(), Error> {
        Err(self.unavailable())
    }

    async fn stats(&self) -> Result<StorageStats, Error> {
        Err(self.unavailable())
    }
}

#[async_trait]
impl SubscriptionLedger for UnavailableStore {
    async fn load_subscription(&self) -> Result<Option<SubscriptionRecord>, Error> {
        Err(self.unavailable())
    }

    async fn save_subscription(&self, _record: &SubscriptionRecord) -> Result<(), Error> {
        Err(self.unavailable())
    }

    async fn clear_subscription(&self) -> Result<(), Error> {
        Err(self.unavailable())
    }
}
