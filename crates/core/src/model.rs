//! Domain records and the caching metadata wrapped around them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix for ids assigned to records authored while disconnected.
pub const OFFLINE_ID_PREFIX: &str = "offline-";

/// A geographic point. Latitude and longitude are always present together.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    /// Build a location only when both coordinates are present.
    pub fn from_parts(lat: Option<f64>, lon: Option<f64>) -> Option<Self> {
        match (lat, lon) {
            (Some(lat), Some(lon)) => Some(Self { lat, lon }),
            _ => None,
        }
    }
}

/// A story: user-authored content with an optional location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Remote URL or local blob reference.
    pub photo_reference: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub created_at: DateTime<Utc>,
}

impl Story {
    /// Create a record authored on this device while the origin is unreachable.
    ///
    /// The id is generated locally and `created_at` is the client clock.
    pub fn authored_offline(
        name: impl Into<String>, description: impl Into<String>, photo_reference: impl Into<String>,
        location: Option<Location>,
    ) -> Self {
        Self {
            id: format!("{OFFLINE_ID_PREFIX}{}", uuid::Uuid::now_v7()),
            name: name.into(),
            description: description.into(),
            photo_reference: photo_reference.into(),
            location,
            created_at: Utc::now(),
        }
    }

    /// True when the id was assigned locally rather than by the origin.
    pub fn has_local_id(&self) -> bool {
        self.id.starts_with(OFFLINE_ID_PREFIX)
    }
}

/// A record plus local caching metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEnvelope {
    pub record: Story,
    /// Time of the last local write.
    pub cached_at: DateTime<Utc>,
    /// Authored while disconnected and not yet confirmed by the origin.
    pub is_offline: bool,
    /// The origin does not currently confirm this record.
    pub is_cache_only: bool,
}

/// Aggregate figures over every envelope in the local store.
///
/// Always computed from the current envelope set, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    pub total_records: usize,
    pub oldest_cache_timestamp: Option<DateTime<Utc>>,
    pub newest_cache_timestamp: Option<DateTime<Utc>>,
    pub estimated_byte_size: usize,
}

impl StorageStats {
    /// Compute statistics from a full envelope set.
    pub fn from_envelopes(envelopes: &[CacheEnvelope]) -> Self {
        if envelopes.is_empty() {
            return Self::default();
        }

        let oldest = envelopes.iter().map(|e| e.cached_at).min();
        let newest = envelopes.iter().map(|e| e.cached_at).max();
        let estimated_byte_size = serde_json::to_vec(envelopes).map(|v| v.len()).unwrap_or(0);

        Self {
            total_records: envelopes.len(),
            oldest_cache_timestamp: oldest,
            newest_cache_timestamp: newest,
            estimated_byte_size,
        }
    }
}

/// Key material of a push subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

/// Platform push subscription handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscription {
    pub endpoint: String,
    pub keys: PushKeys,
}

/// Locally recorded state of the notification subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    pub subscription: PushSubscription,
    pub remote_confirmed: bool,
    /// Persisted on-device only because remote confirmation could not be obtained.
    pub local_fallback: bool,
    pub last_change: DateTime<Utc>,
}
