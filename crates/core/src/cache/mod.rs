//! SQLite-backed local persistence.
//!
//! One database file holds three independent areas:
//!
//! - the story store (cache envelopes with freshness metadata)
//! - the cache tiers (byte-level network responses, one table per concern)
//! - the settings table (credential and push subscription state)

pub mod connection;
pub mod hash;
pub mod migrations;
pub mod settings;
pub mod stories;
pub mod tiers;

pub use crate::Error;

pub use connection::CacheDb;
pub use tiers::TierEntry;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio_rusqlite::rusqlite;

/// Encode a timestamp losslessly, fixed width so text ordering matches time ordering.
pub(crate) fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Decode a timestamp column written by [`encode_ts`].
pub(crate) fn decode_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}
