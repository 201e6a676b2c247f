//! Named, versioned byte caches of network responses.
//!
//! A tier is a namespace of entries keyed by request hash. Deleting a tier
//! drops all of its entries with it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::CacheDb;
use super::hash::compute_request_key;
use super::{decode_ts, encode_ts};
use crate::Error;

/// A stored response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierEntry {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    #[serde(skip)]
    pub body: Vec<u8>,
    pub stored_at: DateTime<Utc>,
}

impl TierEntry {
    pub fn new(url: impl Into<String>, status: u16, content_type: Option<String>, body: Vec<u8>) -> Self {
        Self { url: url.into(), status, content_type, body, stored_at: Utc::now() }
    }
}

fn ensure_tier(conn: &rusqlite::Connection, tier: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO cache_tiers (name, created_at) VALUES (?1, ?2) ON CONFLICT(name) DO NOTHING",
        params![tier, encode_ts(&Utc::now())],
    )?;
    Ok(())
}

fn insert_entry(conn: &rusqlite::Connection, tier: &str, entry: &TierEntry) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO tier_entries (tier, key_hash, url, status, content_type, body, stored_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(tier, key_hash) DO UPDATE SET
             url = excluded.url,
             status = excluded.status,
             content_type = excluded.content_type,
             body = excluded.body,
             stored_at = excluded.stored_at",
        params![
            tier,
            compute_request_key("GET", &entry.url),
            &entry.url,
            entry.status,
            &entry.content_type,
            &entry.body,
            encode_ts(&entry.stored_at),
        ],
    )?;
    Ok(())
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TierEntry> {
    let stored_at: String = row.get(4)?;
    Ok(TierEntry {
        url: row.get(0)?,
        status: row.get(1)?,
        content_type: row.get(2)?,
        body: row.get(3)?,
        stored_at: decode_ts(4, &stored_at)?,
    })
}

impl CacheDb {
    /// Open (creating if needed) a named tier.
    pub async fn open_tier(&self, tier: &str) -> Result<(), Error> {
        let tier = tier.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                ensure_tier(conn, &tier)?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Names of every existing tier.
    pub async fn tier_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM cache_tiers ORDER BY name")?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a tier and its entries. Returns false when the tier did not exist.
    pub async fn delete_tier(&self, tier: &str) -> Result<bool, Error> {
        let tier = tier.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let tx = conn.unchecked_transaction()?;
                tx.execute("DELETE FROM tier_entries WHERE tier = ?1", params![&tier])?;
                let removed = tx.execute("DELETE FROM cache_tiers WHERE name = ?1", params![&tier])?;
                tx.commit()?;
                Ok(removed > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Store one entry, creating the tier when missing.
    pub async fn put_tier_entry(&self, tier: &str, entry: &TierEntry) -> Result<(), Error> {
        let tier = tier.to_string();
        let entry = entry.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.unchecked_transaction()?;
                ensure_tier(&tx, &tier)?;
                insert_entry(&tx, &tier, &entry)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Store a batch of entries atomically: either all are written or none.
    pub async fn put_tier_entries(&self, tier: &str, entries: Vec<TierEntry>) -> Result<usize, Error> {
        let tier = tier.to_string();
        self.conn
            .call(move |conn| -> Result<usize, Error> {
                let tx = conn.unchecked_transaction()?;
                ensure_tier(&tx, &tier)?;
                for entry in &entries {
                    insert_entry(&tx, &tier, entry)?;
                }
                tx.commit()?;
                Ok(entries.len())
            })
            .await
            .map_err(Error::from)
    }

    /// Look up a URL in one tier.
    pub async fn match_tier(&self, tier: &str, url: &str) -> Result<Option<TierEntry>, Error> {
        let tier = tier.to_string();
        let key = compute_request_key("GET", url);
        self.conn
            .call(move |conn| -> Result<Option<TierEntry>, Error> {
                let result = conn.query_row(
                    "SELECT url, status, content_type, body, stored_at
                     FROM tier_entries WHERE tier = ?1 AND key_hash = ?2",
                    params![tier, key],
                    entry_from_row,
                );

                match result {
                    Ok(entry) => Ok(Some(entry)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Look up a URL across every tier, most recently stored first.
    pub async fn match_any_tier(&self, url: &str) -> Result<Option<TierEntry>, Error> {
        let key = compute_request_key("GET", url);
        self.conn
            .call(move |conn| -> Result<Option<TierEntry>, Error> {
                let result = conn.query_row(
                    "SELECT url, status, content_type, body, stored_at
                     FROM tier_entries WHERE key_hash = ?1
                     ORDER BY stored_at DESC LIMIT 1",
                    params![key],
                    entry_from_row,
                );

                match result {
                    Ok(entry) => Ok(Some(entry)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries in a tier.
    pub async fn tier_len(&self, tier: &str) -> Result<usize, Error> {
        let tier = tier.to_string();
        self.conn
            .call(move |conn| -> Result<usize, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM tier_entries WHERE tier = ?1", params![tier], |row| {
                        row.get(0)
                    })?;
                Ok(count as usize)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str, body: &str) -> TierEntry {
        TierEntry::new(url, 200, Some("text/html".to_string()), body.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_put_and_match() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_tier_entry("story-app-static-v2", &entry("http://localhost/index.html", "<html>"))
            .await
            .unwrap();

        let hit = db.match_tier("story-app-static-v2", "http://localhost/index.html").await.unwrap().unwrap();
        assert_eq!(hit.body, b"<html>");
        assert_eq!(hit.status, 200);

        let miss = db.match_tier("story-app-dynamic-v2", "http://localhost/index.html").await.unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn test_overwrite_same_url() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_tier_entry("t", &entry("http://localhost/a", "one")).await.unwrap();
        db.put_tier_entry("t", &entry("http://localhost/a", "two")).await.unwrap();

        assert_eq!(db.tier_len("t").await.unwrap(), 1);
        let hit = db.match_tier("t", "http://localhost/a").await.unwrap().unwrap();
        assert_eq!(hit.body, b"two");
    }

    #[tokio::test]
    async fn test_match_any_tier() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_tier_entry("images", &entry("http://localhost/a.png", "png")).await.unwrap();

        let hit = db.match_any_tier("http://localhost/a.png").await.unwrap();
        assert!(hit.is_some());
        assert!(db.match_any_tier("http://localhost/b.png").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_batch_write() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let written = db
            .put_tier_entries("static", vec![entry("http://localhost/", "root"), entry("http://localhost/app.js", "js")])
            .await
            .unwrap();

        assert_eq!(written, 2);
        assert_eq!(db.tier_len("static").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete_tier_drops_entries() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_tier_entry("old-v1", &entry("http://localhost/a", "a")).await.unwrap();
        db.open_tier("new-v2").await.unwrap();

        assert!(db.delete_tier("old-v1").await.unwrap());
        assert!(!db.delete_tier("old-v1").await.unwrap());

        assert_eq!(db.tier_names().await.unwrap(), vec!["new-v2".to_string()]);
        assert!(db.match_any_tier("http://localhost/a").await.unwrap().is_none());
    }
}
