//! Story store operations.
//!
//! Every record lives in exactly one envelope row keyed by id. Overwrites
//! keep `cached_at` monotonically non-decreasing.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use tokio_rusqlite::{params, rusqlite};

use super::connection::CacheDb;
use super::{decode_ts, encode_ts};
use crate::Error;
use crate::model::{CacheEnvelope, Location, StorageStats, Story};
use crate::store::StoryStore;

const UPSERT_STORY: &str = "INSERT INTO stories (
        id, name, description, photo_reference, lat, lon,
        created_at, cached_at, is_offline, confirmed
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
    ON CONFLICT(id) DO UPDATE SET
        name = excluded.name,
        description = excluded.description,
        photo_reference = excluded.photo_reference,
        lat = excluded.lat,
        lon = excluded.lon,
        created_at = excluded.created_at,
        cached_at = MAX(excluded.cached_at, stories.cached_at),
        is_offline = excluded.is_offline,
        confirmed = excluded.confirmed";

const SELECT_ENVELOPE: &str = "SELECT
        id, name, description, photo_reference, lat, lon,
        created_at, cached_at, is_offline, confirmed
    FROM stories";

fn upsert(conn: &rusqlite::Connection, story: &Story, offline: bool, cached_at: &str) -> rusqlite::Result<usize> {
    let (lat, lon) = match story.location {
        Some(Location { lat, lon }) => (Some(lat), Some(lon)),
        None => (None, None),
    };

    conn.execute(
        UPSERT_STORY,
        params![
            &story.id,
            &story.name,
            &story.description,
            &story.photo_reference,
            lat,
            lon,
            encode_ts(&story.created_at),
            cached_at,
            offline as i32,
            (!offline) as i32,
        ],
    )
}

fn envelope_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CacheEnvelope> {
    let created_at: String = row.get(6)?;
    let cached_at: String = row.get(7)?;

    Ok(CacheEnvelope {
        record: Story {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            photo_reference: row.get(3)?,
            location: Location::from_parts(row.get(4)?, row.get(5)?),
            created_at: decode_ts(6, &created_at)?,
        },
        cached_at: decode_ts(7, &cached_at)?,
        is_offline: row.get::<_, i32>(8)? == 1,
        is_cache_only: row.get::<_, i32>(9)? == 0,
    })
}

impl CacheDb {
    async fn write_story(&self, story: &Story, offline: bool) -> Result<(), Error> {
        let story = story.clone();
        let cached_at = encode_ts(&Utc::now());
        self.conn
            .call(move |conn| -> Result<(), Error> {
                upsert(conn, &story, offline, &cached_at)?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn select_envelopes(&self, filter: &'static str) -> Result<Vec<CacheEnvelope>, Error> {
        self.conn
            .call(move |conn| -> Result<Vec<CacheEnvelope>, Error> {
                let sql = format!("{SELECT_ENVELOPE} {filter} ORDER BY created_at DESC");
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([], envelope_from_row)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(Error::from)
    }
}

#[async_trait]
impl StoryStore for CacheDb {
    async fn put(&self, story: &Story) -> Result<(), Error> {
        self.write_story(story, false).await
    }

    async fn put_offline(&self, story: &Story) -> Result<(), Error> {
        self.write_story(story, true).await
    }

    async fn put_all(&self, stories: &[Story]) -> Result<(), Error> {
        if stories.is_empty() {
            return Ok(());
        }

        let stories = stories.to_vec();
        let cached_at = encode_ts(&Utc::now());
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.unchecked_transaction()?;
                let mut failed = Vec::new();

                for story in &stories {
                    if let Err(e) = upsert(&tx, story, false, &cached_at) {
                        tracing::warn!(id = %story.id, error = %e, "failed to persist story");
                        failed.push(story.id.clone());
                    }
                }

                tx.commit()?;

                if failed.is_empty() {
                    Ok(())
                } else {
                    Err(Error::PartialWrite { failed, total: stories.len() })
                }
            })
            .await
            .map_err(Error::from)
    }

    async fn get(&self, id: &str) -> Result<Option<CacheEnvelope>, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<Option<CacheEnvelope>, Error> {
                let mut stmt = conn.prepare(&format!("{SELECT_ENVELOPE} WHERE id = ?1"))?;

                match stmt.query_row(params![id], envelope_from_row) {
                    Ok(envelope) => Ok(Some(envelope)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    async fn get_all(&self) -> Result<Vec<CacheEnvelope>, Error> {
        self.select_envelopes("").await
    }

    async fn offline_records(&self) -> Result<Vec<CacheEnvelope>, Error> {
        self.select_envelopes("WHERE is_offline = 1").await
    }

    async fn reconcile(&self, confirmed_ids: &[String]) -> Result<u64, Error> {
        let confirmed: HashSet<String> = confirmed_ids.iter().cloned().collect();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.unchecked_transaction()?;
                let stale: Vec<String> = {
                    let mut stmt = tx.prepare("SELECT id FROM stories WHERE confirmed = 1")?;
                    let ids = stmt.query_map([], |row| row.get::<_, String>(0))?;
                    ids.filter(|id| id.as_ref().map_or(true, |id| !confirmed.contains(id)))
                        .collect::<Result<_, _>>()?
                };

                for id in &stale {
                    tx.execute("UPDATE stories SET confirmed = 0 WHERE id = ?1", params![id])?;
                }

                tx.commit()?;
                Ok(stale.len() as u64)
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, id: &str) -> Result<(), Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute("DELETE FROM stories WHERE id = ?1", params![id])?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn clear(&self) -> Result<(), Error> {
        self.conn
            .call(|conn| -> Result<(), Error> {
                conn.execute("DELETE FROM stories", [])?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn stats(&self) -> Result<StorageStats, Error> {
        let envelopes = self.get_all().await?;
        Ok(StorageStats::from_envelopes(&envelopes))
    }
}
