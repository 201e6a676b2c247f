//! On-device key/value settings.
//!
//! Backs the credential store and the push subscription ledger.

use async_trait::async_trait;
use chrono::Utc;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::CacheDb;
use super::encode_ts;
use crate::Error;
use crate::auth::CredentialStore;
use crate::model::SubscriptionRecord;
use crate::store::SubscriptionLedger;

const CREDENTIAL_KEY: &str = "credential";
const SUBSCRIPTION_KEY: &str = "push_subscription";

impl CacheDb {
    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                match conn.query_row("SELECT value FROM settings WHERE key = ?1", params![key], |row| row.get(0)) {
                    Ok(value) => Ok(Some(value)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    pub async fn put_setting(&self, key: &str, value: &str) -> Result<(), Error> {
        let key = key.to_string();
        let value = value.to_string();
        let updated_at = encode_ts(&Utc::now());
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                    params![key, value, updated_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Remove a setting. Returns whether it existed.
    pub async fn delete_setting(&self, key: &str) -> Result<bool, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let removed = conn.execute("DELETE FROM settings WHERE key = ?1", params![key])?;
                Ok(removed > 0)
            })
            .await
            .map_err(Error::from)
    }
}

#[async_trait]
impl CredentialStore for CacheDb {
    async fn get_credential(&self) -> Result<Option<String>, Error> {
        self.get_setting(CREDENTIAL_KEY).await
    }

    async fn set_credential(&self, token: &str) -> Result<(), Error> {
        if token.is_empty() {
            return Err(Error::InvalidInput("credential cannot be empty".into()));
        }
        self.put_setting(CREDENTIAL_KEY, token).await
    }

    async fn clear_credential(&self) -> Result<(), Error> {
        self.delete_setting(CREDENTIAL_KEY).await.map(|_| ())
    }
}

#[async_trait]
impl SubscriptionLedger for CacheDb {
    async fn load_subscription(&self) -> Result<Option<SubscriptionRecord>, Error> {
        match self.get_setting(SUBSCRIPTION_KEY).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn save_subscription(&self, record: &SubscriptionRecord) -> Result<(), Error> {
        let raw = serde_json::to_string(record)?;
        self.put_setting(SUBSCRIPTION_KEY, &raw).await
    }

    async fn clear_subscription(&self) -> Result<(), Error> {
        self.delete_setting(SUBSCRIPTION_KEY).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PushKeys, PushSubscription};

    #[tokio::test]
    async fn test_settings_roundtrip() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.get_setting("theme").await.unwrap().is_none());

        db.put_setting("theme", "dark").await.unwrap();
        db.put_setting("theme", "light").await.unwrap();
        assert_eq!(db.get_setting("theme").await.unwrap().as_deref(), Some("light"));

        assert!(db.delete_setting("theme").await.unwrap());
        assert!(!db.delete_setting("theme").await.unwrap());
    }

    #[tokio::test]
    async fn test_credential_store() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.set_credential("abc").await.unwrap();
        assert_eq!(db.get_credential().await.unwrap().as_deref(), Some("abc"));

        db.clear_credential().await.unwrap();
        db.clear_credential().await.unwrap();
        assert!(db.get_credential().await.unwrap().is_none());

        assert!(matches!(db.set_credential("").await, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_subscription_ledger() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.load_subscription().await.unwrap().is_none());

        let record = SubscriptionRecord {
            subscription: PushSubscription {
                endpoint: "https://push.example.com/abc".into(),
                keys: PushKeys { p256dh: "p".into(), auth: "a".into() },
            },
            remote_confirmed: false,
            local_fallback: true,
            last_change: Utc::now(),
        };

        db.save_subscription(&record).await.unwrap();
        assert_eq!(db.load_subscription().await.unwrap(), Some(record));

        db.clear_subscription().await.unwrap();
        assert!(db.load_subscription().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_subscription_is_reported() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_setting(SUBSCRIPTION_KEY, "{not json").await.unwrap();
        assert!(matches!(db.load_subscription().await, Err(Error::Corrupt(_))));
    }
}
