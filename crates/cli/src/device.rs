//! Push registration host for a terminal device.
//!
//! There is no browser push service here: the endpoint and keys come from
//! configuration and the registration lives in the settings table, so it
//! survives between invocations.

use async_trait::async_trait;

use storyline_client::{Permission, RegistrationHost};
use storyline_core::{CacheDb, Error, PushConfig, PushKeys, PushSubscription};

const PERMISSION_KEY: &str = "device_permission";
const WORKER_KEY: &str = "device_worker";
const REGISTRATION_KEY: &str = "device_registration";

pub struct ConfiguredRegistrationHost {
    db: CacheDb,
    push: Option<PushConfig>,
    grant: bool,
}

impl ConfiguredRegistrationHost {
    /// `grant` answers a permission prompt with "granted"; otherwise the prompt is dismissed.
    pub fn new(db: CacheDb, push: Option<PushConfig>, grant: bool) -> Self {
        Self { db, push, grant }
    }

    fn push_config(&self) -> Result<&PushConfig, Error> {
        self.push.as_ref().ok_or_else(|| Error::NotSupported("no push endpoint configured".into()))
    }
}

fn parse_permission(raw: &str) -> Permission {
    match raw {
        "granted" => Permission::Granted,
        "denied" => Permission::Denied,
        _ => Permission::Default,
    }
}

#[async_trait]
impl RegistrationHost for ConfiguredRegistrationHost {
    fn is_supported(&self) -> bool {
        self.push.is_some()
    }

    async fn permission(&self) -> Permission {
        match self.db.get_setting(PERMISSION_KEY).await {
            Ok(Some(raw)) => parse_permission(&raw),
            Ok(None) => Permission::Default,
            Err(e) => {
                tracing::warn!(error = %e, "could not read notification permission");
                Permission::Default
            }
        }
    }

    async fn request_permission(&self) -> Result<Permission, Error> {
        if self.grant {
            self.db.put_setting(PERMISSION_KEY, "granted").await?;
            return Ok(Permission::Granted);
        }
        Ok(self.permission().await)
    }

    async fn register(&self) -> Result<(), Error> {
        self.push_config()?;
        self.db.put_setting(WORKER_KEY, "active").await
    }

    async fn get_registration(&self) -> Result<Option<PushSubscription>, Error> {
        match self.db.get_setting(REGISTRATION_KEY).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| Error::Corrupt(format!("device registration: {e}"))),
            None => Ok(None),
        }
    }

    async fn subscribe(&self, application_server_key: &str) -> Result<PushSubscription, Error> {
        let push = self.push_config()?;
        if self.db.get_setting(WORKER_KEY).await?.is_none() {
            return Err(Error::NotSupported("device is not registered".into()));
        }
        if application_server_key.is_empty() {
            return Err(Error::InvalidInput("application server key is empty".into()));
        }

        let subscription = PushSubscription {
            endpoint: push.endpoint.clone(),
            keys: PushKeys { p256dh: push.p256dh.clone(), auth: push.auth.clone() },
        };
        let raw = serde_json::to_string(&subscription)
            .map_err(|e| Error::InvalidInput(format!("failed to encode registration: {e}")))?;
        self.db.put_setting(REGISTRATION_KEY, &raw).await?;

        tracing::debug!(endpoint = %subscription.endpoint, "device registration stored");
        Ok(subscription)
    }

    async fn unsubscribe(&self) -> Result<bool, Error> {
        self.db.delete_setting(REGISTRATION_KEY).await
    }
}
