//! Push notification subscription lifecycle.
//!
//! Keeps three views of one subscription consistent: the device-level
//! registration (through a [`RegistrationHost`]), the origin's record of it,
//! and the on-device ledger used when the origin could not be told.
//!
//! ```text
//! Unregistered -> Registering -> Registered { remote_confirmed | local_fallback }
//!      ^                                   |
//!      +---------- Unregistering <---------+
//! ```
//!
//! Permission denial and missing platform support are returned as errors.
//! Origin failures never fail a toggle; they degrade to the local ledger and
//! come back as an advisory message.

pub mod message;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use storyline_core::{CredentialStore, Error, PushSubscription, SubscriptionLedger, SubscriptionRecord};

use crate::origin::Origin;

pub use message::{NotificationAction, NotificationData, PushMessage};

/// Notification permission as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Granted,
    Denied,
    /// Not asked yet.
    Default,
}

/// Platform hooks for device-level push registration.
#[async_trait]
pub trait RegistrationHost: Send + Sync {
    fn is_supported(&self) -> bool;

    async fn permission(&self) -> Permission;

    /// Ask the user for permission. Returns the resulting state.
    async fn request_permission(&self) -> Result<Permission, Error>;

    /// Ensure the background registration that receives pushes exists. Idempotent.
    async fn register(&self) -> Result<(), Error>;

    /// The current push subscription, if any.
    async fn get_registration(&self) -> Result<Option<PushSubscription>, Error>;

    /// Create a push subscription for `application_server_key`.
    async fn subscribe(&self, application_server_key: &str) -> Result<PushSubscription, Error>;

    /// Tear down the push subscription. Returns false when there was none.
    async fn unsubscribe(&self) -> Result<bool, Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "phase")]
pub enum Phase {
    Unregistered,
    Registering,
    Registered { remote_confirmed: bool, local_fallback: bool },
    Unregistering,
}

/// Cheap, local view of the subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatus {
    pub supported: bool,
    pub permission: Permission,
    pub is_subscribed: bool,
    pub remote_confirmed: bool,
    pub local_fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_change: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeOutcome {
    pub subscription: PushSubscription,
    pub remote_confirmed: bool,
    pub local_fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisory: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeOutcome {
    pub was_subscribed: bool,
    pub remote_removed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisory: Option<String>,
}

/// A device registration the ledger knows nothing about was never confirmed
/// by the server, so it counts as a local-only subscription.
fn unconfirmed_fallback(record: Option<&SubscriptionRecord>) -> bool {
    record.is_none_or(|r| r.local_fallback)
}

/// Drives the subscription state machine.
pub struct SubscriptionManager {
    host: Arc<dyn RegistrationHost>,
    origin: Arc<dyn Origin>,
    credentials: Arc<dyn CredentialStore>,
    ledger: Arc<dyn SubscriptionLedger>,
    application_server_key: String,
    phase: Mutex<Phase>,
}

impl SubscriptionManager {
    pub fn new(
        host: Arc<dyn RegistrationHost>, origin: Arc<dyn Origin>, credentials: Arc<dyn CredentialStore>,
        ledger: Arc<dyn SubscriptionLedger>, application_server_key: impl Into<String>,
    ) -> Self {
        Self {
            host,
            origin,
            credentials,
            ledger,
            application_server_key: application_server_key.into(),
            phase: Mutex::new(Phase::Unregistered),
        }
    }

    pub async fn phase(&self) -> Phase {
        *self.phase.lock().await
    }

    fn ensure_supported(&self) -> Result<(), Error> {
        if self.host.is_supported() {
            Ok(())
        } else {
            Err(Error::NotSupported("push notifications are not available on this platform".into()))
        }
    }

    async fn load_record(&self) -> Option<SubscriptionRecord> {
        match self.ledger.load_subscription().await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "cannot read subscription ledger");
                None
            }
        }
    }

    async fn credential(&self) -> Option<String> {
        match self.credentials.get_credential().await {
            Ok(credential) => credential,
            Err(e) => {
                tracing::warn!(error = %e, "cannot read credential");
                None
            }
        }
    }

    async fn clear_record(&self) {
        if let Err(e) = self.ledger.clear_subscription().await {
            tracing::warn!(error = %e, "failed to clear subscription ledger");
        }
    }

    /// Ensure the device registration exists and reflect any existing
    /// subscription into the current phase without changing it.
    pub async fn initialize(&self) -> Result<SubscriptionStatus, Error> {
        self.ensure_supported()?;
        self.host.register().await?;

        let status = self.status().await?;
        tracing::info!(subscribed = status.is_subscribed, "push registration ready");
        Ok(status)
    }

    /// Subscribe this device.
    ///
    /// # Errors
    ///
    /// [`Error::PermissionDenied`] when permission is not granted,
    /// [`Error::NotSupported`] when the platform has no push support, and any
    /// failure of the device registration itself. Origin failures are not errors.
    pub async fn subscribe(&self) -> Result<SubscribeOutcome, Error> {
        self.ensure_supported()?;

        let mut phase = self.phase.lock().await;
        let previous = *phase;
        *phase = Phase::Registering;

        let subscription = match self.register_device().await {
            Ok(subscription) => subscription,
            Err(e) => {
                *phase = previous;
                return Err(e);
            }
        };

        let mut advisory = None;
        let remote_confirmed = match self.credential().await {
            Some(credential) => match self.origin.subscribe(&subscription, &credential).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "origin subscribe failed; keeping local subscription");
                    advisory = Some(format!("saved on this device only: {e}"));
                    false
                }
            },
            None => {
                advisory = Some("saved on this device only: not logged in".to_string());
                false
            }
        };

        let record = SubscriptionRecord {
            subscription: subscription.clone(),
            remote_confirmed,
            local_fallback: !remote_confirmed,
            last_change: Utc::now(),
        };
        if let Err(e) = self.ledger.save_subscription(&record).await {
            tracing::warn!(error = %e, "failed to record subscription locally");
        }

        *phase = Phase::Registered { remote_confirmed, local_fallback: !remote_confirmed };
        tracing::info!(endpoint = %subscription.endpoint, remote_confirmed, "subscribed to push notifications");

        Ok(SubscribeOutcome { subscription, remote_confirmed, local_fallback: !remote_confirmed, advisory })
    }

    async fn register_device(&self) -> Result<PushSubscription, Error> {
        let permission = match self.host.permission().await {
            Permission::Granted => Permission::Granted,
            _ => self.host.request_permission().await?,
        };
        if permission != Permission::Granted {
            return Err(Error::PermissionDenied);
        }

        self.host.register().await?;

        match self.host.get_registration().await? {
            Some(existing) => Ok(existing),
            None => self.host.subscribe(&self.application_server_key).await,
        }
    }

    /// Unsubscribe this device.
    ///
    /// The origin is told first, while the endpoint is still known. The
    /// device registration and the ledger are cleared whatever the origin says.
    /// If the device refuses to drop its registration, the ledger keeps it.
    pub async fn unsubscribe(&self) -> Result<UnsubscribeOutcome, Error> {
        self.ensure_supported()?;

        let mut phase = self.phase.lock().await;
        let previous = *phase;
        *phase = Phase::Unregistering;

        let registration = match self.host.get_registration().await {
            Ok(registration) => registration,
            Err(e) => {
                *phase = previous;
                return Err(e);
            }
        };
        let device_registered = registration.is_some();
        let record = self.load_record().await;
        let subscription = registration.or_else(|| record.as_ref().map(|r| r.subscription.clone()));

        let mut advisory = None;
        let mut remote_removed = false;
        if let Some(subscription) = &subscription {
            match self.credential().await {
                Some(credential) => match self.origin.unsubscribe(subscription, &credential).await {
                    Ok(()) => remote_removed = true,
                    Err(e) => {
                        tracing::warn!(error = %e, "origin unsubscribe failed");
                        advisory = Some(format!("server may still hold this device: {e}"));
                    }
                },
                None => advisory = Some("server was not told: not logged in".to_string()),
            }
        }

        match self.host.unsubscribe().await {
            Ok(was_subscribed) => {
                self.clear_record().await;
                *phase = Phase::Unregistered;
                tracing::info!(was_subscribed, remote_removed, "unsubscribed from push notifications");
                Ok(UnsubscribeOutcome { was_subscribed: was_subscribed || subscription.is_some(), remote_removed, advisory })
            }
            Err(e) => {
                tracing::warn!(error = %e, remote_removed, "device teardown failed");
                *phase = match subscription {
                    Some(subscription) if device_registered => {
                        self.keep_after_failed_teardown(subscription, record.as_ref(), remote_removed).await
                    }
                    _ => {
                        self.clear_record().await;
                        Phase::Unregistered
                    }
                };
                Err(e)
            }
        }
    }

    /// Record what still holds after the device refused to drop its registration.
    ///
    /// The server keeps it only if it was confirmed and the removal did not go through.
    async fn keep_after_failed_teardown(
        &self, subscription: PushSubscription, record: Option<&SubscriptionRecord>, remote_removed: bool,
    ) -> Phase {
        let remote_confirmed = !remote_removed && record.is_some_and(|r| r.remote_confirmed);
        let kept = SubscriptionRecord {
            subscription,
            remote_confirmed,
            local_fallback: !remote_confirmed,
            last_change: Utc::now(),
        };
        if let Err(e) = self.ledger.save_subscription(&kept).await {
            tracing::warn!(error = %e, "failed to record subscription locally");
        }
        Phase::Registered { remote_confirmed, local_fallback: !remote_confirmed }
    }

    /// Report the subscription from local state only.
    ///
    /// A ledger entry whose device registration has vanished is cleared.
    pub async fn status(&self) -> Result<SubscriptionStatus, Error> {
        if !self.host.is_supported() {
            return Ok(SubscriptionStatus {
                supported: false,
                permission: Permission::Denied,
                is_subscribed: false,
                remote_confirmed: false,
                local_fallback: false,
                endpoint: None,
                last_change: None,
            });
        }

        let registration = self.host.get_registration().await?;
        let mut record = self.load_record().await;

        let mut phase = self.phase.lock().await;
        match &registration {
            None => {
                if record.take().is_some() {
                    tracing::info!("device registration vanished; clearing local subscription record");
                    self.clear_record().await;
                }
                *phase = Phase::Unregistered;
            }
            Some(current) => {
                if record.as_ref().is_some_and(|r| r.subscription.endpoint != current.endpoint) {
                    record = None;
                }
                *phase = Phase::Registered {
                    remote_confirmed: record.as_ref().is_some_and(|r| r.remote_confirmed),
                    local_fallback: unconfirmed_fallback(record.as_ref()),
                };
            }
        }

        let local_fallback = registration.is_some() && unconfirmed_fallback(record.as_ref());
        Ok(SubscriptionStatus {
            supported: true,
            permission: self.host.permission().await,
            is_subscribed: registration.is_some(),
            remote_confirmed: record.as_ref().is_some_and(|r| r.remote_confirmed),
            local_fallback,
            endpoint: registration.map(|r| r.endpoint),
            last_change: record.map(|r| r.last_change),
        })
    }
}
