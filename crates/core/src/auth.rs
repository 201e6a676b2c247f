//! Credential storage collaborator.
//!
//! The origin token is opaque to the rest of the client: it is read before
//! each authenticated call and cleared on logout.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::Error;

/// Opaque get/set/clear store for the origin credential.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_credential(&self) -> Result<Option<String>, Error>;

    async fn set_credential(&self, token: &str) -> Result<(), Error>;

    async fn clear_credential(&self) -> Result<(), Error>;
}

/// Process-local credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentials {
    token: RwLock<Option<String>>,
}

impl MemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self { token: RwLock::new(Some(token.into())) }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentials {
    async fn get_credential(&self) -> Result<Option<String>, Error> {
        Ok(self.token.read().await.clone())
    }

    async fn set_credential(&self, token: &str) -> Result<(), Error> {
        if token.is_empty() {
            return Err(Error::InvalidInput("credential cannot be empty".into()));
        }
        *self.token.write().await = Some(token.to_string());
        Ok(())
    }

    async fn clear_credential(&self) -> Result<(), Error> {
        *self.token.write().await = None;
        Ok(())
    }
}
