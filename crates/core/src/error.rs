//! Unified error types for storyline.
//!
//! Every component operation returns this taxonomy. Whether a failure is
//! swallowed or surfaced is decided by the caller at its policy boundary.

use tokio_rusqlite::rusqlite;

/// Unified error types for the storyline client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The persistent store could not be opened or is not available.
    #[error("STORAGE_UNAVAILABLE: {0}")]
    StorageUnavailable(String),

    /// Transport-level or application-level failure reported by the origin.
    #[error("REMOTE_ERROR: {message}{}", describe_status(.status))]
    Remote { status: Option<u16>, message: String },

    /// The origin rejected the credential on a read endpoint (HTTP 401).
    #[error("SESSION_EXPIRED: {0}")]
    SessionExpired(String),

    /// The record is neither reachable on the origin nor cached locally.
    #[error("NOT_FOUND_OFFLINE: {0}")]
    NotFoundOffline(String),

    /// Notification permission was refused.
    #[error("PERMISSION_DENIED: notification permission was not granted")]
    PermissionDenied,

    /// The platform lacks a capability this operation needs.
    #[error("NOT_SUPPORTED: {0}")]
    NotSupported(String),

    /// Some records of a batch write failed; the others were persisted.
    #[error("PARTIAL_WRITE: {} of {total} records failed ({})", .failed.len(), .failed.join(", "))]
    PartialWrite { failed: Vec<String>, total: usize },

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be decoded.
    #[error("CACHE_ERROR: corrupt entry: {0}")]
    Corrupt(String),

    /// Invalid input parameters.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),
}

fn describe_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (status {code})"),
        None => " (no response)".to_string(),
    }
}

impl Error {
    /// Build a remote error from an HTTP status and message.
    pub fn remote(status: Option<u16>, message: impl Into<String>) -> Self {
        Error::Remote { status, message: message.into() }
    }

    /// True when the origin could not be reached at all (no HTTP status).
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Error::Remote { status: None, .. })
    }

    /// True for failures of the local persistent store.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Error::StorageUnavailable(_)
                | Error::Database(_)
                | Error::MigrationFailed(_)
                | Error::Corrupt(_)
                | Error::PartialWrite { .. }
        )
    }

    /// True for conditions the user must act on; these are never retried or degraded.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::PermissionDenied | Error::NotSupported(_) | Error::SessionExpired(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Corrupt(err.to_string())
    }
}
