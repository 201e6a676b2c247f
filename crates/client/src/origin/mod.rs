//! Story API client.
//!
//! Typed calls to the remote origin. Every call issues exactly one request and
//! normalizes both failure shapes (non-success status and an `error: true`
//! body) into [`Error::Remote`], so callers never branch on which one
//! happened. A 401 on a read endpoint becomes [`Error::SessionExpired`].
//!
//! There are no retries here; the synchronization controller owns retry policy.
//!
//! ### Endpoints
//!
//! - `GET /stories`, `GET /stories/{id}` (Bearer credential when available)
//! - `POST /stories` (multipart: `description`, `photo`, optional `lat`/`lon`)
//! - `POST /notifications/subscribe` (`{endpoint, keys}`)
//! - `POST /notifications/unsubscribe` (`{endpoint}`)
//! - `POST /login`, `POST /register`

pub mod request;
pub mod response;

pub use request::{NewStory, Photo};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{RequestBuilder, header, multipart};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};

use storyline_core::{AppConfig, CredentialStore, Error, PushSubscription, Story};

use request::{LoginRequest, RegisterRequest, SubscribeRequest, UnsubscribeRequest};
use response::{DetailResponse, Envelope, ListResponse, LoginResponse};

const SESSION_EXPIRED_MESSAGE: &str = "invalid token structure or token expired, please log in again";

/// The remote origin as seen by the synchronization and subscription components.
#[async_trait]
pub trait Origin: Send + Sync {
    async fn list_records(&self) -> Result<Vec<Story>, Error>;

    async fn get_record(&self, id: &str) -> Result<Story, Error>;

    async fn create_record(&self, draft: &NewStory, photo: &Photo, credential: &str) -> Result<(), Error>;

    async fn subscribe(&self, subscription: &PushSubscription, credential: &str) -> Result<(), Error>;

    async fn unsubscribe(&self, subscription: &PushSubscription, credential: &str) -> Result<(), Error>;
}

/// Story API client configuration.
#[derive(Debug, Clone)]
pub struct OriginConfig {
    /// Base URL (default: https://story-api.dicoding.dev/v1).
    pub base_url: String,
    /// Request timeout (default: 20s).
    pub timeout: Duration,
    pub user_agent: String,
}

impl From<&AppConfig> for OriginConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout(),
            user_agent: config.user_agent.clone(),
        }
    }
}

/// Normalize an origin response into a typed body.
///
/// `read` marks endpoints where a 401 means the session expired.
pub(crate) fn normalize<T: DeserializeOwned>(status: u16, body: &[u8], read: bool) -> Result<T, Error> {
    let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) { b"{}" } else { body };
    let envelope: Option<Envelope> = serde_json::from_slice(body).ok();
    let message = envelope.as_ref().and_then(|e| e.message.clone());

    if read && status == 401 {
        return Err(Error::SessionExpired(message.unwrap_or_else(|| SESSION_EXPIRED_MESSAGE.to_string())));
    }

    let success = (200..300).contains(&status);
    let body_error = envelope.as_ref().is_some_and(|e| e.error);

    if !success || body_error {
        let message = message.unwrap_or_else(|| format!("request failed with HTTP {status}"));
        return Err(Error::remote(Some(status), message));
    }

    serde_json::from_slice(body).map_err(|e| Error::remote(Some(status), format!("malformed response: {e}")))
}

/// reqwest-backed story API client.
#[derive(Clone)]
pub struct StoryApiClient {
    http: reqwest::Client,
    config: OriginConfig,
    credentials: Arc<dyn CredentialStore>,
}

impl StoryApiClient {
    /// Create a new client. Reads use the credential held by `credentials`.
    pub fn new(config: OriginConfig, credentials: Arc<dyn CredentialStore>) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::InvalidInput(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config, credentials })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<(u16, Bytes), Error> {
        let start = Instant::now();

        let response = request
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() { "request timed out" } else { "network error" };
                Error::remote(None, format!("{reason}: {e}"))
            })?;

        let status = response.status().as_u16();
        let url = response.url().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::remote(None, format!("failed to read response: {e}")))?;

        tracing::debug!(%url, status, elapsed_ms = start.elapsed().as_millis() as u64, "origin responded");

        Ok((status, body))
    }

    async fn read<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let mut request = self.http.get(self.endpoint(path));

        if let Some(token) = self.credentials.get_credential().await? {
            request = request.bearer_auth(token);
        }

        let (status, body) = self.execute(request).await?;
        normalize(status, &body, true)
    }

    /// Exchange credentials for an origin token.
    pub async fn login(&self, email: &str, password: &str) -> Result<String, Error> {
        let request = self.http.post(self.endpoint("/login")).json(&LoginRequest { email, password });
        let (status, body) = self.execute(request).await?;
        let response: LoginResponse = normalize(status, &body, false)?;
        Ok(response.login_result.token)
    }

    /// Create an account.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<(), Error> {
        let request = self.http.post(self.endpoint("/register")).json(&RegisterRequest { name, email, password });
        let (status, body) = self.execute(request).await?;
        normalize::<Envelope>(status, &body, false).map(|_| ())
    }
}

#[async_trait]
impl Origin for StoryApiClient {
    async fn list_records(&self) -> Result<Vec<Story>, Error> {
        let response: ListResponse = self.read("/stories").await?;
        Ok(response.list_story.into_iter().map(Story::from).collect())
    }

    async fn get_record(&self, id: &str) -> Result<Story, Error> {
        if id.is_empty() || id.contains('/') {
            return Err(Error::InvalidInput(format!("invalid story id '{id}'")));
        }

        let response: DetailResponse = self.read(&format!("/stories/{id}")).await?;
        Ok(response.story.into())
    }

    async fn create_record(&self, draft: &NewStory, photo: &Photo, credential: &str) -> Result<(), Error> {
        draft.validate()?;

        let part = multipart::Part::bytes(photo.bytes.clone())
            .file_name(photo.file_name.clone())
            .mime_str(&photo.mime_type)
            .map_err(|e| Error::InvalidInput(format!("invalid photo type '{}': {e}", photo.mime_type)))?;

        let mut form = multipart::Form::new().text("description", draft.description.clone()).part("photo", part);
        if let Some(location) = draft.location {
            form = form.text("lat", location.lat.to_string()).text("lon", location.lon.to_string());
        }

        let request = self.http.post(self.endpoint("/stories")).bearer_auth(credential).multipart(form);
        let (status, body) = self.execute(request).await?;
        normalize::<Envelope>(status, &body, false).map(|_| ())
    }

    async fn subscribe(&self, subscription: &PushSubscription, credential: &str) -> Result<(), Error> {
        let request = self
            .http
            .post(self.endpoint("/notifications/subscribe"))
            .bearer_auth(credential)
            .json(&SubscribeRequest::from(subscription));
        let (status, body) = self.execute(request).await?;
        normalize::<Envelope>(status, &body, false).map(|_| ())
    }

    async fn unsubscribe(&self, subscription: &PushSubscription, credential: &str) -> Result<(), Error> {
        let request = self
            .http
            .post(self.endpoint("/notifications/unsubscribe"))
            .bearer_auth(credential)
            .json(&UnsubscribeRequest { endpoint: &subscription.endpoint });
        let (status, body) = self.execute(request).await?;
        normalize::<Envelope>(status, &body, false).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyline_core::MemoryCredentials;

    #[test]
    fn test_normalize_success() {
        let body = br#"{"error":false,"message":"ok","listStory":[]}"#;
        let parsed: ListResponse = normalize(200, body, true).unwrap();
        assert!(parsed.list_story.is_empty());
    }

    #[test]
    fn test_normalize_body_error_flag() {
        let body = br#"{"error":true,"message":"description is required"}"#;
        let err = normalize::<Envelope>(200, body, false).unwrap_err();
        assert!(matches!(err, Error::Remote { status: Some(200), ref message } if message == "description is required"));
    }

    #[test]
    fn test_normalize_status_error() {
        let body = br#"{"error":true,"message":"Story not found"}"#;
        let err = normalize::<DetailResponse>(404, body, true).unwrap_err();
        assert!(matches!(err, Error::Remote { status: Some(404), .. }));
    }

    #[test]
    fn test_normalize_non_json_error() {
        let err = normalize::<Envelope>(502, b"<html>Bad Gateway</html>", true).unwrap_err();
        assert!(matches!(err, Error::Remote { status: Some(502), ref message } if message.contains("502")));
    }

    #[test]
    fn test_normalize_401_on_read() {
        let err = normalize::<ListResponse>(401, br#"{"error":true,"message":"Missing authentication"}"#, true)
            .unwrap_err();
        assert!(matches!(err, Error::SessionExpired(_)));
    }

    #[test]
    fn test_normalize_401_on_write_is_remote() {
        let err = normalize::<Envelope>(401, br#"{"error":true,"message":"Missing authentication"}"#, false)
            .unwrap_err();
        assert!(matches!(err, Error::Remote { status: Some(401), .. }));
    }

    #[test]
    fn test_normalize_empty_success_body() {
        assert!(normalize::<Envelope>(201, b"", false).is_ok());
    }

    #[test]
    fn test_normalize_malformed_success_body() {
        let err = normalize::<ListResponse>(200, br#"{"listStory": 3}"#, true).unwrap_err();
        assert!(matches!(err, Error::Remote { status: Some(200), .. }));
    }

    #[test]
    fn test_origin_config_trims_slash() {
        let app = AppConfig { api_base_url: "https://api.example.com/v1/".into(), ..Default::default() };
        assert_eq!(OriginConfig::from(&app).base_url, "https://api.example.com/v1");
    }

    #[tokio::test]
    async fn test_unreachable_origin_has_no_status() {
        let config = OriginConfig {
            base_url: "http://127.0.0.1:1".into(),
            timeout: Duration::from_millis(500),
            user_agent: "storyline-test".into(),
        };
        let client = StoryApiClient::new(config, Arc::new(MemoryCredentials::with_token("t"))).unwrap();

        let err = client.list_records().await.unwrap_err();
        assert!(err.is_unreachable());
    }

    #[tokio::test]
    async fn test_get_record_rejects_path_ids() {
        let config = OriginConfig::from(&AppConfig::default());
        let client = StoryApiClient::new(config, Arc::new(MemoryCredentials::new())).unwrap();
        assert!(matches!(client.get_record("../login").await, Err(Error::InvalidInput(_))));
    }
}
