//! Story API response types and normalization.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use storyline_core::{Location, Story};

/// Fields every story API body carries.
#[derive(Debug, Default, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Raw story as sent by the origin.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiStory {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub photo_url: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
}

impl From<ApiStory> for Story {
    fn from(api: ApiStory) -> Self {
        if api.lat.is_some() != api.lon.is_some() {
            tracing::debug!(id = %api.id, "dropping partial location");
        }

        Story {
            location: Location::from_parts(api.lat, api.lon),
            id: api.id,
            name: api.name,
            description: api.description,
            photo_reference: api.photo_url,
            created_at: api.created_at,
        }
    }
}

/// `GET /stories`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    #[serde(default)]
    pub list_story: Vec<ApiStory>,
}

/// `GET /stories/{id}`
#[derive(Debug, Deserialize)]
pub struct DetailResponse {
    pub story: ApiStory,
}

/// `POST /login`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub login_result: LoginResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub token: String,
}
