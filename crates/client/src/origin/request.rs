//! Story API request types.

use serde::Serialize;

use storyline_core::{Error, Location, PushKeys, PushSubscription};

/// Photo payload for a new story.
#[derive(Debug, Clone)]
pub struct Photo {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Photo {
    /// Reference kept on an offline-authored record until it is uploaded.
    pub fn local_reference(&self) -> String {
        format!("local://{}", self.file_name)
    }
}

/// A story draft to submit to the origin.
#[derive(Debug, Clone)]
pub struct NewStory {
    pub description: String,
    pub location: Option<Location>,
}

impl NewStory {
    /// Build a draft, keeping the location only when both coordinates are given.
    pub fn new(description: impl Into<String>, lat: Option<f64>, lon: Option<f64>) -> Self {
        Self { description: description.into(), location: Location::from_parts(lat, lon) }
    }

    /// Validate the draft before submission.
    pub fn validate(&self) -> Result<(), Error> {
        if self.description.trim().is_empty() {
            return Err(Error::InvalidInput("description must not be empty".into()));
        }

        if let Some(Location { lat, lon }) = self.location {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(Error::InvalidInput(format!("latitude {lat} out of range")));
            }
            if !(-180.0..=180.0).contains(&lon) {
                return Err(Error::InvalidInput(format!("longitude {lon} out of range")));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct RegisterRequest<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

/// `POST /notifications/subscribe`
#[derive(Debug, Serialize)]
pub struct SubscribeRequest<'a> {
    pub endpoint: &'a str,
    pub keys: &'a PushKeys,
}

impl<'a> From<&'a PushSubscription> for SubscribeRequest<'a> {
    fn from(sub: &'a PushSubscription) -> Self {
        Self { endpoint: &sub.endpoint, keys: &sub.keys }
    }
}

/// `POST /notifications/unsubscribe`
#[derive(Debug, Serialize)]
pub struct UnsubscribeRequest<'a> {
    pub endpoint: &'a str,
}
