//! Incoming push payloads.
//!
//! A payload is a JSON object whose top-level fields replace the defaults.
//! Anything else is shown as the notification body.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_TITLE: &str = "Story App";
const DEFAULT_BODY: &str = "There is a new story for you!";
const DEFAULT_ICON: &str = "/vite.svg";
const DEFAULT_TAG: &str = "story-notification";
const CLOSE_ACTION: &str = "close";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    #[serde(default = "default_url")]
    pub url: String,
    /// Milliseconds since the epoch.
    #[serde(default = "now_millis")]
    pub timestamp: i64,
}

fn default_url() -> String {
    "/".into()
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl Default for NotificationData {
    fn default() -> Self {
        Self { url: default_url(), timestamp: now_millis() }
    }
}

/// A notification ready to be shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
    pub require_interaction: bool,
    pub actions: Vec<NotificationAction>,
    pub data: NotificationData,
}

impl Default for PushMessage {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.into(),
            body: DEFAULT_BODY.into(),
            icon: DEFAULT_ICON.into(),
            badge: DEFAULT_ICON.into(),
            tag: DEFAULT_TAG.into(),
            require_interaction: false,
            actions: vec![
                NotificationAction { action: "view".into(), title: "View story".into(), icon: Some(DEFAULT_ICON.into()) },
                NotificationAction { action: CLOSE_ACTION.into(), title: "Close".into(), icon: None },
            ],
            data: NotificationData::default(),
        }
    }
}

impl PushMessage {
    /// Build the notification for a push payload.
    pub fn from_payload(payload: Option<&[u8]>) -> Self {
        let defaults = Self::default();
        let Some(payload) = payload.filter(|p| !p.is_empty()) else {
            return defaults;
        };

        match serde_json::from_slice::<Value>(payload) {
            Ok(Value::Object(fields)) => match defaults.merged(fields) {
                Ok(message) => return message,
                Err(e) => tracing::debug!(error = %e, "push payload fields have unexpected types"),
            },
            Ok(_) => tracing::debug!("push payload is not an object"),
            Err(e) => tracing::debug!(error = %e, "push payload is not JSON"),
        }

        let text = String::from_utf8_lossy(payload).trim().to_string();
        Self { body: if text.is_empty() { DEFAULT_BODY.into() } else { text }, ..Self::default() }
    }

    fn merged(&self, fields: serde_json::Map<String, Value>) -> Result<Self, serde_json::Error> {
        let mut base = serde_json::to_value(self)?;
        if let Value::Object(base) = &mut base {
            base.extend(fields);
        }
        serde_json::from_value(base)
    }

    /// Where a click on the notification leads; `None` when the click only dismisses it.
    pub fn click_target(&self, action: Option<&str>) -> Option<&str> {
        match action {
            Some(CLOSE_ACTION) => None,
            _ => Some(if self.data.url.is_empty() { "/" } else { self.data.url.as_str() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_payload_uses_defaults() {
        let message = PushMessage::from_payload(None);
        assert_eq!(message.title, DEFAULT_TITLE);
        assert_eq!(message.body, DEFAULT_BODY);
        assert_eq!(message.actions.len(), 2);
        assert_eq!(message.data.url, "/");
    }

    #[test]
    fn test_json_fields_override_defaults() {
        let payload = br#"{"title":"New story","options":{"x":1},"data":{"url":"/stories/42"}}"#;
        let message = PushMessage::from_payload(Some(payload));
        assert_eq!(message.title, "New story");
        assert_eq!(message.body, DEFAULT_BODY);
        assert_eq!(message.tag, DEFAULT_TAG);
        assert_eq!(message.data.url, "/stories/42");
        assert!(message.data.timestamp > 0);
    }

    #[test]
    fn test_text_payload_becomes_body() {
        let message = PushMessage::from_payload(Some(b"Someone shared a story"));
        assert_eq!(message.body, "Someone shared a story");
        assert_eq!(message.title, DEFAULT_TITLE);
    }

    #[test]
    fn test_ill_typed_json_falls_back_to_text() {
        let message = PushMessage::from_payload(Some(br#"{"requireInteraction":"yes"}"#));
        assert_eq!(message.body, r#"{"requireInteraction":"yes"}"#);
        assert!(!message.require_interaction);
    }

    #[test]
    fn test_click_target() {
        let message = PushMessage::from_payload(Some(br#"{"data":{"url":"/stories/7"}}"#));
        assert_eq!(message.click_target(None), Some("/stories/7"));
        assert_eq!(message.click_target(Some("view")), Some("/stories/7"));
        assert_eq!(message.click_target(Some("close")), None);
    }
}
