//! Output formatting for the CLI.

use std::io::Write;

use bytes::Bytes;
use serde::Serialize;

use storyline_client::{ResponseSource, RoutedResponse};

/// Largest body echoed back by `assets fetch`.
const BODY_PREVIEW_LIMIT: usize = 4096;

/// Print `data` to stdout as pretty JSON.
pub fn print_json<T: Serialize + ?Sized>(data: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(data)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{rendered}")?;
    Ok(())
}

/// JSON view of a routed response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseView {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub source: ResponseSource,
    pub bytes: usize,
    /// Present for textual bodies that fit the preview limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

fn is_textual(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| {
        let ct = ct.to_ascii_lowercase();
        ct.starts_with("text/") || ct.contains("json") || ct.contains("javascript") || ct.contains("svg")
    })
}

fn preview(content_type: Option<&str>, body: &Bytes) -> Option<String> {
    if body.len() > BODY_PREVIEW_LIMIT || !is_textual(content_type) {
        return None;
    }
    std::str::from_utf8(body).ok().map(str::to_string)
}

impl From<RoutedResponse> for ResponseView {
    fn from(response: RoutedResponse) -> Self {
        let body = preview(response.content_type.as_deref(), &response.body);
        Self {
            status: response.status,
            bytes: response.body.len(),
            content_type: response.content_type,
            source: response.source,
            body,
        }
    }
}
