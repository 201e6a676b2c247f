//! URL canonicalization for cache keys and classification.

use storyline_core::Error;
use url::Url;

/// Canonicalize an absolute URL so equivalent spellings share one cache entry.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Require an http(s) scheme
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<Url, Error> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(Error::InvalidUrl("empty URL".into()));
    }

    let mut parsed = Url::parse(trimmed).map_err(|e| Error::InvalidUrl(format!("{trimmed}: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(Error::InvalidUrl(format!("unsupported scheme: {scheme}"))),
    }

    if let Some(host) = parsed.host_str().map(str::to_lowercase) {
        parsed.set_host(Some(&host)).map_err(|e| Error::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Resolve an origin-relative asset path (`/index.html`) against an origin.
pub fn resolve(origin: &Url, path: &str) -> Result<Url, Error> {
    let joined = origin.join(path).map_err(|e| Error::InvalidUrl(format!("{path}: {e}")))?;
    canonicalize(joined.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_lowercase_host() {
        let url = canonicalize("https://STORY-API.Dicoding.dev/v1/stories").unwrap();
        assert_eq!(url.host_str(), Some("story-api.dicoding.dev"));
        assert_eq!(url.path(), "/v1/stories");
    }

    #[test]
    fn test_canonicalize_remove_fragment() {
        let url = canonicalize("http://localhost:5173/#/stories/1").unwrap();
        assert_eq!(url.fragment(), None);
        assert_eq!(url.as_str(), "http://localhost:5173/");
    }

    #[test]
    fn test_canonicalize_preserve_query() {
        let url = canonicalize("https://fonts.googleapis.com/css2?family=Poppins&display=swap").unwrap();
        assert_eq!(url.query(), Some("family=Poppins&display=swap"));
    }

    #[test]
    fn test_canonicalize_trim_whitespace() {
        let url = canonicalize("  https://example.com  ").unwrap();
        assert_eq!(url.as_str(), "https://example.com/");
    }

    #[test]
    fn test_canonicalize_rejects_bad_input() {
        assert!(matches!(canonicalize(""), Err(Error::InvalidUrl(_))));
        assert!(matches!(canonicalize("   "), Err(Error::InvalidUrl(_))));
        assert!(matches!(canonicalize("file:///etc/passwd"), Err(Error::InvalidUrl(_))));
        assert!(matches!(canonicalize("/index.html"), Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_resolve_asset_path() {
        let origin = Url::parse("http://localhost:5173").unwrap();
        let url = resolve(&origin, "/offline.html").unwrap();
        assert_eq!(url.as_str(), "http://localhost:5173/offline.html");
    }
}
