//! Request keys for cache tier entries.

use sha2::{Digest, Sha256};

/// Compute the tier key for a request.
///
/// Callers pass the canonical URL, so two spellings of the same resource
/// share one entry.
pub fn compute_request_key(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}
