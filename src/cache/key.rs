//! Cache key and on-disk filename derivation.

use sha2::{Digest, Sha256};

/// Cache key for a request: `METHOD:url`.
pub fn cache_key(method: &str, url: &str) -> String {
    format!("{}:{}", method, url)
}

/// Deterministic filename for a cache key.
///
/// Hex-encoded SHA-256 of the key; not reversible, the key itself is stored in
/// the record header.
pub fn filename_for_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
