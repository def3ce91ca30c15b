//! Cached response data and metadata.

use bytes::Bytes;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Response headers as received from the server.
pub type Headers = BTreeMap<String, String>;

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Data and metadata for an entry returned by the cache.
///
/// All timestamps are milliseconds since the Unix epoch. `soft_ttl` never
/// exceeds `ttl`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub data: Bytes,
    pub etag: Option<String>,
    pub server_date: i64,
    pub last_modified: i64,
    /// Hard expiry, including any stale-while-revalidate extension.
    pub ttl: i64,
    /// Point after which a refresh should be attempted.
    pub soft_ttl: i64,
    pub response_headers: Headers,
}

impl CacheEntry {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            etag: None,
            server_date: 0,
            last_modified: 0,
            ttl: 0,
            soft_ttl: 0,
            response_headers: Headers::new(),
        }
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub fn with_server_date(mut self, millis: i64) -> Self {
        self.server_date = millis;
        self
    }

    pub fn with_last_modified(mut self, millis: i64) -> Self {
        self.last_modified = millis;
        self
    }

    /// Set both expiry points. The soft expiry is clamped to the hard one.
    pub fn with_ttls(mut self, soft_ttl: i64, ttl: i64) -> Self {
        self.ttl = ttl;
        self.soft_ttl = soft_ttl.min(ttl);
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.response_headers = headers;
        self
    }

    /// True if the entry must no longer be served.
    pub fn is_expired(&self) -> bool {
        self.ttl < now_millis()
    }

    /// True if the entry should be refreshed from the origin.
    pub fn refresh_needed(&self) -> bool {
        self.soft_ttl < now_millis()
    }
}
