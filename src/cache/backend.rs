//! Cache store contract and the no-op store.

use super::entry::CacheEntry;
use async_trait::async_trait;

/// A cache keyed by string with byte payloads.
///
/// Implementations never surface I/O failures: a failed read is a miss and a
/// failed write is dropped.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Perform any long-running setup; called once from the cache worker.
    async fn initialize(&self);
    /// Retrieve an entry, or `None` on a miss.
    async fn get(&self, key: &str) -> Option<CacheEntry>;
    /// Add or replace an entry.
    async fn put(&self, key: &str, entry: CacheEntry);
    /// Soft-expire an entry; with `full_expire` also hard-expire it.
    async fn invalidate(&self, key: &str, full_expire: bool);
    async fn remove(&self, key: &str);
    async fn clear(&self);
    fn name(&self) -> &'static str;
}

/// Cache that stores nothing.
pub struct NoCache;

impl NoCache {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NoCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for NoCache {
    async fn initialize(&self) {}
    async fn get(&self, _: &str) -> Option<CacheEntry> {
        None
    }
    async fn put(&self, _: &str, _: CacheEntry) {}
    async fn invalidate(&self, _: &str, _: bool) {}
    async fn remove(&self, _: &str) {}
    async fn clear(&self) {}
    fn name(&self) -> &'static str {
        "none"
    }
}
