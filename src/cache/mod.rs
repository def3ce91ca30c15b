//! 响应缓存模块：基于磁盘的 HTTP 响应缓存。
//!
//! # Response Cache Module
//!
//! Persistent response caching keyed by `METHOD:url`, used by the cache
//! dispatcher to serve fresh hits, serve stale-while-revalidate hits, and
//! attach expired entries for conditional revalidation.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Cache`] | Store contract used by the dispatchers |
//! | [`DiskCache`] | One file per key, access-ordered index, size-bounded eviction |
//! | [`NoCache`] | Store that never hits |
//! | [`CacheEntry`] | Payload plus etag, dates and soft/hard expiry |
//! | [`parse_cache_headers`] | Builds an entry from response caching headers |
//!
//! ## Example
//!
//! ```rust,no_run
//! use bees_http::cache::{Cache, CacheEntry, DiskCache};
//!
//! # async fn demo() {
//! let cache = DiskCache::new("/tmp/bees-cache", 1024 * 1024);
//! cache.initialize().await;
//! cache.put("GET:https://example.com/", CacheEntry::new("hello")).await;
//! let hit = cache.get("GET:https://example.com/").await;
//! assert!(hit.is_some());
//! # }
//! ```

mod backend;
mod disk;
mod entry;
mod headers;
mod key;
mod record;

pub use backend::{Cache, NoCache};
pub use disk::{DiskCache, DEFAULT_DISK_USAGE_BYTES, HYSTERESIS_FACTOR};
pub use entry::{now_millis, CacheEntry, Headers};
pub use headers::{
    conditional_headers, format_http_date, header_value, parse_cache_headers, parse_charset,
    parse_http_date, DEFAULT_CONTENT_CHARSET,
};
pub use key::{cache_key, filename_for_key};
