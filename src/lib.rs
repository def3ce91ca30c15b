//! # bees-http
//!
//! 客户端 HTTP 请求管线：优先级调度、磁盘缓存、重试退避与回调分发。
//!
//! Client-side HTTP request pipeline. Callers submit typed requests; the
//! pipeline resolves each one from an on-disk cache or the network, retries
//! transient failures, and delivers the parsed result on the caller's chosen
//! execution context.
//!
//! ## Overview
//!
//! - **Ordering**: priority first, then FIFO by enqueue sequence
//! - **Deduplication**: at most one resolution in flight per cache key;
//!   duplicates wait behind the first request and are released when it finishes
//! - **Stale-while-revalidate**: soft-expired entries are delivered immediately
//!   and refreshed in the background
//! - **Bounded disk cache**: LRU eviction with hysteresis
//! - **Retry/backoff**: per-request policy growing the per-attempt timeout
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bees_http::queue::{new_request_queue, QueueConfig};
//! use bees_http::request::{Method, Priority, Request};
//!
//! #[tokio::main]
//! async fn main() -> bees_http::Result<()> {
//!     let queue = new_request_queue(QueueConfig::from_env())?;
//!
//!     queue.add(
//!         Request::string(Method::Get, "https://example.com/feed")
//!             .with_priority(Priority::High)
//!             .on_response(|body| println!("got {} chars", body.len()))
//!             .on_error(|err| eprintln!("failed: {}", err)),
//!     );
//!
//!     queue.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`queue`] | Request queue, ordering, deduplication, worker lifecycle |
//! | [`request`] | Requests, priorities, retry policy, payload parsers |
//! | [`dispatch`] | Cache and network worker loops |
//! | [`cache`] | Disk cache, record format, HTTP cache headers |
//! | [`network`] | Network executor contract and the reqwest executor |
//! | [`delivery`] | Delivery onto the caller's execution context |

pub mod cache;
pub mod delivery;
pub mod dispatch;
pub mod network;
pub mod queue;
pub mod request;

// Re-export main types for convenience
pub use cache::{Cache, CacheEntry, DiskCache};
pub use delivery::{ExecutorDelivery, ResponseDelivery};
pub use network::{NetworkExecutor, NetworkOutcome, ReqwestExecutor};
pub use queue::{new_request_queue, QueueConfig, RequestQueue, RequestQueueBuilder};
pub use request::{Method, Priority, Request, Response};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext, ErrorKind, RequestError};
