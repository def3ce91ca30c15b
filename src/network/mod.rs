//! 网络执行模块：可插拔的 HTTP 执行器契约。
//!
//! # Network Executor Module
//!
//! The dispatch core never speaks HTTP itself. It hands an [`HttpRequest`]
//! snapshot plus conditional-cache headers to a [`NetworkExecutor`] and gets
//! back a [`NetworkOutcome`] (for every status code) or a [`TransportError`].
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`NetworkExecutor`] | Performs one HTTP exchange |
//! | [`ReqwestExecutor`] | Default executor backed by `reqwest` |
//! | [`NetworkOutcome`] | Status, body, headers, not-modified flag, timing |
//! | [`classify_status`] | Maps non-success statuses onto [`ErrorKind`] |

mod http;

pub use http::ReqwestExecutor;

use crate::cache::{CacheEntry, Headers};
use crate::error::{ErrorKind, RequestError};
use crate::request::Method;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// Immutable view of a request handed to the executor for one attempt.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    pub body: Option<Bytes>,
    pub content_type: Option<String>,
    /// Per-attempt timeout from the request's retry policy.
    pub timeout: Duration,
}

/// Raw result of one HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkOutcome {
    pub status: u16,
    pub data: Bytes,
    pub headers: Headers,
    /// Server answered 304 and the payload was taken from the cache entry.
    pub not_modified: bool,
    pub network_time: Duration,
}

impl NetworkOutcome {
    pub fn new(status: u16, data: impl Into<Bytes>, headers: Headers) -> Self {
        Self {
            status,
            data: data.into(),
            headers,
            not_modified: false,
            network_time: Duration::ZERO,
        }
    }

    /// Outcome replaying a cached response.
    pub fn from_cache_entry(entry: &CacheEntry) -> Self {
        Self::new(200, entry.data.clone(), entry.response_headers.clone())
    }

    pub fn with_network_time(mut self, elapsed: Duration) -> Self {
        self.network_time = elapsed;
        self
    }

    /// Rebuild a 304 outcome from the entry being revalidated.
    ///
    /// The payload comes from the cache; headers are the cached ones overlaid
    /// with whatever the 304 carried. Names match case-insensitively.
    pub(crate) fn revalidated(self, entry: &CacheEntry) -> Self {
        let mut headers = entry.response_headers.clone();
        for (name, value) in self.headers {
            headers.retain(|cached, _| !cached.eq_ignore_ascii_case(&name));
            headers.insert(name, value);
        }
        Self {
            status: self.status,
            data: entry.data.clone(),
            headers,
            not_modified: true,
            network_time: self.network_time,
        }
    }
}

/// Transport-level failure reported by an executor.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Map onto the caller-visible taxonomy.
    pub fn classify(&self) -> ErrorKind {
        match self {
            TransportError::Timeout => ErrorKind::Timeout,
            TransportError::Connect(msg) => ErrorKind::NoConnection(msg.clone()),
            TransportError::Io(e) => ErrorKind::NoConnection(e.to_string()),
            TransportError::Http(e) if e.is_timeout() => ErrorKind::Timeout,
            TransportError::Http(e) if e.is_connect() => ErrorKind::NoConnection(e.to_string()),
            TransportError::Http(e) => ErrorKind::Network(e.to_string()),
            TransportError::Other(msg) => ErrorKind::Network(msg.clone()),
        }
    }
}

impl From<TransportError> for RequestError {
    fn from(err: TransportError) -> Self {
        RequestError::new(err.classify())
    }
}

/// Check an outcome's status: 2xx and 304 pass, 4xx is an auth failure,
/// 5xx a server error, anything else a network error.
pub fn classify_status(outcome: &NetworkOutcome) -> Result<(), ErrorKind> {
    match outcome.status {
        200..=299 | 304 => Ok(()),
        status @ 400..=499 => Err(ErrorKind::AuthFailure {
            status,
            body: outcome.data.clone(),
        }),
        status @ 500..=599 => Err(ErrorKind::ServerError {
            status,
            body: outcome.data.clone(),
        }),
        status => Err(ErrorKind::Network(format!(
            "unexpected response code {}",
            status
        ))),
    }
}

/// Performs HTTP exchanges for the network dispatcher.
///
/// Implementations return an outcome for every status code and raise a
/// [`TransportError`] only when no response was obtained.
#[async_trait]
pub trait NetworkExecutor: Send + Sync {
    async fn perform(
        &self,
        request: &HttpRequest,
        extra_headers: &Headers,
    ) -> Result<NetworkOutcome, TransportError>;
}
