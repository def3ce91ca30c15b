use std::time::Duration;
use thiserror::Error;

use crate::network::TransportError;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "config.cache_dir")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "disk_cache", "request_queue")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Library-level error type.
///
/// Request failures that reach caller callbacks use [`RequestError`] instead;
/// this type covers construction, configuration and lifecycle faults.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },

    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new runtime error with structured context
    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } | Error::Runtime { context, .. } => {
                Some(context)
            }
            _ => None,
        }
    }
}

/// Classified failure of a single request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("request timed out")]
    Timeout,

    #[error("no connection: {0}")]
    NoConnection(String),

    #[error("authentication failure: HTTP {status}")]
    AuthFailure { status: u16, body: bytes::Bytes },

    #[error("server error: HTTP {status}")]
    ServerError { status: u16, body: bytes::Bytes },

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),

    /// Never reaches a caller callback; canceled requests are dropped at delivery.
    #[error("request canceled")]
    Canceled,
}

/// Error delivered to a request's error callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}{}", format_network_time(.network_time))]
pub struct RequestError {
    pub kind: ErrorKind,
    /// Wall time spent on the network before the request gave up.
    pub network_time: Option<Duration>,
}

fn format_network_time(t: &Option<Duration>) -> String {
    match t {
        Some(d) => format!(" (after {} ms)", d.as_millis()),
        None => String::new(),
    }
}

impl RequestError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            network_time: None,
        }
    }

    pub fn timeout() -> Self {
        Self::new(ErrorKind::Timeout)
    }

    pub fn no_connection(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoConnection(msg.into()))
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network(msg.into()))
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse(msg.into()))
    }

    pub fn with_network_time(mut self, elapsed: Duration) -> Self {
        self.network_time = Some(elapsed);
        self
    }

    /// Whether the dispatcher consults the retry policy for this failure.
    ///
    /// Server errors, parse errors and unclassified transport faults are
    /// surfaced immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Timeout | ErrorKind::NoConnection(_) | ErrorKind::AuthFailure { .. }
        )
    }

    /// HTTP status carried by the failure, if any.
    pub fn status(&self) -> Option<u16> {
        match &self.kind {
            ErrorKind::AuthFailure { status, .. } | ErrorKind::ServerError { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Stable class name used in log fields.
    pub fn class(&self) -> &'static str {
        match self.kind {
            ErrorKind::Timeout => "timeout",
            ErrorKind::NoConnection(_) => "no_connection",
            ErrorKind::AuthFailure { .. } => "auth_failure",
            ErrorKind::ServerError { .. } => "server_error",
            ErrorKind::Network(_) => "network",
            ErrorKind::Parse(_) => "parse",
            ErrorKind::Canceled => "canceled",
        }
    }
}

impl From<ErrorKind> for RequestError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}
