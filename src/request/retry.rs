//! Retry Policy
//!
//! Per-request retry/backoff state. The network dispatcher consults the
//! policy after every retryable failure; the policy either allows another
//! attempt (growing the per-attempt timeout) or hands the error back.

use crate::error::RequestError;
use std::time::Duration;

/// Default per-attempt timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 2500;
/// Default number of retries.
pub const DEFAULT_MAX_RETRIES: u32 = 1;
/// Default backoff multiplier.
pub const DEFAULT_BACKOFF_MULTIPLIER: f32 = 1.0;

/// Retry state machine for one request.
pub trait RetryPolicy: Send {
    /// Timeout for the next attempt.
    fn current_timeout(&self) -> Duration;

    /// Retries consumed so far.
    fn current_retry_count(&self) -> u32;

    /// Prepare for the next attempt.
    ///
    /// `Ok(())` means try again; `Err` returns the error to deliver.
    fn retry(&mut self, error: RequestError) -> Result<(), RequestError>;

    fn set_timeout(&mut self, _timeout: Duration) {}

    fn set_max_retries(&mut self, _max_retries: u32) {}
}

/// Linear-multiplier backoff on the per-attempt timeout.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultRetryPolicy {
    current_timeout_ms: u64,
    current_retry_count: u32,
    max_retries: u32,
    backoff_multiplier: f32,
}

impl DefaultRetryPolicy {
    pub fn new(initial_timeout: Duration, max_retries: u32, backoff_multiplier: f32) -> Self {
        Self {
            current_timeout_ms: initial_timeout.as_millis() as u64,
            current_retry_count: 0,
            max_retries,
            backoff_multiplier,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn backoff_multiplier(&self) -> f32 {
        self.backoff_multiplier
    }

    fn has_attempt_remaining(&self) -> bool {
        self.current_retry_count < self.max_retries
    }
}

impl Default for DefaultRetryPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(DEFAULT_TIMEOUT_MS),
            DEFAULT_MAX_RETRIES,
            DEFAULT_BACKOFF_MULTIPLIER,
        )
    }
}

impl RetryPolicy for DefaultRetryPolicy {
    fn current_timeout(&self) -> Duration {
        Duration::from_millis(self.current_timeout_ms)
    }

    fn current_retry_count(&self) -> u32 {
        self.current_retry_count
    }

    fn retry(&mut self, error: RequestError) -> Result<(), RequestError> {
        if !self.has_attempt_remaining() {
            return Err(error);
        }
        self.current_retry_count += 1;
        let grow = (self.current_timeout_ms as f64 * self.backoff_multiplier as f64) as u64;
        self.current_timeout_ms = self.current_timeout_ms.saturating_add(grow);
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.current_timeout_ms = timeout.as_millis() as u64;
    }

    fn set_max_retries(&mut self, max_retries: u32) {
        self.max_retries = max_retries;
    }
}
