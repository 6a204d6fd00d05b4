//! Timeout and retry policy shared by every bounded operation

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that may succeed if the same call is repeated
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Outcome of a policy-run operation that did not succeed
#[derive(Debug, Clone, Error)]
pub enum PolicyError<E> {
    /// Every attempt ran past its deadline
    #[error("{operation} timed out after {after:?} ({attempts} attempt(s))")]
    TimedOut {
        operation: String,
        after: Duration,
        attempts: u32,
    },
    /// The operation itself failed with a non-transient error, or retries ran out
    #[error("{0}")]
    Failed(E),
}

/// Deadline per attempt plus bounded retries with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Single attempt with the given deadline
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    /// Builder method to allow retries
    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.backoff = backoff;
        self
    }

    /// Delay before retry number `attempt` (1-based)
    fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Run `op` under this policy.
    ///
    /// Each attempt is cancelled at the deadline; the future is dropped, so
    /// an attempt that never completed has no effect. Timeouts and transient
    /// errors are retried, anything else is returned at once.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, PolicyError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient + std::fmt::Display,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            debug!(%operation, attempt, timeout_ms = self.timeout.as_millis() as u64, "RetryPolicy::run: attempt");
            let retry_allowed = attempt <= self.max_retries;
            match tokio::time::timeout(self.timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    if !(e.is_transient() && retry_allowed) {
                        return Err(PolicyError::Failed(e));
                    }
                    warn!(%operation, attempt, error = %e, "Transient failure, retrying");
                }
                Err(_) => {
                    if !retry_allowed {
                        warn!(%operation, attempts = attempt, timeout = ?self.timeout, "Operation timed out");
                        return Err(PolicyError::TimedOut {
                            operation: operation.to_string(),
                            after: self.timeout,
                            attempts: attempt,
                        });
                    }
                    warn!(%operation, attempt, timeout = ?self.timeout, "Attempt timed out, retrying");
                }
            }
            let delay = self.delay_for(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// The full set of policies, built once from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policies {
    /// Compound cache mutations (mutual-exclusion acquisition + apply)
    pub cache_update: RetryPolicy,
    /// Bulk cache replacement during sync
    pub cache_bulk: RetryPolicy,
    /// Remote reads awaited by a caller
    pub remote_read: RetryPolicy,
    /// Remote writes, both awaited and background write-through
    pub remote_write: RetryPolicy,
    /// Full application fetch during sync
    pub sync: RetryPolicy,
}

impl Default for Policies {
    fn default() -> Self {
        crate::config::Config::default().policies()
    }
}
