//! Bounded retry with exponential backoff.
//!
//! Every store and cache call issued by the orchestrator goes through a
//! [`RetryExecutor`]. The delay starts at `initial_backoff` and doubles after
//! every failed attempt, with no cap and no jitter. The final failed attempt
//! sleeps too, so five failures cost 1+2+4+8+16 seconds before the last error
//! is returned.
//!
//! A sleep in progress is never interrupted by the executor itself. The
//! optional deadline is only consulted before a new attempt is started, so an
//! operation may overrun it by one backoff interval. Dropping the returned
//! future is the only way to abandon a sleep early.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Default attempt budget for every retried call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay before the second attempt.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Attempt budget and backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
        }
    }

    /// Delay slept after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff.saturating_mul(factor)
    }

    /// Total sleep incurred when the first `failures` attempts fail.
    pub fn total_backoff(&self, failures: u32) -> Duration {
        (1..=failures)
            .map(|attempt| self.delay_after(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Runs fallible async operations under a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    deadline: Option<Instant>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            deadline: None,
        }
    }

    /// Stop starting new attempts once `deadline` has passed.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Retry a unit operation, treating every error as retryable.
    pub async fn run<E, F, Fut>(&self, operation: &str, op: F) -> Result<(), E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        self.run_with_value_if(operation, op, |_| true).await
    }

    /// Retry a value-returning operation, treating every error as retryable.
    pub async fn run_with_value<T, E, F, Fut>(&self, operation: &str, op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_with_value_if(operation, op, |_| true).await
    }

    /// Retry a unit operation while `retryable` accepts the error.
    pub async fn run_if<E, F, Fut, P>(&self, operation: &str, op: F, retryable: P) -> Result<(), E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        P: Fn(&E) -> bool,
    {
        self.run_with_value_if(operation, op, retryable).await
    }

    /// Retry a value-returning operation while `retryable` accepts the error.
    ///
    /// An error rejected by `retryable` is returned immediately without sleeping.
    pub async fn run_with_value_if<T, E, F, Fut, P>(
        &self,
        operation: &str,
        mut op: F,
        retryable: P,
    ) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let attempts = self.policy.attempts();
        let mut delay = self.policy.initial_backoff;
        let mut attempt = 1;

        loop {
            let err = match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(operation, attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !retryable(&err) {
                tracing::debug!(operation, attempt, error = %err, "Permanent failure, not retrying");
                return Err(err);
            }

            tracing::warn!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Attempt failed, backing off"
            );
            tokio::time::sleep(delay).await;
            delay = delay.saturating_mul(2);

            if attempt >= attempts {
                tracing::warn!(operation, attempts, error = %err, "Retry budget exhausted");
                return Err(err);
            }
            attempt += 1;

            if let Some(deadline) = self.deadline {
                if Instant::now() >= deadline {
                    tracing::warn!(operation, attempt, error = %err, "Deadline passed, giving up");
                    return Err(err);
                }
            }
        }
    }
}
