//! Bounded retry with exponential backoff for driver operations.
//!
//! Connection failures and timeouts ([`Error::is_retryable`]) are retried up
//! to `max_attempts` times; every other error surfaces immediately. Schema
//! errors are never retried.
//!
//! ```text
//! attempt 1 ──fail──> sleep(initial) ──> attempt 2 ──fail──> sleep(2·initial) ──> ... ──> Err
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry configuration for driver operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first (minimum 1).
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Sets the maximum number of attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the initial backoff.
    #[must_use]
    pub const fn with_initial_backoff_ms(mut self, ms: u64) -> Self {
        self.initial_backoff_ms = ms;
        self
    }

    /// Calculates the delay after a failed attempt (1-based).
    ///
    /// Formula: `initial_backoff_ms * 2^(attempt - 1)`, capped at `max_backoff_ms`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let ms = self
            .initial_backoff_ms
            .saturating_mul(1 << (attempt - 1).min(10))
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    /// Runs `op`, retrying retryable failures with backoff.
    ///
    /// The last error is returned once attempts are exhausted.
    pub fn run<T, F>(&self, backend: &'static str, operation: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.delay_for_attempt(attempt);
                    metrics::counter!(
                        "graph_driver_retries_total",
                        "backend" => backend,
                        "operation" => operation
                    )
                    .increment(1);
                    tracing::warn!(
                        backend,
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Retrying after transient failure"
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    attempt += 1;
                },
                Err(err) => {
                    if err.is_retryable() {
                        metrics::counter!(
                            "graph_driver_retries_exhausted_total",
                            "backend" => backend,
                            "operation" => operation
                        )
                        .increment(1);
                    }
                    return Err(err);
                },
            }
        }
    }
}

/// Builds a connection error for `backend`.
pub fn connection_error(backend: &str, cause: impl ToString) -> Error {
    Error::Connection {
        backend: backend.to_string(),
        cause: cause.to_string(),
    }
}
