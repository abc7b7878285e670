//! # Retry Executor
//!
//! `delay = 2^failures * base`, up to `max_attempts` attempts in total. With
//! the defaults (5 attempts, 1000 ms) a permanently failing operation sleeps
//! 2 s, 4 s, 8 s and 16 s before its fifth and last attempt.
//!
//! Backoff uses `tokio::time::sleep`, so only the calling task waits.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Attempt bound and backoff base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Base delay in milliseconds.
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no backoff.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
        }
    }

    /// Sleep after the `failures`-th consecutive failure (1-based).
    pub fn delay_after(&self, failures: u32) -> Duration {
        let factor = 1u32 << failures.min(31);
        Duration::from_millis(self.base_delay_ms).saturating_mul(factor)
    }

    /// Total sleep of an operation that never succeeds.
    pub fn worst_case_backoff(&self) -> Duration {
        (1..self.max_attempts)
            .map(|n| self.delay_after(n))
            .fold(Duration::ZERO, |acc, d| acc.saturating_add(d))
    }
}

/// Runs fallible async operations under a [`RetryPolicy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Retry `op` on every error until it succeeds or attempts run out. The
    /// last error is returned unchanged.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_while(operation, op, |_| true).await
    }

    /// Like [`run`](Self::run), but stops early on errors `should_retry`
    /// rejects.
    pub async fn run_while<T, E, F, Fut, P>(
        &self,
        operation: &str,
        mut op: F,
        should_retry: P,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
    {
        let mut failures = 0u32;
        loop {
            match op().await {
                Ok(value) => {
                    if failures > 0 {
                        debug!(operation, attempts = failures + 1, "Operation recovered after retry");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    failures += 1;
                    if failures >= self.policy.max_attempts {
                        warn!(operation, attempts = failures, error = %e, "Retries exhausted");
                        return Err(e);
                    }
                    if !should_retry(&e) {
                        debug!(operation, error = %e, "Error is not retryable");
                        return Err(e);
                    }
                    let delay = self.policy.delay_after(failures);
                    debug!(
                        operation,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Operation failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
