//! Outbound throttling for calls to rate-limited services.
//!
//! A permit bounds concurrency; the pacer spaces request starts.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Requests in flight at once.
    pub max_concurrent: usize,
    /// Request starts per second. Zero disables pacing.
    pub requests_per_second: u32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            requests_per_second: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ThrottleError {
    #[error("throttle closed")]
    Closed,
}

/// Held for the duration of one outbound request.
#[derive(Debug)]
pub struct ThrottlePermit {
    _permit: OwnedSemaphorePermit,
}

pub struct OutboundThrottle {
    semaphore: Arc<Semaphore>,
    pacer: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    config: ThrottleConfig,
}

impl OutboundThrottle {
    pub fn new(config: ThrottleConfig) -> Self {
        let pacer = NonZeroU32::new(config.requests_per_second)
            .map(|rps| RateLimiter::direct(Quota::per_second(rps)));
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            pacer,
            config,
        }
    }

    /// Wait for a concurrency slot, then for the pacer.
    pub async fn acquire(&self) -> Result<ThrottlePermit, ThrottleError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| ThrottleError::Closed)?;
        if let Some(pacer) = &self.pacer {
            pacer.until_ready().await;
        }
        Ok(ThrottlePermit { _permit: permit })
    }

    /// Slots not currently held.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrency_cap() {
        let throttle = Arc::new(OutboundThrottle::new(ThrottleConfig {
            max_concurrent: 2,
            requests_per_second: 0,
        }));

        let a = throttle.acquire().await.unwrap();
        let _b = throttle.acquire().await.unwrap();
        assert_eq!(throttle.available(), 0);

        let t = Arc::clone(&throttle);
        let third = tokio::spawn(async move { t.acquire().await.map(|_| ()) });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!third.is_finished());

        drop(a);
        tokio::time::timeout(Duration::from_secs(1), third)
            .await
            .expect("third permit granted")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_clamped() {
        let throttle = OutboundThrottle::new(ThrottleConfig {
            max_concurrent: 0,
            requests_per_second: 100,
        });
        assert!(throttle.acquire().await.is_ok());
    }
}
