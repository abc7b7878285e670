//! Per-client inbound rate limiting.
//!
//! Each client key (IP address) gets its own governor limiter allowing
//! `max_requests` per `window_secs`, refilled continuously. Requests carrying
//! the configured bypass token, and whitelisted clients, are never limited.

use dashmap::DashMap;
use governor::{
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::time::{Duration, Instant};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Window length in seconds.
    pub window_secs: u64,
    /// Requests allowed per window and client.
    pub max_requests: u32,
    /// Requests presenting this token skip limiting.
    pub bypass_token: Option<String>,
    /// Clients that are never limited.
    pub whitelist: Vec<IpAddr>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 1,
            max_requests: 10,
            bypass_token: None,
            whitelist: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("too many requests, retry after {retry_after:?}")]
pub struct RateLimitExceeded {
    pub retry_after: Duration,
}

struct ClientBucket {
    limiter: GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>,
    last_access: Instant,
}

/// Shared limiter state.
pub struct RateLimiter {
    buckets: DashMap<IpAddr, ClientBucket>,
    quota: Quota,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let max = NonZeroU32::new(config.max_requests).unwrap_or(NonZeroU32::MIN);
        let window = Duration::from_secs(config.window_secs.max(1));
        let period = window / max.get();
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(max))
            .allow_burst(max);
        Self {
            buckets: DashMap::new(),
            quota,
            config,
        }
    }

    fn bypassed(&self, client: &IpAddr, token: Option<&str>) -> bool {
        if !self.config.enabled || self.config.whitelist.contains(client) {
            return true;
        }
        match (self.config.bypass_token.as_deref(), token) {
            (Some(expected), Some(given)) if !expected.is_empty() => {
                bool::from(expected.as_bytes().ct_eq(given.as_bytes()))
            }
            _ => false,
        }
    }

    /// Admit or reject one request from `client`.
    pub fn check(&self, client: IpAddr, token: Option<&str>) -> Result<(), RateLimitExceeded> {
        if self.bypassed(&client, token) {
            return Ok(());
        }

        let mut bucket = self.buckets.entry(client).or_insert_with(|| {
            debug!(client = %client, "Creating rate limit bucket");
            ClientBucket {
                limiter: GovernorLimiter::direct(self.quota),
                last_access: Instant::now(),
            }
        });
        bucket.last_access = Instant::now();

        bucket.limiter.check().map_err(|not_until| RateLimitExceeded {
            retry_after: not_until.wait_time_from(DefaultClock::default().now()),
        })
    }

    /// Drop buckets idle for longer than `max_age`.
    pub fn cleanup(&self, max_age: Duration) {
        let now = Instant::now();
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.last_access) <= max_age);
    }

    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}
