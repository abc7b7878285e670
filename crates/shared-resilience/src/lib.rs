//! # Shared Resilience
//!
//! - [`RetryExecutor`]: bounded exponential backoff around any fallible async
//!   operation. At-least-once; the wrapped operation owns its idempotency.
//! - [`RateLimiter`]: per-client inbound throttle with a bypass token.
//! - [`OutboundThrottle`]: concurrency cap plus request pacing for calls the
//!   node makes to rate-limited third-party services.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod rate_limit;
pub mod retry;
pub mod throttle;

pub use rate_limit::{RateLimitConfig, RateLimitExceeded, RateLimiter};
pub use retry::{RetryExecutor, RetryPolicy};
pub use throttle::{OutboundThrottle, ThrottleConfig, ThrottleError, ThrottlePermit};
