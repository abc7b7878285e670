//! # Shared Bus - Store Transition Channels
//!
//! The transfer state store is the only producer. Every committed state
//! transition is published on the channel for its category; the bonding
//! engine, settlement coordinator and message relay subscribe once at
//! startup.
//!
//! ```text
//!                        ┌──────────────┐ transfers   ┌──────────────┐
//! ┌──────────────┐       │              │ ──────────► │ Bonding (03) │
//! │ Store (02)   │ ────► │ TransitionBus│ bundles     ├──────────────┤
//! │  publish()   │       │              │ ──────────► │ Settle (04)  │
//! └──────────────┘       │              │ messages    ├──────────────┤
//!                        └──────────────┘ ──────────► │ Relay (05)   │
//!                                                     └──────────────┘
//! ```
//!
//! Channels are broadcast with bounded capacity. A consumer that falls behind
//! loses the oldest transitions and is told how many it missed, so it can
//! rescan the store instead of trusting the stream.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod events;
pub mod publisher;
pub mod subscriber;

pub use events::{StoreTransition, TransitionTopic};
pub use publisher::{TransitionBus, TransitionPublisher};
pub use subscriber::{Subscription, SubscriptionError};

/// Maximum transitions buffered per channel before slow subscribers lag.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
