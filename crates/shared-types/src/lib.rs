//! # Shared Types Crate
//!
//! Domain entities, identifiers and typed chain events shared by every bonder
//! subsystem.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every cross-subsystem type is defined here.
//! - **Derived Identity**: `TransferId`, `BundleId` and `MessageHash` are
//!   computed from on-chain data, never taken on trust from a provider.
//! - **Tagged Events**: chain events are a closed enum with required fields,
//!   validated once at the ingestion boundary.

pub mod cctp;
pub mod entities;
pub mod errors;
pub mod events;
pub mod time;
pub mod tx;

pub use entities::*;
pub use errors::*;
pub use events::*;
pub use time::{ManualTimeSource, SystemTimeSource, TimeSource};
pub use tx::*;
