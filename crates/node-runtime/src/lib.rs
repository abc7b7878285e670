//! # Bonder Node Runtime
//!
//! Assembles the bonder node from its subsystems.
//!
//! - `container/` - configuration and subsystem construction
//! - `adapters/` - JSON-RPC, ABI, signer, store bridges and the status server
//! - `wiring/` - task supervision and shutdown

pub mod adapters;
pub mod container;
pub mod wiring;

pub use container::{BonderConfig, ConfigError, NodeContainer};
pub use wiring::NodeRuntime;
