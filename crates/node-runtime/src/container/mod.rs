//! # Node Container
//!
//! Builds every subsystem from one [`BonderConfig`] and holds the shared
//! instances for the runtime.

pub mod config;
pub mod subsystems;

pub use config::{BonderConfig, ConfigError};
pub use subsystems::NodeContainer;
