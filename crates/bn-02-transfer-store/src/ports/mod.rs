//! # Ports Layer
//!
//! - `inbound`: API exposed to the other subsystems
//! - `outbound`: persistence the store depends on

pub mod inbound;
pub mod outbound;

pub use inbound::{ApplyOutcome, BatchReport, StoreSnapshot, TransferStateApi};
pub use outbound::{BatchOperation, KeyValueStore, ScanResult};
