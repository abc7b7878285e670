//! # Domain Layer
//!
//! Ledger records, the fold that derives state from them, and errors.

pub mod config;
pub mod errors;
pub mod ledger;
pub mod state;

pub use config::StoreConfig;
pub use errors::{KVStoreError, StoreError};
pub use ledger::{GapKey, LedgerEvent, StoredEvent};
pub use state::{target_state, Admission, LedgerState, UnresolvableGap};
