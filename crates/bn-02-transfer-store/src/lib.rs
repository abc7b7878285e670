//! # Transfer State Store (bn-02)
//!
//! The single source of truth for transfer, bundle and message state.
//!
//! ## Model
//!
//! A durable append-only event log with state derived by folding it:
//!
//! ```text
//! Watchers (01) ──commit_batch──┐
//! Bonding  (03) ──record_bond───┤      ┌───────────┐      ┌──────────────┐
//! Relay    (05) ──record_relayed┼────► │ event log │ ───► │ LedgerState  │ ──► TransitionBus
//! Reorgs   (01) ──rollback──────┘      │  (KV)     │ fold │ (RwLock)     │
//!                                      └───────────┘      └──────────────┘
//! ```
//!
//! ## Domain Invariants
//!
//! | Invariant | Enforcement |
//! |-----------|-------------|
//! | Idempotent apply | Chain events dedupe on `(transaction_hash, log_index)` |
//! | Monotonic state | A record only advances; rollback re-derives from the log |
//! | One bond per transfer | Bonds dedupe on tx hash; a second bond is ignored |
//! | Settled implies bonded or unbondable | See `domain::state::target_state` |
//! | Atomic batches | Events and watermark go to the KV in one batch write |
//! | Reconstructible | `open` folds the persisted log into fresh state |
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - Ledger records, the fold, errors, config
//! - `ports/` - `TransferStateApi` (inbound), `KeyValueStore` (outbound)
//! - `adapters/` - In-memory and RocksDB (feature `rocksdb`) backends
//! - `service.rs` - `TransferStateStore`

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

#[cfg(test)]
mod test_utils;

pub use adapters::InMemoryKVStore;
#[cfg(feature = "rocksdb")]
pub use adapters::{RocksDbConfig, RocksDbStore};
pub use domain::{
    GapKey, KVStoreError, LedgerEvent, StoreConfig, StoreError, StoredEvent, UnresolvableGap,
};
pub use ports::inbound::{ApplyOutcome, BatchReport, StoreSnapshot, TransferStateApi};
pub use ports::outbound::{BatchOperation, KeyValueStore};
pub use service::TransferStateStore;
