//! # Chain Event Watcher (bn-01)
//!
//! Turns one contract's logs on one chain into typed, validated
//! [`ChainEvent`](shared_types::ChainEvent)s, committed to the transfer
//! state store together with a watermark.
//!
//! ```text
//!  ChainDataSource ──head/get_block/get_logs──► ChainEventWatcher ──commit──► EventSink
//!        ▲                                        │   BlockWindow               (bn-02)
//!        └────────── subscribe (new heads) ───────┘   reorg ──rollback──►
//! ```
//!
//! ## Domain Invariants
//!
//! | Invariant | Enforcement |
//! |-----------|-------------|
//! | No fabricated events | A truncated log batch fails the poll; the watermark stays |
//! | Reorg-safe | Recorded hashes re-checked each poll, rollback below the fork |
//! | Rollback bound | Target never above `head - reorg_safety_depth` |
//! | Derived identity | Transfer ids computed from the log, never trusted |
//! | Atomic progress | Events and watermark committed in one sink call |

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::ScriptedChain;
pub use domain::{
    decode_log, BlockHeader, BlockWindow, DataSourceError, Decoded, LogBatch, LogFilter,
    PollOutcome, RawLog, SinkError, WatcherConfig, WatcherError,
};
pub use ports::inbound::ChainWatcherApi;
pub use ports::outbound::{ChainDataSource, EventSink};
pub use service::ChainEventWatcher;
