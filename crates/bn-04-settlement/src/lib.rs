//! # Settlement Coordinator (bn-04)
//!
//! Reconciles committed bundles against the bonds this node (and others)
//! made, releases bonded liquidity once a bundle settles, and reports
//! bundles whose members never bonded.
//!
//! ```text
//!  TransferStateStore ──BundleCommitted / BundleSettled──► SettlementCoordinator
//!         │            ──TransferAdvanced / Unbondable───►   │ ReconciliationBook
//!         │                                                  ├──release──► LiquidityTracker
//!         └───────────── SettlementLedger (reads) ◄──────────┴──settleBondedWithdrawals──► TransactionSubmitter
//! ```
//!
//! ## Domain Invariants
//!
//! | Invariant | Enforcement |
//! |-----------|-------------|
//! | Liquidity released once per transfer | `LiquidityReleaser::release` returns `Some` once |
//! | Late bonds after settlement still release | `TransferAdvanced { to: Settled }` triggers release |
//! | Incomplete settlement reported once | `ReconciliationBook::expire` escalates `Pending` only |
//! | Arrival order irrelevant | Member state re-read from the ledger on every decision |

pub mod domain;
pub mod ports;
pub mod service;

#[cfg(test)]
mod test_utils;

pub use domain::{
    BundlePhase, IncompleteSettlement, MemberProgress, Reconciliation, ReconciliationBook,
    ReconcileStatus, SettleBridge, SettlementConfig, SettlementError,
};
pub use ports::inbound::SettlementApi;
pub use ports::outbound::{LiquidityReleaser, SettlementLedger};
pub use service::{SettleRetry, SettlementCoordinator, SettlementFeeds, SettlementPorts};
