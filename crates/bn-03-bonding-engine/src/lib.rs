//! # Bonding Decision Engine (bn-03)
//!
//! Decides whether this node advances its own liquidity to pay out a
//! transfer on the destination chain before the transfer's bundle settles.
//!
//! ```text
//!  TransferStateStore ──TransferObserved──► BondingDecisionEngine ──bondWithdrawal──► TransactionSubmitter
//!        ▲                                   │  per-route lock
//!        └──── record_bond / mark_unbondable ┘  LiquidityTracker (reserved / bonded)
//! ```
//!
//! ## Domain Invariants
//!
//! | Invariant | Enforcement |
//! |-----------|-------------|
//! | At most one bond per transfer | Ledger and tracker checked under the route lock |
//! | Liquidity never negative | Check and reserve in one tracker critical section |
//! | Skips are not errors | Skip and defer return `Ok(decision)` |
//! | Failed bonds free capital | Reservation released on any submission failure |

pub mod domain;
pub mod ports;
pub mod service;

#[cfg(test)]
mod test_utils;

pub use domain::{
    BondDecision, BondingConfig, BondingError, DeferReason, InsufficientLiquidity, LedgerError,
    LiquidityTracker, ReserveRequest, RouteConfig, RouteLiquidity, SkipReason,
};
pub use ports::inbound::BondingApi;
pub use ports::outbound::{BondLedger, CreditSource, GasOracle};
pub use service::{BondingDecisionEngine, BondingPorts};
