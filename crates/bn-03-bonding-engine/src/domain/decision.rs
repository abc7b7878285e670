//! Decision outcomes. Skips and deferrals are normal operation, not errors.

use serde::{Deserialize, Serialize};
use shared_types::{ErrorClass, TxHash};
use std::fmt;

/// The transfer will not be bonded now. Re-evaluated on the next rescan
/// unless it was also marked unbondable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkipReason {
    /// Marked unbondable earlier, or settled without a bond.
    Unbondable,
    RouteDisabled,
    BelowThreshold,
    FeeTooLow,
    DeadlineExpired,
    GasLimitOutOfBounds,
    InsufficientLiquidity,
}

impl SkipReason {
    pub fn name(&self) -> &'static str {
        match self {
            SkipReason::Unbondable => "unbondable",
            SkipReason::RouteDisabled => "route_disabled",
            SkipReason::BelowThreshold => "below_threshold",
            SkipReason::FeeTooLow => "fee_too_low",
            SkipReason::DeadlineExpired => "deadline_expired",
            SkipReason::GasLimitOutOfBounds => "gas_limit_out_of_bounds",
            SkipReason::InsufficientLiquidity => "insufficient_liquidity",
        }
    }

    /// Error class of the skip, for the reasons that have one.
    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            SkipReason::BelowThreshold => Some(ErrorClass::BelowThreshold),
            SkipReason::InsufficientLiquidity => Some(ErrorClass::InsufficientLiquidity),
            _ => None,
        }
    }

    /// Skips that can never turn into a bond later.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            SkipReason::Unbondable | SkipReason::BelowThreshold | SkipReason::DeadlineExpired
        )
    }
}

/// Conditions expected to clear on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeferReason {
    GasPriceTooHigh,
    DryMode,
    /// Another evaluation of the same transfer holds a reservation.
    InFlight,
}

impl DeferReason {
    pub fn name(&self) -> &'static str {
        match self {
            DeferReason::GasPriceTooHigh => "gas_price_too_high",
            DeferReason::DryMode => "dry_mode",
            DeferReason::InFlight => "in_flight",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BondDecision {
    /// Bond confirmed on the destination chain and recorded.
    Bonded { tx_hash: TxHash },
    AlreadyBonded,
    Skip(SkipReason),
    Defer(DeferReason),
}

impl BondDecision {
    /// `(decision, reason)` metric labels.
    pub fn labels(&self) -> [&'static str; 2] {
        match self {
            BondDecision::Bonded { .. } => ["bonded", "none"],
            BondDecision::AlreadyBonded => ["already_bonded", "none"],
            BondDecision::Skip(reason) => ["skip", reason.name()],
            BondDecision::Defer(reason) => ["defer", reason.name()],
        }
    }
}

impl fmt::Display for BondDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BondDecision::Bonded { tx_hash } => write!(f, "bonded in {}", tx_hash),
            BondDecision::AlreadyBonded => f.write_str("already bonded"),
            BondDecision::Skip(reason) => write!(f, "skip: {}", reason.name()),
            BondDecision::Defer(reason) => write!(f, "defer: {}", reason.name()),
        }
    }
}
