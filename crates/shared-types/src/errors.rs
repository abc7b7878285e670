//! # Error Classes
//!
//! Every subsystem defines its own error enum. This module gives them a
//! common classification so the runtime and the retry layer can decide what
//! is recoverable without matching on foreign types.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::entities::ChainId;

/// Failure taxonomy shared by all subsystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    /// RPC or network failure. Retried.
    TransientIO,
    /// Chain reorganization. Handled by rollback, never surfaced to callers.
    Reorg,
    /// Predecessor state missing; the event is buffered.
    OutOfOrderEvent,
    /// A buffered event outlived the gap timeout.
    UnresolvableGap,
    /// Normal skip: not enough bonder liquidity.
    InsufficientLiquidity,
    /// Normal skip: amount below the configured minimum.
    BelowThreshold,
    /// Bundle reconciliation missed its deadline.
    IncompleteSettlement,
    /// Fatal at startup.
    InvalidConfiguration,
    /// Attestation could not be fetched. Retried forever.
    AttestationFailure,
    /// Malformed input rejected before any state mutation.
    InvalidInput,
    /// A submitted transaction reverted or was dropped unmined.
    TransactionReverted,
}

impl ErrorClass {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::TransientIO | ErrorClass::AttestationFailure)
    }

    /// Errors that must stop the process (or the affected transfer) rather
    /// than be recovered locally.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ErrorClass::InvalidConfiguration | ErrorClass::UnresolvableGap
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ErrorClass::TransientIO => "transient_io",
            ErrorClass::Reorg => "reorg",
            ErrorClass::OutOfOrderEvent => "out_of_order_event",
            ErrorClass::UnresolvableGap => "unresolvable_gap",
            ErrorClass::InsufficientLiquidity => "insufficient_liquidity",
            ErrorClass::BelowThreshold => "below_threshold",
            ErrorClass::IncompleteSettlement => "incomplete_settlement",
            ErrorClass::InvalidConfiguration => "invalid_configuration",
            ErrorClass::AttestationFailure => "attestation_failure",
            ErrorClass::InvalidInput => "invalid_input",
            ErrorClass::TransactionReverted => "transaction_reverted",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Implemented by every subsystem error.
pub trait Classified {
    fn class(&self) -> ErrorClass;

    fn is_retryable(&self) -> bool {
        self.class().is_retryable()
    }
}

/// Failure of a read-only chain query: credit, gas price, balances, nonces.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainReadError {
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("no endpoint configured for chain {0}")]
    UnsupportedChain(ChainId),
}

impl Classified for ChainReadError {
    fn class(&self) -> ErrorClass {
        match self {
            ChainReadError::Rpc(_) => ErrorClass::TransientIO,
            ChainReadError::UnsupportedChain(_) => ErrorClass::InvalidConfiguration,
        }
    }
}
