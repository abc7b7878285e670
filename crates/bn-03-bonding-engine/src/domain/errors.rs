use shared_types::{ChainId, ChainReadError, Classified, ErrorClass, SubmitError, TransferId};
use thiserror::Error;

/// Failure reported by the [`BondLedger`](crate::ports::outbound::BondLedger).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} ({class})")]
pub struct LedgerError {
    pub class: ErrorClass,
    pub message: String,
}

impl LedgerError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BondingError {
    #[error("invalid bonding configuration: {0}")]
    InvalidConfiguration(String),

    #[error("could not read {what} on chain {chain}: {source}")]
    ChainRead {
        what: &'static str,
        chain: ChainId,
        #[source]
        source: ChainReadError,
    },

    /// The bond was not confirmed. Liquidity was released; the transfer
    /// stays `Sent` and is re-evaluated later.
    #[error("bond submission for {transfer_id} failed: {source}")]
    Submission {
        transfer_id: TransferId,
        #[source]
        source: SubmitError,
    },

    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),
}

impl Classified for BondingError {
    fn class(&self) -> ErrorClass {
        match self {
            BondingError::InvalidConfiguration(_) => ErrorClass::InvalidConfiguration,
            BondingError::ChainRead { source, .. } => source.class(),
            BondingError::Submission { source, .. } => source.class(),
            BondingError::Ledger(e) => e.class,
        }
    }
}
