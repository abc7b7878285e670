use shared_types::{ChainId, ChainReadError, Classified, ErrorClass, MessageHash, SubmitError};
use thiserror::Error;

use super::state::RelayState;

/// Failure talking to the attestation service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttestationError {
    #[error("attestation request failed: {0}")]
    Http(String),

    #[error("attestation service answered {0}")]
    Status(u16),

    #[error("malformed attestation response: {0}")]
    Malformed(String),
}

impl Classified for AttestationError {
    fn class(&self) -> ErrorClass {
        ErrorClass::AttestationFailure
    }
}

/// Failure reported by the [`RelayLedger`](crate::ports::outbound::RelayLedger).
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
pub enum RelayError {
    #[error("invalid relay configuration: {0}")]
    InvalidConfiguration(String),

    #[error("{event} is not valid in state {from}")]
    InvalidTransition {
        from: RelayState,
        event: &'static str,
    },

    #[error(transparent)]
    Attestation(#[from] AttestationError),

    #[error("no message transmitter configured for chain {0}")]
    NoTransmitter(ChainId),

    #[error("nonce check on chain {chain} failed: {source}")]
    NonceCheck {
        chain: ChainId,
        #[source]
        source: ChainReadError,
    },

    #[error("relay of {message_hash} failed: {source}")]
    Submission {
        message_hash: MessageHash,
        #[source]
        source: SubmitError,
    },

    #[error("message {0} already has an active relay task")]
    AlreadyActive(MessageHash),

    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),
}

impl Classified for RelayError {
    fn class(&self) -> ErrorClass {
        match self {
            RelayError::InvalidConfiguration(_) | RelayError::NoTransmitter(_) => {
                ErrorClass::InvalidConfiguration
            }
            RelayError::InvalidTransition { .. } => ErrorClass::OutOfOrderEvent,
            RelayError::AlreadyActive(_) => ErrorClass::InvalidInput,
            RelayError::Attestation(e) => e.class(),
            RelayError::NonceCheck { source, .. } => source.class(),
            RelayError::Submission { source, .. } => source.class(),
            RelayError::Ledger(e) => e.class,
        }
    }
}
