//! # Domain Errors
//!
//! Error types for the transfer state store.

use shared_types::{Classified, ErrorClass, MessageHash, TransferId};
use thiserror::Error;

use crate::domain::ledger::GapKey;

/// Errors raised by the key-value backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KVStoreError {
    #[error("I/O error: {message}")]
    IOError { message: String },

    #[error("backend unavailable: {message}")]
    Unavailable { message: String },
}

/// Errors that can occur during store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The event's predecessor is unknown. The event was persisted and
    /// buffered; it will be applied once the predecessor arrives.
    #[error("out of order event: waiting for {gap}")]
    OutOfOrderEvent { gap: GapKey },

    /// The predecessor never arrived within the gap timeout.
    #[error("unresolvable gap: {gap}")]
    UnresolvableGap { gap: GapKey },

    #[error("unknown transfer {0}")]
    UnknownTransfer(TransferId),

    #[error("unknown message {0}")]
    UnknownMessage(MessageHash),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    Storage(#[from] KVStoreError),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Classified for StoreError {
    fn class(&self) -> ErrorClass {
        match self {
            StoreError::OutOfOrderEvent { .. } => ErrorClass::OutOfOrderEvent,
            StoreError::UnresolvableGap { .. } => ErrorClass::UnresolvableGap,
            StoreError::UnknownTransfer(_)
            | StoreError::UnknownMessage(_)
            | StoreError::InvalidInput(_) => ErrorClass::InvalidInput,
            StoreError::Storage(_) | StoreError::Serialization(_) => ErrorClass::TransientIO,
        }
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
