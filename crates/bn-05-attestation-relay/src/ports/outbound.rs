//! # Outbound Ports (Driven Ports)

use async_trait::async_trait;
use shared_types::{CctpMessage, ChainId, ChainReadError, MessageHash, TxHash};

use crate::domain::errors::{AttestationError, LedgerError};
use crate::domain::state::AttestationResponse;

/// Off-chain attestor keyed by message hash.
#[async_trait]
pub trait AttestationService: Send + Sync {
    async fn fetch(&self, message_hash: &MessageHash)
        -> Result<AttestationResponse, AttestationError>;
}

/// Reads the destination transmitter's consumed nonces.
#[async_trait]
pub trait NonceChecker: Send + Sync {
    /// `usedNonces(keccak256(source_domain ‖ nonce))` is set on `chain`.
    async fn is_nonce_used(
        &self,
        chain: ChainId,
        source_domain: u32,
        nonce: u64,
    ) -> Result<bool, ChainReadError>;
}

/// Messages as persisted by the state store.
pub trait RelayLedger: Send + Sync {
    fn message(&self, message_hash: &MessageHash) -> Option<CctpMessage>;

    /// `tx_hash` is `None` when another relayer consumed the nonce.
    fn record_relayed(
        &self,
        message_hash: MessageHash,
        tx_hash: Option<TxHash>,
    ) -> Result<(), LedgerError>;

    /// Messages not relayed yet.
    fn pending_messages(&self) -> Vec<CctpMessage>;
}
