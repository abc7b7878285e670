//! # Transaction Submission
//!
//! The signer/broadcaster capability shared by the bonding engine, the
//! settlement coordinator and the message relay. Submission is at-least-once;
//! callers dedupe on the resulting transaction hash.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entities::{Address, Amount, ChainId, Hash, TransferId, TxHash};
use crate::errors::{Classified, ErrorClass};

/// Contract calls the node knows how to make.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractCall {
    /// `bondWithdrawal(recipient, amount, transferNonce, bonderFee)` on the destination bridge.
    BondWithdrawal {
        recipient: Address,
        amount: Amount,
        transfer_nonce: Hash,
        bonder_fee: Amount,
    },

    /// `settleBondedWithdrawals(bonder, transferIds, totalAmount)` on the destination bridge.
    SettleBondedWithdrawals {
        bonder: Address,
        transfer_ids: Vec<TransferId>,
        total_amount: Amount,
    },

    /// `receiveMessage(message, attestation)` on the destination message transmitter.
    ReceiveMessage {
        message: Vec<u8>,
        attestation: Vec<u8>,
    },
}

impl ContractCall {
    pub fn name(&self) -> &'static str {
        match self {
            ContractCall::BondWithdrawal { .. } => "bondWithdrawal",
            ContractCall::SettleBondedWithdrawals { .. } => "settleBondedWithdrawals",
            ContractCall::ReceiveMessage { .. } => "receiveMessage",
        }
    }
}

/// A transaction ready for signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedTx {
    pub chain_id: ChainId,
    pub to: Address,
    pub call: ContractCall,
    /// Explicit gas limit; the signer estimates when absent.
    pub gas_limit: Option<u64>,
    /// Upper bound on gas price the signer may use.
    pub max_gas_price: Option<Amount>,
}

/// Outcome of a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("transaction {tx_hash} not confirmed in time")]
    ConfirmationTimeout { tx_hash: TxHash },

    #[error("transaction {tx_hash} reverted")]
    Reverted { tx_hash: TxHash },

    #[error("transaction {tx_hash} dropped before inclusion")]
    Dropped { tx_hash: TxHash },

    #[error("transaction rejected by signer: {0}")]
    Rejected(String),
}

impl Classified for SubmitError {
    fn class(&self) -> ErrorClass {
        match self {
            SubmitError::Rpc(_) | SubmitError::ConfirmationTimeout { .. } => ErrorClass::TransientIO,
            SubmitError::Reverted { .. } | SubmitError::Dropped { .. } => {
                ErrorClass::TransactionReverted
            }
            SubmitError::Rejected(_) => ErrorClass::InvalidInput,
        }
    }
}

impl SubmitError {
    /// A broadcast transaction is known to have had no effect. Any other
    /// failure after `send` leaves its outcome open.
    pub fn is_dead(&self) -> bool {
        matches!(self, SubmitError::Reverted { .. } | SubmitError::Dropped { .. })
    }
}

/// Injected signer/broadcaster.
#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    /// Sign and broadcast, returning the transaction hash.
    async fn send(&self, tx: &PreparedTx) -> Result<TxHash, SubmitError>;

    /// Block until the transaction is mined with enough confirmations.
    async fn wait_for_confirmation(
        &self,
        chain_id: ChainId,
        tx_hash: TxHash,
    ) -> Result<TxReceipt, SubmitError>;
}
