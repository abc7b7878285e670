//! # Outbound Ports (Driven Ports)
//!
//! The bonding engine reads transfer records from the ledger, reads bonder
//! credit and gas prices from destination chains, and submits through the
//! shared [`TransactionSubmitter`](shared_types::TransactionSubmitter).

use async_trait::async_trait;
use shared_types::{
    Amount, BondedWithdrawal, ChainId, ChainReadError, TokenSymbol, Transfer, TransferId,
    TransferRecord,
};

use crate::domain::errors::LedgerError;

/// Transfer records as persisted by the state store.
pub trait BondLedger: Send + Sync {
    fn get(&self, transfer_id: &TransferId) -> Option<TransferRecord>;

    /// Record a confirmed bond. Idempotent on the bond's transaction hash.
    fn record_bond(&self, bond: BondedWithdrawal) -> Result<(), LedgerError>;

    fn mark_unbondable(&self, transfer_id: &TransferId, reason: &str) -> Result<(), LedgerError>;

    /// Transfers still `Sent` and not marked unbondable.
    fn pending_transfers(&self) -> Vec<Transfer>;

    /// Bonds whose bundle has not settled yet.
    fn bonded_unsettled(&self) -> Vec<(Transfer, BondedWithdrawal)>;
}

/// Total bonder credit for a token on a chain. Outstanding bonds are
/// tracked locally and not subtracted by the source.
#[async_trait]
pub trait CreditSource: Send + Sync {
    async fn credit(&self, chain_id: ChainId, token: &TokenSymbol) -> Result<Amount, ChainReadError>;
}

#[async_trait]
pub trait GasOracle: Send + Sync {
    /// Current gas price in wei.
    async fn gas_price(&self, chain_id: ChainId) -> Result<Amount, ChainReadError>;
}
