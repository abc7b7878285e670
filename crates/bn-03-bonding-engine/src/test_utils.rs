//! In-memory doubles for the engine's ports.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{
    keccak256, Address, Amount, BondedWithdrawal, ChainId, ChainReadError, PreparedTx,
    SubmitError, TokenSymbol, Transfer, TransactionSubmitter, TransferId, TransferRecord,
    TransferState, TxHash, TxReceipt,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::domain::config::{BondingConfig, RouteConfig};
use crate::domain::errors::LedgerError;
use crate::ports::outbound::{BondLedger, CreditSource, GasOracle};

pub const SOURCE: ChainId = ChainId(1);
pub const DESTINATION: ChainId = ChainId(10);
pub const NOW: u64 = 1_700_000_000;

pub fn usdc() -> TokenSymbol {
    TokenSymbol::new("USDC")
}

pub fn transfer(n: u8, amount: u64) -> Transfer {
    let sender = Address([0x11; 20]);
    let recipient = Address([0x22; 20]);
    let nonce = [n; 32];
    let amount = Amount::from(amount);
    Transfer {
        transfer_id: TransferId::derive(SOURCE, &sender, &recipient, amount, &nonce),
        source_chain: SOURCE,
        destination_chain: DESTINATION,
        token: usdc(),
        sender,
        recipient,
        amount,
        bonder_fee: Amount::from(10u64),
        nonce,
        deadline: 0,
        sent_at: NOW - 60,
    }
}

pub fn route() -> RouteConfig {
    RouteConfig::new(usdc(), DESTINATION, Address([0xbb; 20]))
}

pub fn config() -> BondingConfig {
    BondingConfig::new(Address([0xb0; 20])).with_route(route())
}

// =============================================================================
// LEDGER
// =============================================================================

#[derive(Default)]
pub struct MockLedger {
    pub records: Mutex<HashMap<TransferId, TransferRecord>>,
    pub fail_record: AtomicBool,
}

impl MockLedger {
    pub fn with(transfers: &[&Transfer]) -> Self {
        let ledger = Self::default();
        for t in transfers {
            ledger.insert((*t).clone());
        }
        ledger
    }

    pub fn insert(&self, transfer: Transfer) {
        self.records
            .lock()
            .insert(transfer.transfer_id, TransferRecord::new(transfer));
    }

    pub fn record(&self, id: &TransferId) -> Option<TransferRecord> {
        self.records.lock().get(id).cloned()
    }
}

impl BondLedger for MockLedger {
    fn get(&self, transfer_id: &TransferId) -> Option<TransferRecord> {
        self.record(transfer_id)
    }

    fn record_bond(&self, bond: BondedWithdrawal) -> Result<(), LedgerError> {
        if self.fail_record.load(Ordering::SeqCst) {
            return Err(LedgerError::new(
                shared_types::ErrorClass::TransientIO,
                "disk full",
            ));
        }
        let mut records = self.records.lock();
        if let Some(record) = records.get_mut(&bond.transfer_id) {
            if record.bond.is_none() {
                record.state = TransferState::Bonded;
                record.history.push(TransferState::Bonded);
                record.bond = Some(bond);
            }
        }
        Ok(())
    }

    fn mark_unbondable(&self, transfer_id: &TransferId, reason: &str) -> Result<(), LedgerError> {
        if let Some(record) = self.records.lock().get_mut(transfer_id) {
            record.unbondable = Some(reason.to_string());
        }
        Ok(())
    }

    fn pending_transfers(&self) -> Vec<Transfer> {
        self.records
            .lock()
            .values()
            .filter(|r| r.state == TransferState::Sent && r.unbondable.is_none())
            .map(|r| r.transfer.clone())
            .collect()
    }

    fn bonded_unsettled(&self) -> Vec<(Transfer, BondedWithdrawal)> {
        self.records
            .lock()
            .values()
            .filter(|r| r.state != TransferState::Settled)
            .filter_map(|r| r.bond.clone().map(|b| (r.transfer.clone(), b)))
            .collect()
    }
}

// =============================================================================
// CHAIN READS
// =============================================================================

pub struct FixedCredit {
    pub credit: Mutex<Amount>,
    pub failures: AtomicUsize,
}

impl FixedCredit {
    pub fn new(credit: u64) -> Self {
        Self {
            credit: Mutex::new(Amount::from(credit)),
            failures: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CreditSource for FixedCredit {
    async fn credit(&self, _chain_id: ChainId, _token: &TokenSymbol) -> Result<Amount, ChainReadError> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ChainReadError::Rpc("connection reset".into()));
        }
        Ok(*self.credit.lock())
    }
}

pub struct FixedGas(pub AtomicU64);

impl FixedGas {
    pub fn gwei(gwei: u64) -> Self {
        Self(AtomicU64::new(gwei * 1_000_000_000))
    }
}

#[async_trait]
impl GasOracle for FixedGas {
    async fn gas_price(&self, _chain_id: ChainId) -> Result<Amount, ChainReadError> {
        Ok(Amount::from(self.0.load(Ordering::SeqCst)))
    }
}

// =============================================================================
// SUBMITTER
// =============================================================================

#[derive(Default)]
pub struct MockSubmitter {
    pub sent: Mutex<Vec<PreparedTx>>,
    /// Leading `send` calls that fail with an RPC error.
    pub transient_failures: AtomicUsize,
    pub reject: AtomicBool,
    pub revert: AtomicBool,
    /// Confirmation never arrives within the wait.
    pub unconfirmed: AtomicBool,
    /// The chain forgot the transaction.
    pub dropped: AtomicBool,
    /// Every hash `wait_for_confirmation` was called with.
    pub waited: Mutex<Vec<TxHash>>,
    /// Simulated confirmation latency.
    pub confirm_delay_ms: AtomicU64,
}

impl MockSubmitter {
    pub fn sends(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl TransactionSubmitter for MockSubmitter {
    async fn send(&self, tx: &PreparedTx) -> Result<TxHash, SubmitError> {
        if self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SubmitError::Rpc("timeout".into()));
        }
        if self.reject.load(Ordering::SeqCst) {
            return Err(SubmitError::Rejected("insufficient funds for gas".into()));
        }
        let mut sent = self.sent.lock();
        sent.push(tx.clone());
        Ok(TxHash(keccak256(&(sent.len() as u64).to_be_bytes())))
    }

    async fn wait_for_confirmation(
        &self,
        _chain_id: ChainId,
        tx_hash: TxHash,
    ) -> Result<TxReceipt, SubmitError> {
        let delay = self.confirm_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        } else {
            tokio::task::yield_now().await;
        }
        self.waited.lock().push(tx_hash);
        if self.dropped.load(Ordering::SeqCst) {
            return Err(SubmitError::Dropped { tx_hash });
        }
        if self.unconfirmed.load(Ordering::SeqCst) {
            return Err(SubmitError::ConfirmationTimeout { tx_hash });
        }
        Ok(TxReceipt {
            tx_hash,
            block_number: 500,
            success: !self.revert.load(Ordering::SeqCst),
        })
    }
}
