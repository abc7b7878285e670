//! Port doubles and fixtures for the coordinator tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{
    keccak256, Address, Amount, BondedWithdrawal, Bundle, BundleId, BundleSettlement, ChainId,
    PreparedTx, SubmitError, TokenSymbol, Transfer, TransactionSubmitter, TransferId,
    TransferRecord, TransferState, TxHash, TxReceipt,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::ports::outbound::{LiquidityReleaser, SettlementLedger};

pub const DESTINATION: ChainId = ChainId(10);
pub const BONDER: Address = Address([0xb0; 20]);
pub const OTHER_BONDER: Address = Address([0xcc; 20]);
pub const BRIDGE: Address = Address([0xbb; 20]);

pub fn transfer(n: u8, amount: u64) -> Transfer {
    Transfer {
        transfer_id: TransferId([n; 32]),
        source_chain: ChainId(1),
        destination_chain: DESTINATION,
        token: TokenSymbol::new("USDC"),
        sender: Address([0x11; 20]),
        recipient: Address([0x22; 20]),
        amount: Amount::from(amount),
        bonder_fee: Amount::from(1u64),
        nonce: [n; 32],
        deadline: 0,
        sent_at: 1_000,
    }
}

pub fn bundle_of(members: &[&Transfer], committed_at: u64) -> Bundle {
    let ids: Vec<TransferId> = members.iter().map(|t| t.transfer_id).collect();
    let root = keccak256(&ids.iter().flat_map(|id| id.0).collect::<Vec<u8>>());
    Bundle {
        bundle_id: BundleId::derive(&root, DESTINATION),
        root,
        source_chain: ChainId(1),
        destination_chain: DESTINATION,
        token: TokenSymbol::new("USDC"),
        total_amount: members.iter().fold(Amount::zero(), |acc, t| acc + t.amount),
        total_fee: Amount::from(members.len() as u64),
        members: ids,
        committed_at,
        settlement: BundleSettlement::Committed,
    }
}

#[derive(Default)]
pub struct MockLedger {
    pub transfers: Mutex<HashMap<TransferId, TransferRecord>>,
    pub bundles: Mutex<HashMap<BundleId, Bundle>>,
}

impl MockLedger {
    pub fn add_transfer(&self, transfer: &Transfer) {
        self.transfers
            .lock()
            .insert(transfer.transfer_id, TransferRecord::new(transfer.clone()));
    }

    pub fn bond(&self, transfer: &Transfer, bonder: Address) {
        let mut transfers = self.transfers.lock();
        if let Some(record) = transfers.get_mut(&transfer.transfer_id) {
            record.state = TransferState::Bonded;
            record.bond = Some(BondedWithdrawal {
                transfer_id: transfer.transfer_id,
                tx_hash: TxHash(keccak256(&transfer.transfer_id.0)),
                amount: transfer.amount,
                bonder,
                bonded_at: 1_010,
            });
        }
    }

    pub fn mark_unbondable(&self, transfer: &Transfer) {
        if let Some(record) = self.transfers.lock().get_mut(&transfer.transfer_id) {
            record.unbondable = Some("below threshold".into());
        }
    }

    pub fn commit(&self, bundle: &Bundle) {
        self.bundles.lock().insert(bundle.bundle_id, bundle.clone());
    }

    pub fn settle(&self, bundle_id: &BundleId) {
        if let Some(bundle) = self.bundles.lock().get_mut(bundle_id) {
            bundle.settlement = BundleSettlement::Settled {
                tx_hash: TxHash([0x5e; 32]),
                settled_at: 2_000,
            };
        }
    }
}

impl SettlementLedger for MockLedger {
    fn transfer(&self, transfer_id: &TransferId) -> Option<TransferRecord> {
        self.transfers.lock().get(transfer_id).cloned()
    }

    fn bundle(&self, bundle_id: &BundleId) -> Option<Bundle> {
        self.bundles.lock().get(bundle_id).cloned()
    }

    fn open_bundles(&self) -> Vec<Bundle> {
        self.bundles.lock().values().cloned().collect()
    }
}

/// Holds bonded amounts until released.
#[derive(Default)]
pub struct MockReleaser {
    pub held: Mutex<HashMap<TransferId, Amount>>,
    pub released: Mutex<Vec<TransferId>>,
}

impl MockReleaser {
    pub fn hold(&self, transfer: &Transfer) {
        self.held.lock().insert(transfer.transfer_id, transfer.amount);
    }
}

impl LiquidityReleaser for MockReleaser {
    fn release(&self, transfer_id: &TransferId) -> Option<Amount> {
        let amount = self.held.lock().remove(transfer_id)?;
        self.released.lock().push(*transfer_id);
        Some(amount)
    }
}

#[derive(Default)]
pub struct MockSubmitter {
    pub sent: Mutex<Vec<PreparedTx>>,
    pub reject: AtomicBool,
}

#[async_trait]
impl TransactionSubmitter for MockSubmitter {
    async fn send(&self, tx: &PreparedTx) -> Result<TxHash, SubmitError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(SubmitError::Rejected("execution reverted".into()));
        }
        let mut sent = self.sent.lock();
        sent.push(tx.clone());
        Ok(TxHash([sent.len() as u8; 32]))
    }

    async fn wait_for_confirmation(
        &self,
        _chain_id: ChainId,
        tx_hash: TxHash,
    ) -> Result<TxReceipt, SubmitError> {
        Ok(TxReceipt {
            tx_hash,
            block_number: 900,
            success: true,
        })
    }
}
