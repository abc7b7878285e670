//! # Store Bridges
//!
//! Adapters that implement each subsystem's outbound ports on top of the
//! shared transfer state store, the liquidity tracker and the settlement
//! coordinator. Subsystems never see each other's types.
//!
//! ```text
//!  bn-01 EventSink ───────┐
//!  bn-03 BondLedger ──────┤
//!  bn-04 SettlementLedger ┼─► StoreBridge ─► TransferStateStore (bn-02)
//!  bn-05 RelayLedger ─────┤
//!  bn-06 HealthLedger ────┘
//! ```

use async_trait::async_trait;
use bn_01_chain_watcher::{EventSink, SinkError};
use bn_02_transfer_store::{StoreError, TransferStateApi, TransferStateStore};
use bn_03_bonding_engine::{BondLedger, CreditSource, LedgerError as BondLedgerError, LiquidityTracker};
use bn_04_settlement::{LiquidityReleaser, SettlementApi, SettlementCoordinator, SettlementLedger};
use bn_05_attestation_relay::{LedgerError as RelayLedgerError, RelayLedger};
use bn_06_health_check::{
    GapSummary, HealthLedger, IncompleteSummary, LiquidityView, SettlementView,
};
use shared_types::{
    Address, Amount, BondedWithdrawal, Bundle, BundleId, CctpMessage, ChainEvent, ChainReadError,
    ChainWatermark, Classified, EventKey, MessageHash, RouteKey, Transfer, TransferId,
    TransferRecord, TransferState, TxHash, WatermarkKey,
};
use std::sync::Arc;
use tracing::debug;

/// The store, seen from one bonder.
pub struct StoreBridge {
    store: Arc<TransferStateStore>,
    bonder: Address,
}

impl StoreBridge {
    pub fn new(store: Arc<TransferStateStore>, bonder: Address) -> Self {
        Self { store, bonder }
    }
}

fn sink_error(e: StoreError) -> SinkError {
    SinkError::new(e.class(), e.to_string())
}

fn bond_ledger_error(e: StoreError) -> BondLedgerError {
    BondLedgerError::new(e.class(), e.to_string())
}

fn relay_ledger_error(e: StoreError) -> RelayLedgerError {
    RelayLedgerError::new(e.class(), e.to_string())
}

// =============================================================================
// bn-01
// =============================================================================

impl EventSink for StoreBridge {
    fn watermark(&self, key: &WatermarkKey) -> Option<ChainWatermark> {
        self.store.watermark(key)
    }

    fn commit(&self, watermark: ChainWatermark, events: Vec<ChainEvent>) -> Result<(), SinkError> {
        let report = self
            .store
            .commit_batch(watermark, events)
            .map_err(sink_error)?;
        debug!(
            watermark = %watermark.key,
            block = watermark.block_number,
            applied = report.applied,
            duplicates = report.duplicates,
            buffered = report.buffered,
            unresolvable = report.unresolvable,
            "[bn-02] Batch committed"
        );
        Ok(())
    }

    fn rollback(&self, watermark: ChainWatermark) -> Result<Vec<EventKey>, SinkError> {
        self.store.rollback(watermark).map_err(sink_error)
    }
}

// =============================================================================
// bn-03
// =============================================================================

impl BondLedger for StoreBridge {
    fn get(&self, transfer_id: &TransferId) -> Option<TransferRecord> {
        self.store.get(transfer_id)
    }

    fn record_bond(&self, bond: BondedWithdrawal) -> Result<(), BondLedgerError> {
        self.store
            .record_bond(bond)
            .map(|_| ())
            .map_err(bond_ledger_error)
    }

    fn mark_unbondable(&self, transfer_id: &TransferId, reason: &str) -> Result<(), BondLedgerError> {
        self.store
            .mark_unbondable(*transfer_id, reason.to_string())
            .map(|_| ())
            .map_err(bond_ledger_error)
    }

    fn pending_transfers(&self) -> Vec<Transfer> {
        self.store
            .query(&|r| r.state == TransferState::Sent && r.unbondable.is_none())
            .into_iter()
            .map(|r| r.transfer)
            .collect()
    }

    fn bonded_unsettled(&self) -> Vec<(Transfer, BondedWithdrawal)> {
        let bonder = self.bonder;
        self.store
            .query(&|r| {
                r.state != TransferState::Settled
                    && r.bond.as_ref().is_some_and(|b| b.bonder == bonder)
            })
            .into_iter()
            .filter_map(|r| r.bond.map(|bond| (r.transfer, bond)))
            .collect()
    }
}

// =============================================================================
// bn-04
// =============================================================================

impl SettlementLedger for StoreBridge {
    fn transfer(&self, transfer_id: &TransferId) -> Option<TransferRecord> {
        self.store.get(transfer_id)
    }

    fn bundle(&self, bundle_id: &BundleId) -> Option<Bundle> {
        self.store.bundle(bundle_id)
    }

    fn open_bundles(&self) -> Vec<Bundle> {
        // Member lookups happen outside the store's read lock.
        // A member the store has never seen keeps its bundle open.
        self.store
            .query_bundles(&|_| true)
            .into_iter()
            .filter(|b| {
                !b.is_settled()
                    || b.members.iter().any(|id| {
                        self.store
                            .get(id)
                            .map_or(true, |r| r.state != TransferState::Settled)
                    })
            })
            .collect()
    }
}

// =============================================================================
// bn-05
// =============================================================================

impl RelayLedger for StoreBridge {
    fn message(&self, message_hash: &MessageHash) -> Option<CctpMessage> {
        self.store.message(message_hash)
    }

    fn record_relayed(
        &self,
        message_hash: MessageHash,
        tx_hash: Option<TxHash>,
    ) -> Result<(), RelayLedgerError> {
        self.store
            .record_relayed(message_hash, tx_hash)
            .map(|_| ())
            .map_err(relay_ledger_error)
    }

    fn pending_messages(&self) -> Vec<CctpMessage> {
        self.store.query_messages(&|m| !m.is_relayed())
    }
}

// =============================================================================
// bn-06
// =============================================================================

impl HealthLedger for StoreBridge {
    fn transfer(&self, transfer_id: &TransferId) -> Option<TransferRecord> {
        self.store.get(transfer_id)
    }

    fn transfers_since(&self, since: u64) -> Vec<TransferRecord> {
        self.store.query(&|r| r.transfer.sent_at >= since)
    }

    fn bundles_since(&self, since: u64) -> Vec<Bundle> {
        self.store.query_bundles(&|b| b.committed_at >= since)
    }

    fn messages_since(&self, since: u64) -> Vec<CctpMessage> {
        self.store.query_messages(&|m| m.observed_at >= since)
    }

    fn watermarks(&self) -> Vec<ChainWatermark> {
        self.store.watermarks()
    }

    fn unresolvable_gaps(&self) -> Vec<GapSummary> {
        self.store
            .unresolvable_gaps()
            .into_iter()
            .map(|g| GapSummary {
                gap: g.gap.to_string(),
                buffered_since: g.buffered_since,
                escalated_at: g.escalated_at,
                events: g.events,
            })
            .collect()
    }
}

// =============================================================================
// LIQUIDITY AND SETTLEMENT VIEWS
// =============================================================================

/// Settled bonds go back to the bonding engine's pool.
pub struct TrackerReleaser(pub Arc<LiquidityTracker>);

impl LiquidityReleaser for TrackerReleaser {
    fn release(&self, transfer_id: &TransferId) -> Option<Amount> {
        self.0.settle(transfer_id)
    }
}

/// Credit read on-chain, net of bonds the tracker still holds.
pub struct TrackerLiquidity {
    tracker: Arc<LiquidityTracker>,
    credit: Arc<dyn CreditSource>,
}

impl TrackerLiquidity {
    pub fn new(tracker: Arc<LiquidityTracker>, credit: Arc<dyn CreditSource>) -> Self {
        Self { tracker, credit }
    }
}

#[async_trait]
impl LiquidityView for TrackerLiquidity {
    async fn available(&self, route: &RouteKey) -> Result<Amount, ChainReadError> {
        let credit = self
            .credit
            .credit(route.destination_chain, &route.token)
            .await?;
        Ok(self.tracker.available(route, credit))
    }
}

pub struct CoordinatorView(pub Arc<SettlementCoordinator>);

impl SettlementView for CoordinatorView {
    fn incomplete_settlements(&self) -> Vec<IncompleteSummary> {
        self.0
            .incomplete_settlements()
            .into_iter()
            .map(|s| IncompleteSummary {
                bundle_id: s.bundle_id,
                route: s.route,
                missing: s.missing.len(),
                deadline: s.deadline,
            })
            .collect()
    }
}
