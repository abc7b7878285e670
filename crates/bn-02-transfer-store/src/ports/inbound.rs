//! # Inbound Ports (Driving Ports)
//!
//! The API the transfer state store exposes to watchers, the bonding engine,
//! the settlement coordinator, the relay and the health monitor.

use serde::{Deserialize, Serialize};
use shared_types::{
    BondedWithdrawal, Bundle, BundleId, CctpMessage, ChainEvent, ChainWatermark, EventKey,
    MessageHash, TransferId, TransferRecord, TxHash, WatermarkKey,
};

use crate::domain::errors::StoreError;
use crate::domain::state::UnresolvableGap;

/// Result of a successful single apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyOutcome {
    /// Persisted and folded into state.
    Applied,
    /// Already reflected in state; nothing written.
    Duplicate,
}

/// Counts from one `commit_batch`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub applied: usize,
    pub duplicates: usize,
    /// Persisted but waiting for a predecessor.
    pub buffered: usize,
    /// Refused because their gap was already escalated.
    pub unresolvable: usize,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.applied + self.duplicates + self.buffered + self.unresolvable
    }
}

/// A consistent copy of everything the store derives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub transfers: Vec<TransferRecord>,
    pub bundles: Vec<Bundle>,
    pub messages: Vec<CctpMessage>,
    pub watermarks: Vec<ChainWatermark>,
    pub unresolvable: Vec<UnresolvableGap>,
    pub buffered_events: usize,
}

/// Primary API of the transfer state store.
///
/// Every write goes through the same single-writer path: dedupe, persist,
/// fold, publish. Reads return clones taken under a short read lock and
/// never observe a partially applied event.
pub trait TransferStateApi: Send + Sync {
    // =========================================================================
    // WRITES
    // =========================================================================

    /// Apply one chain event.
    ///
    /// ## Errors
    ///
    /// - `OutOfOrderEvent`: persisted and buffered behind a missing predecessor
    /// - `UnresolvableGap`: the predecessor's gap was already escalated
    fn apply(&self, event: ChainEvent) -> Result<ApplyOutcome, StoreError>;

    /// Persist `events` and advance `watermark` in one atomic write.
    ///
    /// Every event must belong to the watermark's chain and kind, and the
    /// watermark must not move backwards.
    fn commit_batch(
        &self,
        watermark: ChainWatermark,
        events: Vec<ChainEvent>,
    ) -> Result<BatchReport, StoreError>;

    /// Retract the watcher's events above `watermark.block_number`, rewrite
    /// the watermark and re-derive state. Returns each newly retracted key.
    fn rollback(&self, watermark: ChainWatermark) -> Result<Vec<EventKey>, StoreError>;

    /// Escalate gaps that have waited longer than the gap timeout.
    fn sweep_gaps(&self, now: u64) -> Result<Vec<UnresolvableGap>, StoreError>;

    /// Record a bond this node submitted and saw confirmed.
    fn record_bond(&self, bond: BondedWithdrawal) -> Result<ApplyOutcome, StoreError>;

    /// Record that this node will never bond `transfer_id`.
    fn mark_unbondable(
        &self,
        transfer_id: TransferId,
        reason: String,
    ) -> Result<ApplyOutcome, StoreError>;

    /// Record a relayed message. `tx_hash` is `None` when someone else relayed it.
    fn record_relayed(
        &self,
        message_hash: MessageHash,
        tx_hash: Option<TxHash>,
    ) -> Result<ApplyOutcome, StoreError>;

    // =========================================================================
    // READS
    // =========================================================================

    fn get(&self, transfer_id: &TransferId) -> Option<TransferRecord>;

    fn bundle(&self, bundle_id: &BundleId) -> Option<Bundle>;

    fn message(&self, message_hash: &MessageHash) -> Option<CctpMessage>;

    fn message_by_nonce(&self, source_domain: u32, nonce: u64) -> Option<CctpMessage>;

    fn query(&self, predicate: &dyn Fn(&TransferRecord) -> bool) -> Vec<TransferRecord>;

    fn query_bundles(&self, predicate: &dyn Fn(&Bundle) -> bool) -> Vec<Bundle>;

    fn query_messages(&self, predicate: &dyn Fn(&CctpMessage) -> bool) -> Vec<CctpMessage>;

    fn watermark(&self, key: &WatermarkKey) -> Option<ChainWatermark>;

    /// Every persisted watermark, ordered by key.
    fn watermarks(&self) -> Vec<ChainWatermark>;

    fn unresolvable_gaps(&self) -> Vec<UnresolvableGap>;

    fn snapshot(&self) -> StoreSnapshot;
}
