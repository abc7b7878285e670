//! # Derived State
//!
//! The fold from ledger records to transfer, bundle and message views.
//!
//! Folding is deterministic: the same surviving log always yields the same
//! state, which is what makes reorg rollback a plain re-fold.
//!
//! ## Transfer State Derivation
//!
//! | Bond | Unbondable | Bundle | Resulting state |
//! |------|------------|--------|-----------------|
//! | no | no | any | `Sent` |
//! | yes | - | none | `Bonded` |
//! | yes | - | committed | `RootCommitted` |
//! | yes | - | settled | `Settled` |
//! | no | yes | settled | `Settled` (unbondable exception) |
//!
//! A record only ever moves forward from its current state.

use serde::{Deserialize, Serialize};
use shared_bus::StoreTransition;
use shared_types::{
    BondedWithdrawal, Bundle, BundleId, BundleSettlement, CctpMessage, ChainEvent,
    ChainWatermark, EventKey, MessageHash, RelayStatus, TransferId, TransferRecord,
    TransferState, TxHash, WatermarkKey,
};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

use crate::domain::errors::StoreError;
use crate::domain::ledger::{GapKey, LedgerEvent, StoredEvent};

/// How a candidate event relates to the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Apply now.
    Ready,
    /// Already reflected in state.
    Duplicate,
    /// Persist and buffer until the predecessor arrives.
    Missing(GapKey),
    /// The predecessor is missing and its gap has been escalated.
    Unresolvable(GapKey),
    /// Refused without persisting.
    Rejected(StoreError),
}

/// An event waiting for its predecessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedEvent {
    pub seq: u64,
    pub recorded_at: u64,
    pub event: LedgerEvent,
}

/// An escalated gap, as reported to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvableGap {
    pub gap: GapKey,
    /// When the oldest waiting event was recorded.
    pub buffered_since: u64,
    pub escalated_at: u64,
    /// Events parked behind the gap.
    pub events: usize,
}

#[derive(Debug, Clone)]
struct ParkedGap {
    buffered_since: u64,
    escalated_at: u64,
    events: Vec<BufferedEvent>,
}

/// Which state a record should be in given its bond, verdict and bundle.
pub fn target_state(record: &TransferRecord, bundle: Option<&Bundle>) -> TransferState {
    let committed = bundle.is_some();
    let settled = bundle.is_some_and(Bundle::is_settled);
    let bonded = record.bond.is_some();

    if settled && (bonded || record.unbondable.is_some()) {
        TransferState::Settled
    } else if bonded && committed {
        TransferState::RootCommitted
    } else if bonded {
        TransferState::Bonded
    } else {
        TransferState::Sent
    }
}

/// The derived views plus the bookkeeping needed to keep folding.
#[derive(Debug, Clone, Default)]
pub struct LedgerState {
    transfers: HashMap<TransferId, TransferRecord>,
    bundles: HashMap<BundleId, Bundle>,
    messages: HashMap<MessageHash, CctpMessage>,
    /// `(source_domain, nonce)` -> message.
    nonce_index: HashMap<(u32, u64), MessageHash>,
    /// Receipts seen before (or without) the matching `MessageSent`.
    received_nonces: HashMap<(u32, u64), TxHash>,
    bond_txs: HashMap<TxHash, TransferId>,
    /// Bundle membership, including transfers not yet observed.
    bundle_of: HashMap<TransferId, BundleId>,
    buffered: BTreeMap<GapKey, Vec<BufferedEvent>>,
    unresolvable: BTreeMap<GapKey, ParkedGap>,
    watermarks: HashMap<WatermarkKey, ChainWatermark>,
    applied_keys: HashMap<EventKey, u64>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // ADMISSION
    // =========================================================================

    /// Decide what to do with `event` without mutating anything.
    pub fn classify(&self, event: &LedgerEvent) -> Admission {
        if let Some(key) = event.event_key() {
            if self.applied_keys.contains_key(&key) {
                return Admission::Duplicate;
            }
        }

        match event {
            LedgerEvent::MarkedUnbondable { transfer_id, .. } => {
                match self.transfers.get(transfer_id) {
                    None => return Admission::Rejected(StoreError::UnknownTransfer(*transfer_id)),
                    Some(rec) if rec.bond.is_some() => {
                        return Admission::Rejected(StoreError::InvalidInput(format!(
                            "transfer {} is already bonded",
                            transfer_id
                        )))
                    }
                    Some(rec) if rec.unbondable.is_some() => return Admission::Duplicate,
                    Some(_) => {}
                }
            }
            LedgerEvent::MessageRelayed { message_hash, .. } => {
                match self.messages.get(message_hash) {
                    None => return Admission::Rejected(StoreError::UnknownMessage(*message_hash)),
                    Some(m) if m.is_relayed() => return Admission::Duplicate,
                    Some(_) => {}
                }
            }
            LedgerEvent::BondRecorded(bond) => {
                if self.bond_txs.contains_key(&bond.tx_hash) {
                    return Admission::Duplicate;
                }
                if self
                    .transfers
                    .get(&bond.transfer_id)
                    .is_some_and(TransferRecord::is_bonded)
                {
                    return Admission::Duplicate;
                }
            }
            LedgerEvent::GapEscalated { gap, .. } => {
                if !self.buffered.contains_key(gap) {
                    return Admission::Duplicate;
                }
            }
            LedgerEvent::Chain(_) => {}
        }

        match self.missing_predecessor(event) {
            Some(gap) if self.unresolvable.contains_key(&gap) => Admission::Unresolvable(gap),
            Some(gap) => Admission::Missing(gap),
            None => Admission::Ready,
        }
    }

    fn missing_predecessor(&self, event: &LedgerEvent) -> Option<GapKey> {
        let gap = match event {
            LedgerEvent::Chain(ChainEvent::WithdrawalBonded { bond, .. })
            | LedgerEvent::BondRecorded(bond) => GapKey::Transfer(bond.transfer_id),
            LedgerEvent::Chain(ChainEvent::BundleSettled { bundle_id, .. }) => {
                GapKey::Bundle(*bundle_id)
            }
            _ => return None,
        };
        let present = match gap {
            GapKey::Transfer(id) => self.transfers.contains_key(&id),
            GapKey::Bundle(id) => self.bundles.contains_key(&id),
        };
        (!present).then_some(gap)
    }

    // =========================================================================
    // FOLD
    // =========================================================================

    /// Fold one persisted record into state and return the transitions it
    /// caused. Events whose predecessor is missing are buffered instead.
    pub fn fold(&mut self, stored: &StoredEvent) -> Vec<StoreTransition> {
        let mut out = Vec::new();
        if stored.retracted {
            return out;
        }
        if let Some(key) = stored.event.event_key() {
            self.applied_keys.insert(key, stored.seq);
        }

        if let Some(gap) = self.missing_predecessor(&stored.event) {
            if !self.unresolvable.contains_key(&gap) {
                self.buffered.entry(gap).or_default().push(BufferedEvent {
                    seq: stored.seq,
                    recorded_at: stored.recorded_at,
                    event: stored.event.clone(),
                });
            }
            return out;
        }

        self.fold_ready(&stored.event, &mut out);

        if let Some(gap) = resolved_gap(&stored.event) {
            let waiting = match self.buffered.remove(&gap) {
                Some(events) => Some(events),
                None => self.unresolvable.remove(&gap).map(|parked| {
                    warn!(%gap, events = parked.events.len(), "[bn-02] Escalated gap resolved late");
                    parked.events
                }),
            };
            for buffered in waiting.into_iter().flatten() {
                self.fold_ready(&buffered.event, &mut out);
            }
        }
        out
    }

    fn fold_ready(&mut self, event: &LedgerEvent, out: &mut Vec<StoreTransition>) {
        match event {
            LedgerEvent::Chain(ChainEvent::TransferSent { transfer, .. }) => {
                let id = transfer.transfer_id;
                if self.transfers.contains_key(&id) {
                    return;
                }
                let mut record = TransferRecord::new(transfer.clone());
                record.bundle_id = self.bundle_of.get(&id).copied();
                self.transfers.insert(id, record);
                out.push(StoreTransition::TransferObserved {
                    transfer: transfer.clone(),
                });
                self.advance(id, out);
            }
            LedgerEvent::Chain(ChainEvent::WithdrawalBonded { bond, .. })
            | LedgerEvent::BondRecorded(bond) => self.apply_bond(bond, out),
            LedgerEvent::Chain(ChainEvent::BundleCommitted { bundle, .. }) => {
                self.apply_commit(bundle, out)
            }
            LedgerEvent::Chain(ChainEvent::BundleSettled {
                meta,
                bundle_id,
                settled_at,
                ..
            }) => {
                let Some(bundle) = self.bundles.get_mut(bundle_id) else {
                    return;
                };
                if bundle.is_settled() {
                    return;
                }
                bundle.settlement = BundleSettlement::Settled {
                    tx_hash: meta.transaction_hash,
                    settled_at: *settled_at,
                };
                let members = bundle.members.clone();
                out.push(StoreTransition::BundleSettled {
                    bundle_id: *bundle_id,
                    members: members.clone(),
                });
                for id in members {
                    self.advance(id, out);
                }
            }
            LedgerEvent::Chain(ChainEvent::MessageSent { message, .. }) => {
                if self.messages.contains_key(&message.message_hash) {
                    return;
                }
                let mut message = message.clone();
                let nonce = (message.source_domain, message.nonce);
                let received = self.received_nonces.get(&nonce).copied();
                message.relay = match received {
                    Some(tx_hash) => RelayStatus::Relayed {
                        tx_hash: Some(tx_hash),
                    },
                    None => RelayStatus::Pending,
                };
                self.nonce_index.insert(nonce, message.message_hash);
                self.messages.insert(message.message_hash, message.clone());
                let hash = message.message_hash;
                out.push(StoreTransition::MessageObserved { message });
                if let Some(tx_hash) = received {
                    out.push(StoreTransition::MessageRelayed {
                        message_hash: hash,
                        tx_hash: Some(tx_hash),
                    });
                }
            }
            LedgerEvent::Chain(ChainEvent::MessageReceived {
                meta,
                source_domain,
                nonce,
            }) => {
                let key = (*source_domain, *nonce);
                self.received_nonces.insert(key, meta.transaction_hash);
                if let Some(hash) = self.nonce_index.get(&key).copied() {
                    self.set_relayed(hash, Some(meta.transaction_hash), out);
                }
            }
            LedgerEvent::MarkedUnbondable {
                transfer_id,
                reason,
            } => {
                let Some(record) = self.transfers.get_mut(transfer_id) else {
                    return;
                };
                if record.unbondable.is_some() || record.bond.is_some() {
                    return;
                }
                record.unbondable = Some(reason.clone());
                out.push(StoreTransition::TransferUnbondable {
                    transfer_id: *transfer_id,
                    reason: reason.clone(),
                });
                self.advance(*transfer_id, out);
            }
            LedgerEvent::MessageRelayed {
                message_hash,
                tx_hash,
            } => self.set_relayed(*message_hash, *tx_hash, out),
            LedgerEvent::GapEscalated { gap, at } => {
                if let Some(events) = self.buffered.remove(gap) {
                    let buffered_since = events.first().map_or(*at, |e| e.recorded_at);
                    self.unresolvable.insert(
                        *gap,
                        ParkedGap {
                            buffered_since,
                            escalated_at: *at,
                            events,
                        },
                    );
                }
            }
        }
    }

    fn apply_bond(&mut self, bond: &BondedWithdrawal, out: &mut Vec<StoreTransition>) {
        if self.bond_txs.contains_key(&bond.tx_hash) {
            return;
        }
        let Some(record) = self.transfers.get_mut(&bond.transfer_id) else {
            return;
        };
        if let Some(existing) = &record.bond {
            warn!(
                transfer_id = %bond.transfer_id,
                existing = %existing.tx_hash,
                ignored = %bond.tx_hash,
                "[bn-02] Second bond for transfer ignored"
            );
            return;
        }
        record.bond = Some(bond.clone());
        self.bond_txs.insert(bond.tx_hash, bond.transfer_id);
        self.advance(bond.transfer_id, out);
    }

    fn apply_commit(&mut self, bundle: &Bundle, out: &mut Vec<StoreTransition>) {
        if self.bundles.contains_key(&bundle.bundle_id) {
            return;
        }
        let mut bundle = bundle.clone();
        bundle.settlement = BundleSettlement::Committed;
        for id in &bundle.members {
            self.bundle_of.insert(*id, bundle.bundle_id);
            if let Some(record) = self.transfers.get_mut(id) {
                record.bundle_id = Some(bundle.bundle_id);
            }
        }
        let members = bundle.members.clone();
        self.bundles.insert(bundle.bundle_id, bundle.clone());
        out.push(StoreTransition::BundleCommitted { bundle });
        for id in members {
            self.advance(id, out);
        }
    }

    fn set_relayed(
        &mut self,
        hash: MessageHash,
        tx_hash: Option<TxHash>,
        out: &mut Vec<StoreTransition>,
    ) {
        let Some(message) = self.messages.get_mut(&hash) else {
            return;
        };
        if message.is_relayed() {
            return;
        }
        message.relay = RelayStatus::Relayed { tx_hash };
        out.push(StoreTransition::MessageRelayed {
            message_hash: hash,
            tx_hash,
        });
    }

    fn advance(&mut self, id: TransferId, out: &mut Vec<StoreTransition>) {
        let Some(record) = self.transfers.get_mut(&id) else {
            return;
        };
        let bundle = record.bundle_id.and_then(|b| self.bundles.get(&b));
        let target = target_state(record, bundle);
        if record.state.can_transition_to(target) {
            let from = record.state;
            record.state = target;
            record.history.push(target);
            out.push(StoreTransition::TransferAdvanced {
                transfer_id: id,
                from,
                to: target,
            });
        }
    }

    // =========================================================================
    // WATERMARKS
    // =========================================================================

    pub fn set_watermark(&mut self, watermark: ChainWatermark) {
        self.watermarks.insert(watermark.key, watermark);
    }

    pub fn watermark(&self, key: &WatermarkKey) -> Option<ChainWatermark> {
        self.watermarks.get(key).copied()
    }

    pub fn watermarks(&self) -> Vec<ChainWatermark> {
        let mut all: Vec<_> = self.watermarks.values().copied().collect();
        all.sort_by_key(|w| w.key);
        all
    }

    // =========================================================================
    // GAPS
    // =========================================================================

    /// Gaps whose oldest buffered event was recorded at or before `cutoff`.
    pub fn expired_gaps(&self, cutoff: u64) -> Vec<GapKey> {
        self.buffered
            .iter()
            .filter(|(_, events)| events.first().is_some_and(|e| e.recorded_at <= cutoff))
            .map(|(gap, _)| *gap)
            .collect()
    }

    pub fn buffered_events(&self) -> usize {
        self.buffered.values().map(Vec::len).sum()
    }

    pub fn unresolvable_gaps(&self) -> Vec<UnresolvableGap> {
        self.unresolvable
            .iter()
            .map(|(gap, parked)| UnresolvableGap {
                gap: *gap,
                buffered_since: parked.buffered_since,
                escalated_at: parked.escalated_at,
                events: parked.events.len(),
            })
            .collect()
    }

    // =========================================================================
    // READS
    // =========================================================================

    pub fn transfer(&self, id: &TransferId) -> Option<&TransferRecord> {
        self.transfers.get(id)
    }

    pub fn bundle(&self, id: &BundleId) -> Option<&Bundle> {
        self.bundles.get(id)
    }

    pub fn message(&self, hash: &MessageHash) -> Option<&CctpMessage> {
        self.messages.get(hash)
    }

    pub fn message_by_nonce(&self, source_domain: u32, nonce: u64) -> Option<&CctpMessage> {
        self.nonce_index
            .get(&(source_domain, nonce))
            .and_then(|h| self.messages.get(h))
    }

    pub fn transfers(&self) -> impl Iterator<Item = &TransferRecord> {
        self.transfers.values()
    }

    pub fn bundles(&self) -> impl Iterator<Item = &Bundle> {
        self.bundles.values()
    }

    pub fn messages(&self) -> impl Iterator<Item = &CctpMessage> {
        self.messages.values()
    }

    pub fn is_applied(&self, key: &EventKey) -> bool {
        self.applied_keys.contains_key(key)
    }
}

/// The gap an event closes by arriving.
fn resolved_gap(event: &LedgerEvent) -> Option<GapKey> {
    match event {
        LedgerEvent::Chain(ChainEvent::TransferSent { transfer, .. }) => {
            Some(GapKey::Transfer(transfer.transfer_id))
        }
        LedgerEvent::Chain(ChainEvent::BundleCommitted { bundle, .. }) => {
            Some(GapKey::Bundle(bundle.bundle_id))
        }
        _ => None,
    }
}
