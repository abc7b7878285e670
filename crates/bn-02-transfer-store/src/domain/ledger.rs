//! # Ledger Records
//!
//! Everything the store persists is a [`StoredEvent`] in an append-only log.
//! Chain events arrive from the watchers; the remaining variants are written
//! by the node itself (bonds it submitted, unbondable verdicts, relays, gap
//! escalations) so that a restart re-derives exactly the same state.
//!
//! ## Key Layout
//!
//! | Prefix | Key | Value |
//! |--------|-----|-------|
//! | `log:` | sequence (u64 BE) | `StoredEvent` |
//! | `wm:`  | chain id (u64 BE) ‖ kind name | `ChainWatermark` |
//! | `meta:seq` | | next sequence (u64 BE) |

use serde::{Deserialize, Serialize};
use shared_types::{
    BondedWithdrawal, BundleId, ChainEvent, EventKey, MessageHash, TransferId, TxHash,
    WatermarkKey,
};
use std::fmt;

pub const LOG_PREFIX: &[u8] = b"log:";
pub const WATERMARK_PREFIX: &[u8] = b"wm:";
pub const SEQ_KEY: &[u8] = b"meta:seq";

/// The predecessor an out-of-order event is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GapKey {
    Transfer(TransferId),
    Bundle(BundleId),
}

impl fmt::Display for GapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GapKey::Transfer(id) => write!(f, "transfer {}", id),
            GapKey::Bundle(id) => write!(f, "bundle {}", id),
        }
    }
}

/// A record in the ledger log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    /// Observed on chain by a watcher.
    Chain(ChainEvent),

    /// A bond this node submitted and saw confirmed.
    BondRecorded(BondedWithdrawal),

    /// This node will never bond the transfer.
    MarkedUnbondable { transfer_id: TransferId, reason: String },

    /// A CCTP message reached the relayed state through this node.
    MessageRelayed {
        message_hash: MessageHash,
        tx_hash: Option<TxHash>,
    },

    /// Buffered events for `gap` outlived the gap timeout.
    GapEscalated { gap: GapKey, at: u64 },
}

impl LedgerEvent {
    /// Dedupe key. Only chain events carry one.
    pub fn event_key(&self) -> Option<EventKey> {
        match self {
            LedgerEvent::Chain(ev) => Some(ev.key()),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LedgerEvent::Chain(ev) => ev.kind().name(),
            LedgerEvent::BondRecorded(_) => "bond_recorded",
            LedgerEvent::MarkedUnbondable { .. } => "marked_unbondable",
            LedgerEvent::MessageRelayed { .. } => "message_relayed",
            LedgerEvent::GapEscalated { .. } => "gap_escalated",
        }
    }
}

/// A persisted log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub seq: u64,
    /// Unix seconds when the store accepted the event.
    pub recorded_at: u64,
    /// Watcher that produced the event, if any. Rollbacks are scoped to it.
    pub source: Option<WatermarkKey>,
    /// Set by a reorg rollback. Retracted events are skipped when folding.
    pub retracted: bool,
    pub event: LedgerEvent,
}

impl StoredEvent {
    /// Block height on the source watcher's chain, for chain events.
    pub fn block_number(&self) -> Option<u64> {
        match &self.event {
            LedgerEvent::Chain(ev) => Some(ev.block_number()),
            _ => None,
        }
    }
}

pub fn log_key(seq: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(LOG_PREFIX.len() + 8);
    key.extend_from_slice(LOG_PREFIX);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

pub fn watermark_key(key: &WatermarkKey) -> Vec<u8> {
    let kind = key.kind.name().as_bytes();
    let mut out = Vec::with_capacity(WATERMARK_PREFIX.len() + 8 + kind.len());
    out.extend_from_slice(WATERMARK_PREFIX);
    out.extend_from_slice(&key.chain_id.0.to_be_bytes());
    out.extend_from_slice(kind);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{ChainId, EventKind};

    #[test]
    fn test_log_keys_sort_by_sequence() {
        assert!(log_key(1) < log_key(2));
        assert!(log_key(255) < log_key(256));
        assert!(log_key(u64::MAX - 1) < log_key(u64::MAX));
    }

    #[test]
    fn test_watermark_keys_are_distinct_per_kind() {
        let a = WatermarkKey {
            chain_id: ChainId(1),
            kind: EventKind::TransferSent,
        };
        let b = WatermarkKey {
            chain_id: ChainId(1),
            kind: EventKind::BundleCommitted,
        };
        assert_ne!(watermark_key(&a), watermark_key(&b));
        assert!(watermark_key(&a).starts_with(WATERMARK_PREFIX));
    }
}
