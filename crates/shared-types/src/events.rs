//! # Chain Events
//!
//! Typed events emitted by the chain watchers. Every event carries an
//! [`EventMeta`] locating it on its chain; `(transaction_hash, log_index)` is
//! the dedupe key for the whole pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entities::{
    BlockHash, BondedWithdrawal, Bundle, BundleId, CctpMessage, ChainId, Hash, Transfer, TxHash,
};

/// The event classes a watcher can be configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TransferSent,
    WithdrawalBonded,
    BundleCommitted,
    BundleSettled,
    MessageSent,
    MessageReceived,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::TransferSent,
        EventKind::WithdrawalBonded,
        EventKind::BundleCommitted,
        EventKind::BundleSettled,
        EventKind::MessageSent,
        EventKind::MessageReceived,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::TransferSent => "transfer_sent",
            EventKind::WithdrawalBonded => "withdrawal_bonded",
            EventKind::BundleCommitted => "bundle_committed",
            EventKind::BundleSettled => "bundle_settled",
            EventKind::MessageSent => "message_sent",
            EventKind::MessageReceived => "message_received",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where an event was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMeta {
    pub chain_id: ChainId,
    pub block_number: u64,
    pub block_hash: BlockHash,
    pub transaction_hash: TxHash,
    pub log_index: u32,
    /// Block timestamp in unix seconds.
    pub observed_at: u64,
}

impl EventMeta {
    pub fn key(&self) -> EventKey {
        EventKey {
            transaction_hash: self.transaction_hash,
            log_index: self.log_index,
        }
    }
}

/// Pipeline-wide dedupe key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    pub transaction_hash: TxHash,
    pub log_index: u32,
}

impl EventKey {
    /// Fixed-width byte encoding used as a storage key suffix.
    pub fn to_bytes(&self) -> [u8; 36] {
        let mut out = [0u8; 36];
        out[..32].copy_from_slice(&self.transaction_hash.0);
        out[32..].copy_from_slice(&self.log_index.to_be_bytes());
        out
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.transaction_hash, self.log_index)
    }
}

/// A validated on-chain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainEvent {
    /// A transfer was initiated on its source chain.
    TransferSent { meta: EventMeta, transfer: Transfer },

    /// A withdrawal was bonded on the destination chain.
    WithdrawalBonded {
        meta: EventMeta,
        bond: BondedWithdrawal,
    },

    /// A transfer root was committed on the source chain.
    BundleCommitted { meta: EventMeta, bundle: Bundle },

    /// A committed root was settled on the destination chain.
    BundleSettled {
        meta: EventMeta,
        bundle_id: BundleId,
        root: Hash,
        settled_at: u64,
    },

    /// A CCTP message was emitted by the source message transmitter.
    MessageSent { meta: EventMeta, message: CctpMessage },

    /// A CCTP message was received on the destination chain.
    MessageReceived {
        meta: EventMeta,
        source_domain: u32,
        nonce: u64,
    },
}

impl ChainEvent {
    pub fn meta(&self) -> &EventMeta {
        match self {
            ChainEvent::TransferSent { meta, .. }
            | ChainEvent::WithdrawalBonded { meta, .. }
            | ChainEvent::BundleCommitted { meta, .. }
            | ChainEvent::BundleSettled { meta, .. }
            | ChainEvent::MessageSent { meta, .. }
            | ChainEvent::MessageReceived { meta, .. } => meta,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            ChainEvent::TransferSent { .. } => EventKind::TransferSent,
            ChainEvent::WithdrawalBonded { .. } => EventKind::WithdrawalBonded,
            ChainEvent::BundleCommitted { .. } => EventKind::BundleCommitted,
            ChainEvent::BundleSettled { .. } => EventKind::BundleSettled,
            ChainEvent::MessageSent { .. } => EventKind::MessageSent,
            ChainEvent::MessageReceived { .. } => EventKind::MessageReceived,
        }
    }

    pub fn key(&self) -> EventKey {
        self.meta().key()
    }

    pub fn block_number(&self) -> u64 {
        self.meta().block_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(log_index: u32) -> EventMeta {
        EventMeta {
            chain_id: ChainId(1),
            block_number: 10,
            block_hash: BlockHash([1; 32]),
            transaction_hash: TxHash([2; 32]),
            log_index,
            observed_at: 1_000,
        }
    }

    #[test]
    fn test_event_key_distinguishes_log_index() {
        assert_ne!(meta(0).key(), meta(1).key());
        assert_eq!(meta(3).key(), meta(3).key());
    }

    #[test]
    fn test_event_key_bytes_layout() {
        let bytes = meta(258).key().to_bytes();
        assert_eq!(&bytes[..32], &[2u8; 32]);
        assert_eq!(&bytes[32..], &[0, 0, 1, 2]);
    }

    #[test]
    fn test_kind_matches_variant() {
        let ev = ChainEvent::MessageReceived {
            meta: meta(0),
            source_domain: 0,
            nonce: 5,
        };
        assert_eq!(ev.kind(), EventKind::MessageReceived);
        assert_eq!(ev.block_number(), 10);
    }
}
