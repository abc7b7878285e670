use serde::{Deserialize, Serialize};
use shared_types::{Address, BlockHash, ChainId, EventKey, EventKind, TxHash};

/// Header fields the watcher needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: u64,
    pub hash: BlockHash,
    pub parent_hash: BlockHash,
    /// Unix seconds.
    pub timestamp: u64,
}

/// What a watcher asks its data source for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogFilter {
    pub chain_id: ChainId,
    pub address: Address,
    pub kind: EventKind,
}

/// A log as returned by the data source, with its ABI-decoded fields.
///
/// `fields` is untrusted. The watcher validates it into a typed
/// [`ChainEvent`](shared_types::ChainEvent) before anything else sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLog {
    pub kind: EventKind,
    pub block_number: u64,
    pub block_hash: BlockHash,
    pub transaction_hash: TxHash,
    pub log_index: u32,
    /// Block timestamp when the provider includes it.
    #[serde(default)]
    pub block_timestamp: Option<u64>,
    pub fields: serde_json::Value,
}

impl RawLog {
    pub fn key(&self) -> EventKey {
        EventKey {
            transaction_hash: self.transaction_hash,
            log_index: self.log_index,
        }
    }
}

/// Logs for a block range plus how far the provider actually got.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogBatch {
    /// Highest block the response covers.
    pub covered_to: u64,
    pub logs: Vec<RawLog>,
}

/// Result of one poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollOutcome {
    /// Nothing new below the confirmed head.
    Idle { head: u64, watermark: u64 },

    /// Events in `[from, to]` were committed.
    Advanced {
        from: u64,
        to: u64,
        events: usize,
        /// False while backfilling: the next poll should follow immediately.
        caught_up: bool,
    },

    /// A recorded block hash changed at `detected_at`.
    Reorg {
        detected_at: u64,
        rolled_back_to: u64,
        retracted: usize,
    },
}
