//! # Block Window
//!
//! Recent `(height, hash)` pairs the watcher has relied on. A later poll
//! compares them against the canonical chain; the lowest height whose hash
//! changed is where the reorg began.
//!
//! Only range-end blocks and blocks that carried a log are recorded, so the
//! window stays small even when the batch size is large. When full, the
//! lowest heights are pruned first.

use shared_types::BlockHash;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct BlockWindow {
    capacity: usize,
    blocks: BTreeMap<u64, BlockHash>,
}

impl BlockWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            blocks: BTreeMap::new(),
        }
    }

    /// Record the hash seen at `number`.
    ///
    /// Returns the previously recorded hash when it differs, which means the
    /// chain changed between two reads of the same height.
    pub fn record(&mut self, number: u64, hash: BlockHash) -> Option<BlockHash> {
        let previous = self.blocks.insert(number, hash).filter(|prev| *prev != hash);
        self.prune();
        previous
    }

    fn prune(&mut self) {
        while self.blocks.len() > self.capacity {
            if self.blocks.pop_first().is_none() {
                break;
            }
        }
    }

    /// Drop every entry above `height`. Returns how many were removed.
    pub fn truncate_above(&mut self, height: u64) -> usize {
        let Some(first_removed) = height.checked_add(1) else {
            return 0;
        };
        let removed = self.blocks.split_off(&first_removed);
        removed.len()
    }

    pub fn hash_at(&self, number: u64) -> Option<BlockHash> {
        self.blocks.get(&number).copied()
    }

    /// Entries in ascending height order.
    pub fn entries(&self) -> impl Iterator<Item = (u64, BlockHash)> + '_ {
        self.blocks.iter().map(|(n, h)| (*n, *h))
    }

    pub fn highest(&self) -> Option<(u64, BlockHash)> {
        self.blocks.last_key_value().map(|(n, h)| (*n, *h))
    }

    pub fn lowest(&self) -> Option<u64> {
        self.blocks.first_key_value().map(|(n, _)| *n)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }
}
