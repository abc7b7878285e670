//! Scripted in-memory chain.
//!
//! Deterministic blocks, logs and reorgs for tests and dry runs. Block
//! hashes are derived from the chain id, height and a fork counter, so a
//! reorg changes every hash at and above the fork height.

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::{keccak256, Address, BlockHash, ChainId, EventKind, TxHash};
use std::collections::BTreeMap;
use tokio::sync::broadcast;

use crate::domain::entities::{BlockHeader, LogBatch, LogFilter, RawLog};
use crate::domain::errors::DataSourceError;
use crate::ports::outbound::ChainDataSource;

/// Seconds between scripted blocks.
pub const BLOCK_TIME_SECS: u64 = 12;

#[derive(Debug, Clone)]
struct ScriptedLog {
    address: Address,
    log: RawLog,
}

#[derive(Debug, Default)]
struct ChainState {
    blocks: Vec<BlockHeader>,
    logs: BTreeMap<u64, Vec<ScriptedLog>>,
    forks: u64,
    fail_next: u32,
    truncate_next: u32,
    get_logs_calls: u64,
}

pub struct ScriptedChain {
    chain_id: ChainId,
    genesis_time: u64,
    state: RwLock<ChainState>,
    heads: broadcast::Sender<u64>,
}

impl ScriptedChain {
    /// A chain holding only its genesis block.
    pub fn new(chain_id: ChainId, genesis_time: u64) -> Self {
        let chain = Self {
            chain_id,
            genesis_time,
            state: RwLock::new(ChainState::default()),
            heads: broadcast::channel(64).0,
        };
        {
            let mut state = chain.state.write();
            let genesis = chain.header(0, BlockHash::ZERO, 0);
            state.blocks.push(genesis);
        }
        chain
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    fn header(&self, number: u64, parent_hash: BlockHash, fork: u64) -> BlockHeader {
        let mut seed = Vec::with_capacity(24);
        seed.extend_from_slice(&self.chain_id.0.to_be_bytes());
        seed.extend_from_slice(&number.to_be_bytes());
        seed.extend_from_slice(&fork.to_be_bytes());
        BlockHeader {
            number,
            hash: BlockHash(keccak256(&seed)),
            parent_hash,
            timestamp: self.genesis_time + number * BLOCK_TIME_SECS,
        }
    }

    fn mine_locked(&self, state: &mut ChainState) -> BlockHeader {
        let parent = state.blocks.last().copied();
        let (number, parent_hash) = match parent {
            Some(p) => (p.number + 1, p.hash),
            None => (0, BlockHash::ZERO),
        };
        let header = self.header(number, parent_hash, state.forks);
        state.blocks.push(header);
        header
    }

    /// Mine `count` empty blocks. Returns the new head.
    pub fn mine(&self, count: u64) -> u64 {
        let head = {
            let mut state = self.state.write();
            for _ in 0..count {
                self.mine_locked(&mut state);
            }
            state.blocks.len() as u64 - 1
        };
        let _ = self.heads.send(head);
        head
    }

    /// Mine one block carrying a single log. Returns the log as the watcher
    /// will see it.
    pub fn emit(
        &self,
        address: Address,
        kind: EventKind,
        transaction_hash: TxHash,
        fields: serde_json::Value,
    ) -> RawLog {
        let (log, head) = {
            let mut state = self.state.write();
            let header = self.mine_locked(&mut state);
            let log = RawLog {
                kind,
                block_number: header.number,
                block_hash: header.hash,
                transaction_hash,
                log_index: 0,
                block_timestamp: Some(header.timestamp),
                fields,
            };
            state.logs.insert(
                header.number,
                vec![ScriptedLog {
                    address,
                    log: log.clone(),
                }],
            );
            (log, header.number)
        };
        let _ = self.heads.send(head);
        log
    }

    /// Replace every block from `height` upwards with a fork of the same
    /// length. Logs in the replaced blocks disappear.
    pub fn reorg(&self, height: u64) -> u64 {
        let head = {
            let mut state = self.state.write();
            let old_len = state.blocks.len() as u64;
            let keep = height.max(1).min(old_len);
            state.blocks.truncate(keep as usize);
            let _ = state.logs.split_off(&keep);
            state.forks += 1;
            while (state.blocks.len() as u64) < old_len {
                self.mine_locked(&mut state);
            }
            state.blocks.len() as u64 - 1
        };
        let _ = self.heads.send(head);
        head
    }

    /// Fail the next `n` requests of any kind.
    pub fn fail_next(&self, n: u32) {
        self.state.write().fail_next = n;
    }

    /// Answer the next `n` `get_logs` calls for only half the range.
    pub fn truncate_next(&self, n: u32) {
        self.state.write().truncate_next = n;
    }

    pub fn get_logs_calls(&self) -> u64 {
        self.state.read().get_logs_calls
    }

    pub fn block_hash(&self, number: u64) -> Option<BlockHash> {
        self.state.read().blocks.get(number as usize).map(|b| b.hash)
    }

    fn take_failure(&self) -> Result<(), DataSourceError> {
        let mut state = self.state.write();
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(DataSourceError::Rpc("scripted failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainDataSource for ScriptedChain {
    async fn head(&self) -> Result<u64, DataSourceError> {
        self.take_failure()?;
        Ok(self.state.read().blocks.len() as u64 - 1)
    }

    async fn get_block(&self, number: u64) -> Result<BlockHeader, DataSourceError> {
        self.take_failure()?;
        self.state
            .read()
            .blocks
            .get(number as usize)
            .copied()
            .ok_or(DataSourceError::BlockNotFound(number))
    }

    async fn get_logs(
        &self,
        from: u64,
        to: u64,
        filter: &LogFilter,
    ) -> Result<LogBatch, DataSourceError> {
        self.take_failure()?;
        let mut state = self.state.write();
        state.get_logs_calls += 1;

        let covered_to = if state.truncate_next > 0 {
            state.truncate_next -= 1;
            from + (to.saturating_sub(from)) / 2
        } else {
            to
        };
        if to < from {
            return Ok(LogBatch {
                covered_to: to,
                logs: Vec::new(),
            });
        }

        let logs = state
            .logs
            .range(from..=covered_to)
            .flat_map(|(_, logs)| logs.iter())
            .filter(|l| l.address == filter.address && l.log.kind == filter.kind)
            .map(|l| l.log.clone())
            .collect();
        Ok(LogBatch { covered_to, logs })
    }

    fn subscribe(&self, _filter: &LogFilter) -> Option<broadcast::Receiver<u64>> {
        Some(self.heads.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filter() -> LogFilter {
        LogFilter {
            chain_id: ChainId(1),
            address: Address([1; 20]),
            kind: EventKind::MessageReceived,
        }
    }

    #[tokio::test]
    async fn test_emit_and_fetch() {
        let chain = ScriptedChain::new(ChainId(1), 1_000);
        chain.mine(3);
        let log = chain.emit(
            Address([1; 20]),
            EventKind::MessageReceived,
            TxHash([9; 32]),
            json!({"source_domain": 0, "nonce": 1}),
        );
        assert_eq!(log.block_number, 4);
        assert_eq!(chain.head().await.unwrap(), 4);

        let batch = chain.get_logs(0, 4, &filter()).await.unwrap();
        assert_eq!(batch.covered_to, 4);
        assert_eq!(batch.logs, vec![log]);
    }

    #[tokio::test]
    async fn test_reorg_changes_hashes_and_drops_logs() {
        let chain = ScriptedChain::new(ChainId(1), 1_000);
        chain.mine(2);
        chain.emit(
            Address([1; 20]),
            EventKind::MessageReceived,
            TxHash([9; 32]),
            json!({}),
        );
        let before = chain.block_hash(3).unwrap();
        let stable = chain.block_hash(1).unwrap();

        assert_eq!(chain.reorg(2), 3);
        assert_ne!(chain.block_hash(3).unwrap(), before);
        assert_eq!(chain.block_hash(1).unwrap(), stable);
        assert!(chain.get_logs(0, 3, &filter()).await.unwrap().logs.is_empty());
    }

    #[tokio::test]
    async fn test_scripted_failures_and_truncation() {
        let chain = ScriptedChain::new(ChainId(1), 1_000);
        chain.mine(10);
        chain.fail_next(1);
        assert!(chain.head().await.is_err());
        assert!(chain.head().await.is_ok());

        chain.truncate_next(1);
        assert_eq!(chain.get_logs(1, 9, &filter()).await.unwrap().covered_to, 5);
        assert_eq!(chain.get_logs(1, 9, &filter()).await.unwrap().covered_to, 9);
    }
}
