//! # EVM Chain Source
//!
//! [`ChainDataSource`] over Ethereum JSON-RPC: `eth_blockNumber`,
//! `eth_getBlockByNumber` and `eth_getLogs` filtered by contract and topic0.
//! Logs the node cannot decode are passed on with `fields: null` so the
//! watcher rejects the batch and retries it.

use async_trait::async_trait;
use bn_01_chain_watcher::{BlockHeader, ChainDataSource, DataSourceError, LogBatch, LogFilter, RawLog};
use serde::Deserialize;
use serde_json::{json, Value};
use shared_types::{BlockHash, ChainId, TxHash};
use std::str::FromStr;
use tracing::{debug, warn};

use super::abi;
use super::rpc::{parse_bytes, parse_quantity, to_quantity, JsonRpcClient, RpcError};

impl From<RpcError> for DataSourceError {
    fn from(e: RpcError) -> Self {
        if e.is_rate_limited() {
            DataSourceError::RateLimited
        } else {
            DataSourceError::Rpc(e.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlock {
    number: String,
    hash: String,
    parent_hash: String,
    timestamp: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    topics: Vec<String>,
    data: String,
    block_number: String,
    block_hash: String,
    transaction_hash: String,
    log_index: String,
    #[serde(default)]
    removed: bool,
}

fn parse_hash<T: FromStr>(raw: &str) -> Result<T, RpcError>
where
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e: T::Err| RpcError::Decode(format!("{raw}: {e}")))
}

pub struct EvmChainSource {
    chain_id: ChainId,
    rpc: JsonRpcClient,
}

impl EvmChainSource {
    pub fn new(chain_id: ChainId, rpc: JsonRpcClient) -> Self {
        Self { chain_id, rpc }
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    fn to_raw_log(&self, filter: &LogFilter, log: RpcLog) -> Result<RawLog, RpcError> {
        let topics = log
            .topics
            .iter()
            .map(|t| parse_hash::<BlockHash>(t).map(|h| alloy_primitives::B256::from(h.0)))
            .collect::<Result<Vec<_>, _>>()?;
        let data = parse_bytes(&log.data)?;
        let transaction_hash: TxHash = parse_hash(&log.transaction_hash)?;
        let log_index = u32::try_from(parse_quantity(&log.log_index)?)
            .map_err(|_| RpcError::Decode(format!("log index {} too large", log.log_index)))?;

        let fields = match abi::decode_log_fields(filter.kind, &topics, &data) {
            Ok(fields) => fields,
            Err(e) => {
                warn!(
                    chain = %self.chain_id,
                    tx = %transaction_hash,
                    log_index,
                    error = %e,
                    "[bn-01] Undecodable {} log",
                    filter.kind
                );
                Value::Null
            }
        };

        Ok(RawLog {
            kind: filter.kind,
            block_number: parse_quantity(&log.block_number)?,
            block_hash: parse_hash(&log.block_hash)?,
            transaction_hash,
            log_index,
            block_timestamp: None,
            fields,
        })
    }
}

#[async_trait]
impl ChainDataSource for EvmChainSource {
    async fn head(&self) -> Result<u64, DataSourceError> {
        let raw: String = self.rpc.call_as("eth_blockNumber", json!([])).await?;
        Ok(parse_quantity(&raw)?)
    }

    async fn get_block(&self, number: u64) -> Result<BlockHeader, DataSourceError> {
        let block: Option<RpcBlock> = self
            .rpc
            .call_as("eth_getBlockByNumber", json!([to_quantity(number), false]))
            .await?;
        let block = block.ok_or(DataSourceError::BlockNotFound(number))?;
        Ok(BlockHeader {
            number: parse_quantity(&block.number)?,
            hash: parse_hash(&block.hash)?,
            parent_hash: parse_hash(&block.parent_hash)?,
            timestamp: parse_quantity(&block.timestamp)?,
        })
    }

    async fn get_logs(
        &self,
        from: u64,
        to: u64,
        filter: &LogFilter,
    ) -> Result<LogBatch, DataSourceError> {
        let params = json!([{
            "fromBlock": to_quantity(from),
            "toBlock": to_quantity(to),
            "address": filter.address,
            "topics": [format!("0x{}", hex::encode(abi::event_topic(filter.kind)))],
        }]);
        let logs: Vec<RpcLog> = self.rpc.call_as("eth_getLogs", params).await?;
        debug!(
            chain = %self.chain_id,
            kind = %filter.kind,
            from,
            to,
            count = logs.len(),
            "[bn-01] Fetched logs"
        );

        let mut out = Vec::with_capacity(logs.len());
        for log in logs.into_iter().filter(|l| !l.removed) {
            out.push(self.to_raw_log(filter, log)?);
        }
        out.sort_by_key(|l| (l.block_number, l.log_index));
        Ok(LogBatch {
            covered_to: to,
            logs: out,
        })
    }
}
