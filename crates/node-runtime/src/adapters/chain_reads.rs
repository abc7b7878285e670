//! # EVM Chain Reads
//!
//! Read-only contract and account queries used by bonding, the relay and
//! the health monitor. One JSON-RPC client per enabled chain.

use async_trait::async_trait;
use bn_03_bonding_engine::{CreditSource, GasOracle};
use bn_05_attestation_relay::NonceChecker;
use bn_06_health_check::ChainStatus;
use serde_json::json;
use shared_types::{Address, Amount, ChainId, ChainReadError, RouteKey, TokenSymbol};
use std::collections::HashMap;

use super::abi;
use super::rpc::{parse_amount_quantity, parse_bytes, parse_quantity, JsonRpcClient};

pub struct EvmChainReader {
    chains: HashMap<ChainId, JsonRpcClient>,
    bonder: Address,
    /// Destination bridge per route, answering `getCredit`.
    bridges: HashMap<RouteKey, Address>,
    /// Message transmitter per chain, answering `usedNonces`.
    transmitters: HashMap<ChainId, Address>,
}

impl EvmChainReader {
    pub fn new(chains: HashMap<ChainId, JsonRpcClient>, bonder: Address) -> Self {
        Self {
            chains,
            bonder,
            bridges: HashMap::new(),
            transmitters: HashMap::new(),
        }
    }

    pub fn with_bridge(mut self, route: RouteKey, bridge: Address) -> Self {
        self.bridges.insert(route, bridge);
        self
    }

    pub fn with_transmitter(mut self, chain: ChainId, transmitter: Address) -> Self {
        self.transmitters.insert(chain, transmitter);
        self
    }

    fn rpc(&self, chain: ChainId) -> Result<&JsonRpcClient, ChainReadError> {
        self.chains
            .get(&chain)
            .ok_or(ChainReadError::UnsupportedChain(chain))
    }

    async fn eth_call(
        &self,
        chain: ChainId,
        to: Address,
        data: Vec<u8>,
    ) -> Result<Vec<u8>, ChainReadError> {
        let call = json!({ "to": to, "data": format!("0x{}", hex::encode(data)) });
        let raw: String = self
            .rpc(chain)?
            .call_as("eth_call", json!([call, "latest"]))
            .await?;
        Ok(parse_bytes(&raw)?)
    }
}

fn abi_failure(e: abi::AbiError) -> ChainReadError {
    ChainReadError::Rpc(e.to_string())
}

#[async_trait]
impl CreditSource for EvmChainReader {
    async fn credit(&self, chain_id: ChainId, token: &TokenSymbol) -> Result<Amount, ChainReadError> {
        let route = RouteKey::new(token.clone(), chain_id);
        let bridge = *self
            .bridges
            .get(&route)
            .ok_or(ChainReadError::UnsupportedChain(chain_id))?;
        let output = self
            .eth_call(chain_id, bridge, abi::get_credit_call(self.bonder))
            .await?;
        abi::decode_credit(&output).map_err(abi_failure)
    }
}

#[async_trait]
impl GasOracle for EvmChainReader {
    async fn gas_price(&self, chain_id: ChainId) -> Result<Amount, ChainReadError> {
        let raw: String = self.rpc(chain_id)?.call_as("eth_gasPrice", json!([])).await?;
        Ok(parse_amount_quantity(&raw)?)
    }
}

#[async_trait]
impl ChainStatus for EvmChainReader {
    async fn head(&self, chain: ChainId) -> Result<u64, ChainReadError> {
        let raw: String = self.rpc(chain)?.call_as("eth_blockNumber", json!([])).await?;
        Ok(parse_quantity(&raw)?)
    }

    async fn native_balance(
        &self,
        chain: ChainId,
        address: Address,
    ) -> Result<Amount, ChainReadError> {
        let raw: String = self
            .rpc(chain)?
            .call_as("eth_getBalance", json!([address, "latest"]))
            .await?;
        Ok(parse_amount_quantity(&raw)?)
    }
}

#[async_trait]
impl NonceChecker for EvmChainReader {
    async fn is_nonce_used(
        &self,
        chain: ChainId,
        source_domain: u32,
        nonce: u64,
    ) -> Result<bool, ChainReadError> {
        let transmitter = *self
            .transmitters
            .get(&chain)
            .ok_or(ChainReadError::UnsupportedChain(chain))?;
        let output = self
            .eth_call(chain, transmitter, abi::used_nonces_call(source_domain, nonce))
            .await?;
        abi::decode_used_nonce(&output).map_err(abi_failure)
    }
}
