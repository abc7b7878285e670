//! Bonding configuration. Built once at startup and never mutated.

use serde::{Deserialize, Serialize};
use shared_types::{decimal_amount, Address, Amount, ChainId, RouteKey, TokenSymbol};
use std::collections::HashSet;

use super::errors::BondingError;

pub const DEFAULT_RESCAN_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_MAX_GAS_LIMIT: u64 = 1_000_000;
/// 500 gwei.
pub const DEFAULT_MAX_GAS_PRICE_WEI: u64 = 500_000_000_000;

fn default_true() -> bool {
    true
}

fn default_max_gas_limit() -> u64 {
    DEFAULT_MAX_GAS_LIMIT
}

fn default_max_gas_price() -> Amount {
    Amount::from(DEFAULT_MAX_GAS_PRICE_WEI)
}

fn default_rescan_interval_secs() -> u64 {
    DEFAULT_RESCAN_INTERVAL_SECS
}

/// Policy for one `(token, destination chain)` route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub token: TokenSymbol,
    pub destination_chain: ChainId,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Destination bridge that receives `bondWithdrawal`.
    pub bridge: Address,
    /// Transfers below this amount are never bonded.
    #[serde(default, with = "decimal_amount")]
    pub min_threshold: Amount,
    #[serde(default, with = "decimal_amount")]
    pub min_bonder_fee: Amount,
    /// Headroom required on top of the transfer amount.
    #[serde(default, with = "decimal_amount")]
    pub fee_margin: Amount,
    /// Liquidity that must remain available after a bond.
    #[serde(default, with = "decimal_amount")]
    pub liquidity_floor: Amount,
    #[serde(default = "default_max_gas_price", with = "decimal_amount")]
    pub max_gas_price: Amount,
    #[serde(default = "default_max_gas_limit")]
    pub max_gas_limit: u64,
    /// Explicit gas limit for bond transactions. Estimated when absent.
    #[serde(default)]
    pub gas_limit_override: Option<u64>,
}

impl RouteConfig {
    pub fn new(token: TokenSymbol, destination_chain: ChainId, bridge: Address) -> Self {
        Self {
            token,
            destination_chain,
            enabled: true,
            bridge,
            min_threshold: Amount::zero(),
            min_bonder_fee: Amount::zero(),
            fee_margin: Amount::zero(),
            liquidity_floor: Amount::zero(),
            max_gas_price: default_max_gas_price(),
            max_gas_limit: DEFAULT_MAX_GAS_LIMIT,
            gas_limit_override: None,
        }
    }

    pub fn key(&self) -> RouteKey {
        RouteKey::new(self.token.clone(), self.destination_chain)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondingConfig {
    /// Address bonds are made from.
    pub bonder: Address,
    /// Evaluate everything, send nothing.
    #[serde(default)]
    pub dry_mode: bool,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
    /// Period of the rescan over transfers still in `Sent`.
    #[serde(default = "default_rescan_interval_secs")]
    pub rescan_interval_secs: u64,
}

impl BondingConfig {
    pub fn new(bonder: Address) -> Self {
        Self {
            bonder,
            dry_mode: false,
            routes: Vec::new(),
            rescan_interval_secs: DEFAULT_RESCAN_INTERVAL_SECS,
        }
    }

    pub fn with_route(mut self, route: RouteConfig) -> Self {
        self.routes.push(route);
        self
    }

    pub fn route(&self, key: &RouteKey) -> Option<&RouteConfig> {
        self.routes
            .iter()
            .find(|r| r.token == key.token && r.destination_chain == key.destination_chain)
    }

    pub fn validate(&self) -> Result<(), BondingError> {
        if self.bonder.is_zero() {
            return Err(BondingError::InvalidConfiguration(
                "bonder address is zero".into(),
            ));
        }
        let mut seen = HashSet::new();
        for route in &self.routes {
            if !seen.insert(route.key()) {
                return Err(BondingError::InvalidConfiguration(format!(
                    "route {} configured twice",
                    route.key()
                )));
            }
            if route.bridge.is_zero() {
                return Err(BondingError::InvalidConfiguration(format!(
                    "route {} has no bridge address",
                    route.key()
                )));
            }
            if route.max_gas_limit == 0 {
                return Err(BondingError::InvalidConfiguration(format!(
                    "route {}: max_gas_limit must be positive",
                    route.key()
                )));
            }
        }
        Ok(())
    }
}
