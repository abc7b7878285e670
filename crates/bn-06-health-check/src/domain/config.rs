use serde::{Deserialize, Serialize};
use shared_types::{decimal_amount, Address, Amount, ChainId, RouteKey, TokenSymbol};
use std::path::PathBuf;

use super::errors::HealthError;
use super::report::CheckName;

const HOUR: u64 = 3600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceFloor {
    pub chain: ChainId,
    #[serde(with = "decimal_amount")]
    pub floor: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityFloor {
    pub token: TokenSymbol,
    pub destination_chain: ChainId,
    #[serde(with = "decimal_amount")]
    pub floor: Amount,
}

impl LiquidityFloor {
    pub fn route(&self) -> RouteKey {
        RouteKey::new(self.token.clone(), self.destination_chain)
    }
}

/// Per-chain lag allowed between a watcher's watermark and the chain head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LagLimit {
    pub chain: ChainId,
    pub max_lag_blocks: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// History considered by each cycle.
    pub window_days: u64,
    pub enabled_checks: Vec<CheckName>,

    pub bond_grace_secs: u64,
    pub settle_grace_secs: u64,
    pub relay_grace_secs: u64,

    pub max_lag_blocks: u64,
    pub lag_limits: Vec<LagLimit>,

    /// Whose native balance is checked.
    pub bonder: Address,
    pub balance_floors: Vec<BalanceFloor>,
    pub liquidity_floors: Vec<LiquidityFloor>,

    /// Latest report as JSON.
    pub cache_file: Option<PathBuf>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 5 * 60,
            window_days: 1,
            enabled_checks: CheckName::ALL.to_vec(),
            bond_grace_secs: HOUR,
            settle_grace_secs: 6 * HOUR,
            relay_grace_secs: 2 * HOUR,
            max_lag_blocks: 500,
            lag_limits: Vec::new(),
            bonder: Address::ZERO,
            balance_floors: Vec::new(),
            liquidity_floors: Vec::new(),
            cache_file: None,
        }
    }
}

impl HealthConfig {
    pub fn is_enabled(&self, check: CheckName) -> bool {
        self.enabled_checks.contains(&check)
    }

    pub fn window_secs(&self) -> u64 {
        self.window_days.saturating_mul(24 * HOUR)
    }

    pub fn max_lag(&self, chain: ChainId) -> u64 {
        self.lag_limits
            .iter()
            .find(|l| l.chain == chain)
            .map(|l| l.max_lag_blocks)
            .unwrap_or(self.max_lag_blocks)
    }

    pub fn validate(&self) -> Result<(), HealthError> {
        if self.interval_secs == 0 {
            return Err(HealthError::InvalidConfiguration(
                "interval_secs must be positive".into(),
            ));
        }
        if self.window_days == 0 {
            return Err(HealthError::InvalidConfiguration(
                "window_days must be positive".into(),
            ));
        }
        if !self.balance_floors.is_empty() && self.bonder.is_zero() {
            return Err(HealthError::InvalidConfiguration(
                "balance floors need a bonder address".into(),
            ));
        }
        Ok(())
    }
}
