use serde::{Deserialize, Serialize};
use shared_types::{Address, ChainId, RouteKey, TokenSymbol};

use super::errors::SettlementError;

pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 3600;
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_SETTLE_THRESHOLD_PERCENT: u8 = 100;
pub const DEFAULT_SETTLE_RETRY_BASE_SECS: u64 = 60;
pub const DEFAULT_SETTLE_RETRY_MAX_SECS: u64 = 3600;

fn default_reconcile_timeout_secs() -> u64 {
    DEFAULT_RECONCILE_TIMEOUT_SECS
}

fn default_tick_interval_secs() -> u64 {
    DEFAULT_TICK_INTERVAL_SECS
}

fn default_settle_threshold_percent() -> u8 {
    DEFAULT_SETTLE_THRESHOLD_PERCENT
}

fn default_settle_retry_base_secs() -> u64 {
    DEFAULT_SETTLE_RETRY_BASE_SECS
}

fn default_settle_retry_max_secs() -> u64 {
    DEFAULT_SETTLE_RETRY_MAX_SECS
}

/// Destination bridge that accepts `settleBondedWithdrawals` for a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleBridge {
    pub token: TokenSymbol,
    pub destination_chain: ChainId,
    pub bridge: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// How long a bundle may wait for member bonds before it is reported
    /// as an incomplete settlement.
    #[serde(default = "default_reconcile_timeout_secs")]
    pub reconcile_timeout_secs: u64,

    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Submit `settleBondedWithdrawals` for reconciled bundles.
    #[serde(default)]
    pub auto_settle: bool,

    /// Minimum share of a bundle's amount bonded by this node before it
    /// settles the bundle itself.
    #[serde(default = "default_settle_threshold_percent")]
    pub settle_threshold_percent: u8,

    /// Wait after the first failed settlement of a bundle. Doubles with
    /// each further failure up to `settle_retry_max_secs`.
    #[serde(default = "default_settle_retry_base_secs")]
    pub settle_retry_base_secs: u64,

    #[serde(default = "default_settle_retry_max_secs")]
    pub settle_retry_max_secs: u64,

    /// Filled from the bonding configuration when not given.
    #[serde(default)]
    pub bonder: Address,

    #[serde(default)]
    pub bridges: Vec<SettleBridge>,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            reconcile_timeout_secs: DEFAULT_RECONCILE_TIMEOUT_SECS,
            tick_interval_secs: DEFAULT_TICK_INTERVAL_SECS,
            auto_settle: false,
            settle_threshold_percent: DEFAULT_SETTLE_THRESHOLD_PERCENT,
            settle_retry_base_secs: DEFAULT_SETTLE_RETRY_BASE_SECS,
            settle_retry_max_secs: DEFAULT_SETTLE_RETRY_MAX_SECS,
            bonder: Address::ZERO,
            bridges: Vec::new(),
        }
    }
}

impl SettlementConfig {
    pub fn bridge(&self, route: &RouteKey) -> Option<Address> {
        self.bridges
            .iter()
            .find(|b| b.token == route.token && b.destination_chain == route.destination_chain)
            .map(|b| b.bridge)
    }

    /// Delay before retrying a bundle that has failed `failures` times.
    pub fn settle_retry_delay(&self, failures: u32) -> u64 {
        let doublings = failures.saturating_sub(1).min(32);
        self.settle_retry_base_secs
            .saturating_mul(1u64 << doublings)
            .min(self.settle_retry_max_secs)
    }

    pub fn validate(&self) -> Result<(), SettlementError> {
        if self.reconcile_timeout_secs == 0 {
            return Err(SettlementError::InvalidConfiguration(
                "reconcile_timeout_secs must be positive".into(),
            ));
        }
        if self.settle_threshold_percent == 0 || self.settle_threshold_percent > 100 {
            return Err(SettlementError::InvalidConfiguration(format!(
                "settle_threshold_percent {} outside 1..=100",
                self.settle_threshold_percent
            )));
        }
        if self.settle_retry_base_secs == 0 || self.settle_retry_max_secs < self.settle_retry_base_secs {
            return Err(SettlementError::InvalidConfiguration(format!(
                "settle retry delays {}..{} must be positive and ordered",
                self.settle_retry_base_secs, self.settle_retry_max_secs
            )));
        }
        if self.auto_settle && self.bonder.is_zero() {
            return Err(SettlementError::InvalidConfiguration(
                "auto_settle needs a bonder address".into(),
            ));
        }
        Ok(())
    }
}
