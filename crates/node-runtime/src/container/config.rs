//! # Node Configuration
//!
//! One immutable [`BonderConfig`] snapshot, read from TOML at startup and
//! handed to each subsystem by value.
//!
//! ## Sources
//!
//! - the file named by `BN_CONFIG`, or the first CLI argument;
//! - `BN_BONDER_ADDRESS`, `BN_SIGNER_URL` and `BN_RATE_LIMIT_TOKEN` override
//!   the file so secrets can stay out of it.
//!
//! Every section has defaults. [`BonderConfig::validate`] refuses to start a
//! node that could not do its job.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use bn_01_chain_watcher::WatcherConfig;
use bn_02_transfer_store::StoreConfig;
use bn_03_bonding_engine::{BondingConfig, RouteConfig};
use bn_04_settlement::SettlementConfig;
use bn_05_attestation_relay::RelayConfig;
use bn_06_health_check::HealthConfig;
use serde::{Deserialize, Serialize};
use shared_resilience::{RateLimitConfig, RetryPolicy};
use shared_types::{Address, ChainId};
use thiserror::Error;

pub const CONFIG_ENV: &str = "BN_CONFIG";
pub const BONDER_ENV: &str = "BN_BONDER_ADDRESS";
pub const SIGNER_URL_ENV: &str = "BN_SIGNER_URL";
pub const RATE_LIMIT_TOKEN_ENV: &str = "BN_RATE_LIMIT_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration file: set {CONFIG_ENV} or pass a path")]
    MissingPath,

    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

fn invalid(message: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidConfiguration(message.to_string())
}

// =============================================================================
// SECTIONS
// =============================================================================

/// RPC endpoint of one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: ChainId,
    #[serde(default)]
    pub rpc_url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    15
}

/// Signing endpoint accepting `eth_sendTransaction`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignerConfig {
    pub url: String,
    /// Blocks on top of the receipt before a transaction counts as confirmed.
    pub confirmations: u64,
    pub receipt_poll_ms: u64,
    pub receipt_timeout_secs: u64,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            confirmations: 1,
            receipt_poll_ms: 2_000,
            receipt_timeout_secs: 300,
        }
    }
}

/// Ledger location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// Keep the ledger in memory. Everything is lost on exit.
    pub in_memory: bool,
    #[serde(flatten)]
    pub store: StoreConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            in_memory: false,
            store: StoreConfig::default(),
        }
    }
}

/// Bonding settings; the bonder address comes from the top level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BondingSection {
    pub enabled: bool,
    pub dry_mode: bool,
    pub rescan_interval_secs: u64,
    pub routes: Vec<RouteConfig>,
}

impl Default for BondingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            dry_mode: false,
            rescan_interval_secs: bn_03_bonding_engine::domain::config::DEFAULT_RESCAN_INTERVAL_SECS,
            routes: Vec::new(),
        }
    }
}

/// `/health` and `/metrics`. The port comes from `BN_METRICS_PORT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub enabled: bool,
    pub bind: IpAddr,
    pub rate_limit: RateLimitConfig,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

// =============================================================================
// BONDER CONFIG
// =============================================================================

/// Complete node configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BonderConfig {
    /// Account that bonds, settles and relays.
    pub bonder: Address,
    pub signer: SignerConfig,
    pub chains: Vec<ChainConfig>,
    pub watchers: Vec<WatcherConfig>,
    pub storage: StorageConfig,
    pub retry: RetryPolicy,
    pub bonding: BondingSection,
    pub settlement: SettlementConfig,
    pub relay: RelayConfig,
    pub health: HealthConfig,
    pub status: StatusConfig,
}

impl BonderConfig {
    /// Config file path from `BN_CONFIG`, else the first CLI argument.
    pub fn locate(
        env: impl Fn(&str) -> Option<String>,
        mut args: impl Iterator<Item = String>,
    ) -> Result<PathBuf, ConfigError> {
        env(CONFIG_ENV)
            .filter(|p| !p.is_empty())
            .or_else(|| args.nth(1))
            .map(PathBuf::from)
            .ok_or(ConfigError::MissingPath)
    }

    pub fn from_toml(path: &Path, raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Read, apply environment overrides and validate.
    pub fn load(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(path, &raw)?;
        config.apply_env(env)?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(bonder) = env(BONDER_ENV).filter(|v| !v.is_empty()) {
            self.bonder = bonder
                .parse()
                .map_err(|e| invalid(format!("{BONDER_ENV}: {e}")))?;
        }
        if let Some(url) = env(SIGNER_URL_ENV).filter(|v| !v.is_empty()) {
            self.signer.url = url;
        }
        if let Some(token) = env(RATE_LIMIT_TOKEN_ENV).filter(|v| !v.is_empty()) {
            self.status.rate_limit.bypass_token = Some(token);
        }
        Ok(())
    }

    pub fn chain(&self, chain_id: ChainId) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.chain_id == chain_id && c.enabled)
    }

    pub fn enabled_chains(&self) -> impl Iterator<Item = &ChainConfig> {
        self.chains.iter().filter(|c| c.enabled)
    }

    pub fn bonding_config(&self) -> BondingConfig {
        BondingConfig {
            bonder: self.bonder,
            dry_mode: self.bonding.dry_mode,
            routes: self.bonding.routes.clone(),
            rescan_interval_secs: self.bonding.rescan_interval_secs,
        }
    }

    pub fn settlement_config(&self) -> SettlementConfig {
        SettlementConfig {
            bonder: self.bonder,
            ..self.settlement.clone()
        }
    }

    pub fn health_config(&self) -> HealthConfig {
        HealthConfig {
            bonder: self.bonder,
            ..self.health.clone()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bonder.is_zero() {
            return Err(invalid(format!(
                "bonder address missing: set `bonder` or {BONDER_ENV}"
            )));
        }
        if self.signer.url.is_empty() {
            return Err(invalid(format!(
                "signer endpoint missing: set `signer.url` or {SIGNER_URL_ENV}"
            )));
        }
        if self.signer.receipt_poll_ms == 0 {
            return Err(invalid("signer.receipt_poll_ms must be positive"));
        }

        let mut seen = HashSet::new();
        for chain in &self.chains {
            if !seen.insert(chain.chain_id) {
                return Err(invalid(format!("chain {} configured twice", chain.chain_id)));
            }
            if chain.enabled && chain.rpc_url.is_empty() {
                return Err(invalid(format!("chain {} has no rpc_url", chain.chain_id)));
            }
        }

        let require_chain = |chain: ChainId, what: &str| -> Result<(), ConfigError> {
            match self.chain(chain) {
                Some(_) => Ok(()),
                None => Err(invalid(format!("{what} needs enabled chain {chain}"))),
            }
        };
        for watcher in &self.watchers {
            require_chain(watcher.chain_id, &format!("watcher {}", watcher.watermark_key()))?;
            watcher.validate().map_err(invalid)?;
        }
        if self.bonding.enabled {
            for route in &self.bonding.routes {
                require_chain(route.destination_chain, &format!("route {}", route.key()))?;
            }
            self.bonding_config().validate().map_err(invalid)?;
        }
        for bridge in &self.settlement.bridges {
            require_chain(bridge.destination_chain, "settlement bridge")?;
        }
        self.settlement_config().validate().map_err(invalid)?;
        if self.relay.enabled {
            for transmitter in &self.relay.transmitters {
                require_chain(transmitter.chain, "message transmitter")?;
            }
            self.relay.validate().map_err(invalid)?;
        }
        if self.health.enabled {
            self.health_config().validate().map_err(invalid)?;
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be positive"));
        }
        if self.status.rate_limit.enabled && self.status.rate_limit.max_requests == 0 {
            return Err(invalid("status.rate_limit.max_requests must be positive"));
        }
        Ok(())
    }
}
