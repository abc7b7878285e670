//! Watcher configuration.

use serde::{Deserialize, Serialize};
use shared_types::{Address, ChainId, EventKind, TokenSymbol, WatermarkKey};

use super::errors::WatcherError;

pub const DEFAULT_CONFIRMATIONS: u64 = 12;
pub const DEFAULT_REORG_SAFETY_DEPTH: u64 = 32;
pub const DEFAULT_BATCH_SIZE: u64 = 1000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_WINDOW_SIZE: usize = 128;

/// One watcher per `(chain, event kind)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherConfig {
    pub chain_id: ChainId,
    pub kind: EventKind,
    /// Contract emitting the watched event.
    pub contract: Address,
    /// Bridged token of the contract. Required for transfer and bundle events.
    #[serde(default)]
    pub token: Option<TokenSymbol>,
    /// First block to scan when no watermark is persisted.
    #[serde(default)]
    pub start_block: u64,
    /// Blocks behind head considered safe to read.
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    /// How far below a detected reorg the watermark is rolled back.
    #[serde(default = "default_reorg_safety_depth")]
    pub reorg_safety_depth: u64,
    /// Maximum blocks per `get_logs` call.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Recorded block hashes kept for reorg detection.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
}

fn default_confirmations() -> u64 {
    DEFAULT_CONFIRMATIONS
}

fn default_reorg_safety_depth() -> u64 {
    DEFAULT_REORG_SAFETY_DEPTH
}

fn default_batch_size() -> u64 {
    DEFAULT_BATCH_SIZE
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_window_size() -> usize {
    DEFAULT_WINDOW_SIZE
}

impl WatcherConfig {
    pub fn new(chain_id: ChainId, kind: EventKind, contract: Address) -> Self {
        Self {
            chain_id,
            kind,
            contract,
            token: None,
            start_block: 0,
            confirmations: DEFAULT_CONFIRMATIONS,
            reorg_safety_depth: DEFAULT_REORG_SAFETY_DEPTH,
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            window_size: DEFAULT_WINDOW_SIZE,
        }
    }

    pub fn with_token(mut self, token: TokenSymbol) -> Self {
        self.token = Some(token);
        self
    }

    pub fn watermark_key(&self) -> WatermarkKey {
        WatermarkKey {
            chain_id: self.chain_id,
            kind: self.kind,
        }
    }

    pub fn validate(&self) -> Result<(), WatcherError> {
        if self.contract.is_zero() {
            return Err(WatcherError::InvalidConfiguration(format!(
                "{}: contract address is zero",
                self.watermark_key()
            )));
        }
        if self.batch_size == 0 {
            return Err(WatcherError::InvalidConfiguration(format!(
                "{}: batch_size must be positive",
                self.watermark_key()
            )));
        }
        if self.window_size == 0 {
            return Err(WatcherError::InvalidConfiguration(format!(
                "{}: window_size must be positive",
                self.watermark_key()
            )));
        }
        let needs_token = matches!(self.kind, EventKind::TransferSent | EventKind::BundleCommitted);
        if needs_token && self.token.is_none() {
            return Err(WatcherError::InvalidConfiguration(format!(
                "{}: token is required for {} events",
                self.watermark_key(),
                self.kind
            )));
        }
        Ok(())
    }
}
