//! Minimum wait between source confirmation and relay, per chain pair.
//!
//! The attestor's own finality SLA plus a buffer for provider lag observed
//! in practice.

use serde::{Deserialize, Serialize};
use shared_types::ChainId;

const MINUTE: u64 = 60;

/// Used for a source chain without an entry.
pub const DEFAULT_DELAY_SECS: u64 = 30 * MINUTE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainDelay {
    pub chain: ChainId,
    pub delay_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairDelay {
    pub source: ChainId,
    pub destination: ChainId,
    pub delay_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttestationDelayTable {
    /// Per source chain.
    pub chains: Vec<ChainDelay>,
    /// Take precedence over the source chain entry.
    pub pairs: Vec<PairDelay>,
    pub fallback_secs: u64,
}

impl Default for AttestationDelayTable {
    fn default() -> Self {
        Self::mainnet()
    }
}

impl AttestationDelayTable {
    pub fn mainnet() -> Self {
        let chains = [(1, 20), (10, 20), (42161, 20), (8453, 20), (137, 30)]
            .into_iter()
            .map(|(chain, minutes)| ChainDelay {
                chain: ChainId(chain),
                delay_secs: minutes * MINUTE,
            })
            .collect();
        Self {
            chains,
            pairs: Vec::new(),
            fallback_secs: DEFAULT_DELAY_SECS,
        }
    }

    pub fn delay_secs(&self, source: ChainId, destination: ChainId) -> u64 {
        if let Some(pair) = self
            .pairs
            .iter()
            .find(|p| p.source == source && p.destination == destination)
        {
            return pair.delay_secs;
        }
        self.chains
            .iter()
            .find(|c| c.chain == source)
            .map(|c| c.delay_secs)
            .unwrap_or(self.fallback_secs)
    }
}
