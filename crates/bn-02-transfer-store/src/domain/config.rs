//! Store configuration.

use serde::{Deserialize, Serialize};

/// Default seconds an out-of-order event may wait for its predecessor.
pub const DEFAULT_GAP_TIMEOUT_SECS: u64 = 3_600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Buffered events older than this escalate to an unresolvable gap.
    pub gap_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            gap_timeout_secs: DEFAULT_GAP_TIMEOUT_SECS,
        }
    }
}
