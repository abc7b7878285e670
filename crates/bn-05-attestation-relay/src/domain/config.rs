use serde::{Deserialize, Serialize};
use shared_resilience::ThrottleConfig;
use shared_types::{Address, ChainId};

use super::delays::AttestationDelayTable;
use super::errors::RelayError;

pub const MAINNET_ATTESTATION_URL: &str = "https://iris-api.circle.com";
pub const SANDBOX_ATTESTATION_URL: &str = "https://iris-api-sandbox.circle.com";

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Message transmitter that accepts `receiveMessage` on a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transmitter {
    pub chain: ChainId,
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub enabled: bool,
    /// Base URL of the attestation service.
    pub attestation_url: String,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
    /// Caps concurrent and per-second attestation requests.
    pub throttle: ThrottleConfig,
    pub delays: AttestationDelayTable,
    pub transmitters: Vec<Transmitter>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            attestation_url: MAINNET_ATTESTATION_URL.to_string(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            throttle: ThrottleConfig::default(),
            delays: AttestationDelayTable::default(),
            transmitters: Vec::new(),
        }
    }
}

impl RelayConfig {
    pub fn transmitter(&self, chain: ChainId) -> Option<Address> {
        self.transmitters
            .iter()
            .find(|t| t.chain == chain)
            .map(|t| t.address)
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        if self.poll_interval_secs == 0 {
            return Err(RelayError::InvalidConfiguration(
                "poll_interval_secs must be positive".into(),
            ));
        }
        if !self.attestation_url.starts_with("http://")
            && !self.attestation_url.starts_with("https://")
        {
            return Err(RelayError::InvalidConfiguration(format!(
                "attestation_url {:?} is not an http(s) URL",
                self.attestation_url
            )));
        }
        if self.throttle.max_concurrent == 0 {
            return Err(RelayError::InvalidConfiguration(
                "throttle.max_concurrent must be positive".into(),
            ));
        }
        if let Some(t) = self.transmitters.iter().find(|t| t.address.is_zero()) {
            return Err(RelayError::InvalidConfiguration(format!(
                "transmitter for chain {} has a zero address",
                t.chain
            )));
        }
        Ok(())
    }
}
