pub mod config;
pub mod delays;
pub mod errors;
pub mod state;

pub use config::{
    RelayConfig, Transmitter, MAINNET_ATTESTATION_URL, SANDBOX_ATTESTATION_URL,
};
pub use delays::{AttestationDelayTable, ChainDelay, PairDelay};
pub use errors::{AttestationError, LedgerError, RelayError};
pub use state::{AttestationResponse, AttestationStep, RelayMachine, RelayState};
