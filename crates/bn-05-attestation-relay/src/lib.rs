//! # Attestation Relay (bn-05)
//!
//! Relays CCTP messages: waits for Circle's attestor to sign a message
//! observed on its source chain, waits out the pair's confirmation delay,
//! then submits `receiveMessage(message, attestation)` on the destination.
//!
//! ```text
//!  TransferStateStore ──MessageObserved──► AttestationRelayer ──GET /v1/attestations──► Iris
//!         ▲                                  │ RelayMachine per message
//!         │                                  │ OutboundThrottle (cap + pacer)
//!         └────────── record_relayed ◄───────┴──receiveMessage──► TransactionSubmitter
//! ```
//!
//! ## Domain Invariants
//!
//! | Invariant | Enforcement |
//! |-----------|-------------|
//! | Relayed only when attested and delayed | `RelayMachine::ready_to_relay` gates `relay` |
//! | Attestation failures never abandon a message | `AttestationFailed` is retried at the poll interval |
//! | No double relay | One task per message hash; destination nonce checked before submit |
//! | Survives restart | Unrelayed messages re-hydrated from the store |

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

#[cfg(test)]
mod test_utils;

pub use adapters::IrisClient;
pub use domain::{
    AttestationDelayTable, AttestationError, AttestationResponse, AttestationStep, ChainDelay,
    LedgerError, PairDelay, RelayConfig, RelayError, RelayMachine, RelayState, Transmitter,
    MAINNET_ATTESTATION_URL, SANDBOX_ATTESTATION_URL,
};
pub use ports::inbound::{RelayApi, RelayOutcome};
pub use ports::outbound::{AttestationService, NonceChecker, RelayLedger};
pub use service::{AttestationRelayer, RelayPorts, Step};
