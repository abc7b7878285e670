//! # Relay State Machine
//!
//! Lifecycle of one CCTP message from observation to relay. Pure: every
//! time-dependent transition takes `now` in unix seconds.
//!
//! ```text
//!   Observed ──observe──► AttestationPending ◄──────────┐
//!                            │      ▲    │ error         │ retry
//!                            │      │    ▼               │
//!             complete and   │      │  AttestationFailed ┘
//!             delay elapsed  │      │
//!                            ▼      │ complete, delay not elapsed
//!                         Attested ─┘ (attestation cached)
//!                            │
//!                            ▼ on_relayed
//!                         Relayed
//! ```
//!
//! A message that keeps failing attestation retrieval never expires: the
//! source funds are stuck until it is relayed.

use serde::{Deserialize, Serialize};
use shared_types::{CctpMessage, ChainId, MessageHash, TxHash};
use std::fmt;

use super::errors::RelayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelayState {
    Observed,
    AttestationPending,
    Attested,
    AttestationFailed,
    Relayed,
}

impl RelayState {
    pub fn name(&self) -> &'static str {
        match self {
            RelayState::Observed => "observed",
            RelayState::AttestationPending => "attestation_pending",
            RelayState::Attested => "attested",
            RelayState::AttestationFailed => "attestation_failed",
            RelayState::Relayed => "relayed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RelayState::Relayed)
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the attestation service said about a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttestationResponse {
    Pending,
    Complete { attestation: Vec<u8> },
}

/// Result of feeding an attestation response to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttestationStep {
    NotReady,
    /// Attested, but the pair's minimum delay has not elapsed yet.
    Delayed { remaining_secs: u64 },
    Attested,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayMachine {
    message_hash: MessageHash,
    source_chain: ChainId,
    destination_chain: ChainId,
    /// Source-chain confirmation time.
    observed_at: u64,
    min_delay_secs: u64,
    state: RelayState,
    attestation: Option<Vec<u8>>,
    failures: u32,
    relay_tx: Option<TxHash>,
}

impl RelayMachine {
    pub fn new(message: &CctpMessage, min_delay_secs: u64) -> Self {
        Self {
            message_hash: message.message_hash,
            source_chain: message.source_chain,
            destination_chain: message.destination_chain,
            observed_at: message.observed_at,
            min_delay_secs,
            state: RelayState::Observed,
            attestation: None,
            failures: 0,
            relay_tx: None,
        }
    }

    pub fn message_hash(&self) -> MessageHash {
        self.message_hash
    }

    pub fn source_chain(&self) -> ChainId {
        self.source_chain
    }

    pub fn destination_chain(&self) -> ChainId {
        self.destination_chain
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    pub fn attestation(&self) -> Option<&[u8]> {
        self.attestation.as_deref()
    }

    /// Consecutive attestation retrieval failures.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn relay_tx(&self) -> Option<TxHash> {
        self.relay_tx
    }

    /// Earliest time a relay may be submitted.
    pub fn release_at(&self) -> u64 {
        self.observed_at.saturating_add(self.min_delay_secs)
    }

    pub fn remaining_delay(&self, now: u64) -> u64 {
        self.release_at().saturating_sub(now)
    }

    fn invalid(&self, event: &'static str) -> RelayError {
        RelayError::InvalidTransition {
            from: self.state,
            event,
        }
    }

    pub fn observe(&mut self) -> Result<(), RelayError> {
        match self.state {
            RelayState::Observed => {
                self.state = RelayState::AttestationPending;
                Ok(())
            }
            _ => Err(self.invalid("observe")),
        }
    }

    pub fn on_attestation(
        &mut self,
        response: AttestationResponse,
        now: u64,
    ) -> Result<AttestationStep, RelayError> {
        if !matches!(
            self.state,
            RelayState::AttestationPending | RelayState::AttestationFailed
        ) {
            return Err(self.invalid("on_attestation"));
        }
        self.failures = 0;
        self.state = RelayState::AttestationPending;
        match response {
            AttestationResponse::Pending => Ok(AttestationStep::NotReady),
            AttestationResponse::Complete { attestation } => {
                self.attestation = Some(attestation);
                if self.ready_to_relay(now) {
                    Ok(AttestationStep::Attested)
                } else {
                    Ok(AttestationStep::Delayed {
                        remaining_secs: self.remaining_delay(now),
                    })
                }
            }
        }
    }

    /// Record a failed poll. Returns the consecutive failure count.
    pub fn on_attestation_error(&mut self) -> Result<u32, RelayError> {
        match self.state {
            RelayState::AttestationPending | RelayState::AttestationFailed => {
                self.failures = self.failures.saturating_add(1);
                self.state = RelayState::AttestationFailed;
                Ok(self.failures)
            }
            _ => Err(self.invalid("on_attestation_error")),
        }
    }

    /// Whether the relay may be submitted now. Moves a cached attestation to
    /// `Attested` once the delay has elapsed.
    pub fn ready_to_relay(&mut self, now: u64) -> bool {
        match self.state {
            RelayState::Attested => true,
            RelayState::AttestationPending
                if self.attestation.is_some() && now >= self.release_at() =>
            {
                self.state = RelayState::Attested;
                true
            }
            _ => false,
        }
    }

    /// The relay transaction confirmed.
    pub fn on_relayed(&mut self, tx_hash: TxHash) -> Result<(), RelayError> {
        match self.state {
            RelayState::Attested => {
                self.state = RelayState::Relayed;
                self.relay_tx = Some(tx_hash);
                Ok(())
            }
            _ => Err(self.invalid("on_relayed")),
        }
    }

    /// The destination already consumed the nonce; someone else relayed it.
    pub fn on_relayed_elsewhere(&mut self) -> Result<(), RelayError> {
        if self.state.is_terminal() {
            return Err(self.invalid("on_relayed_elsewhere"));
        }
        self.state = RelayState::Relayed;
        Ok(())
    }
}
