//! # Inbound Ports (Driving Ports)

use async_trait::async_trait;
use shared_types::{CctpMessage, MessageHash, TxHash};
use tokio::sync::watch;

use crate::domain::errors::RelayError;
use crate::domain::state::RelayState;

/// How a relay task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Relayed { tx_hash: TxHash },
    /// The destination had already consumed the nonce.
    RelayedElsewhere,
    /// Shutdown arrived before the message was relayed.
    Interrupted { state: RelayState },
}

#[async_trait]
pub trait RelayApi: Send + Sync {
    /// Drive one message until it is relayed or `shutdown` flips.
    async fn relay_message(
        &self,
        message: CctpMessage,
        shutdown: watch::Receiver<bool>,
    ) -> Result<RelayOutcome, RelayError>;

    /// Current state of a message with an active relay task.
    fn state_of(&self, message_hash: &MessageHash) -> Option<RelayState>;

    fn in_flight(&self) -> usize;
}
