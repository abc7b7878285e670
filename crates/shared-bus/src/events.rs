//! # Store Transitions
//!
//! What the transfer state store announces after each durable commit.

use serde::{Deserialize, Serialize};
use shared_types::{
    Bundle, BundleId, CctpMessage, EventKey, EventKind, MessageHash, Transfer, TransferId,
    TransferState, TxHash,
};

/// One channel per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionTopic {
    Transfers,
    Bundles,
    Messages,
    Retractions,
}

impl TransitionTopic {
    pub const ALL: [TransitionTopic; 4] = [
        TransitionTopic::Transfers,
        TransitionTopic::Bundles,
        TransitionTopic::Messages,
        TransitionTopic::Retractions,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TransitionTopic::Transfers => "transfers",
            TransitionTopic::Bundles => "bundles",
            TransitionTopic::Messages => "messages",
            TransitionTopic::Retractions => "retractions",
        }
    }
}

/// A committed change to store state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreTransition {
    // =========================================================================
    // TRANSFERS
    // =========================================================================
    /// A new transfer entered the `Sent` state.
    TransferObserved { transfer: Transfer },

    /// A transfer moved forward in its lifecycle.
    TransferAdvanced {
        transfer_id: TransferId,
        from: TransferState,
        to: TransferState,
    },

    /// A transfer will never be bonded by this node.
    TransferUnbondable {
        transfer_id: TransferId,
        reason: String,
    },

    // =========================================================================
    // BUNDLES
    // =========================================================================
    BundleCommitted { bundle: Bundle },

    BundleSettled {
        bundle_id: BundleId,
        members: Vec<TransferId>,
    },

    // =========================================================================
    // MESSAGES
    // =========================================================================
    MessageObserved { message: CctpMessage },

    MessageRelayed {
        message_hash: MessageHash,
        tx_hash: Option<TxHash>,
    },

    // =========================================================================
    // RETRACTIONS
    // =========================================================================
    /// An event was removed by a reorg rollback.
    Retracted { key: EventKey, kind: EventKind },

    /// State was re-derived from the event log; cached views are stale.
    StateRebuilt,
}

impl StoreTransition {
    pub fn topic(&self) -> TransitionTopic {
        match self {
            StoreTransition::TransferObserved { .. }
            | StoreTransition::TransferAdvanced { .. }
            | StoreTransition::TransferUnbondable { .. } => TransitionTopic::Transfers,
            StoreTransition::BundleCommitted { .. } | StoreTransition::BundleSettled { .. } => {
                TransitionTopic::Bundles
            }
            StoreTransition::MessageObserved { .. } | StoreTransition::MessageRelayed { .. } => {
                TransitionTopic::Messages
            }
            StoreTransition::Retracted { .. } | StoreTransition::StateRebuilt => {
                TransitionTopic::Retractions
            }
        }
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            StoreTransition::TransferObserved { .. } => "transfer_observed",
            StoreTransition::TransferAdvanced { .. } => "transfer_advanced",
            StoreTransition::TransferUnbondable { .. } => "transfer_unbondable",
            StoreTransition::BundleCommitted { .. } => "bundle_committed",
            StoreTransition::BundleSettled { .. } => "bundle_settled",
            StoreTransition::MessageObserved { .. } => "message_observed",
            StoreTransition::MessageRelayed { .. } => "message_relayed",
            StoreTransition::Retracted { .. } => "retracted",
            StoreTransition::StateRebuilt => "state_rebuilt",
        }
    }
}
