//! # Inbound Ports (Driving Ports)

use async_trait::async_trait;
use shared_types::{Amount, Bundle, BundleId, TransferId, TxHash};

use crate::domain::errors::SettlementError;
use crate::domain::reconciliation::{IncompleteSettlement, ReconcileStatus};

#[async_trait]
pub trait SettlementApi: Send + Sync {
    /// Start tracking a committed bundle.
    fn on_bundle_committed(&self, bundle: &Bundle) -> ReconcileStatus;

    /// A member bonded or was marked unbondable.
    fn on_transfer_accounted(&self, transfer_id: &TransferId);

    /// Release liquidity of bonded members and keep unbonded ones pending.
    fn on_bundle_settled(&self, bundle_id: &BundleId) -> Result<ReconcileStatus, SettlementError>;

    /// A transfer reached `Settled`, possibly after its bundle did.
    fn on_transfer_settled(&self, transfer_id: &TransferId) -> Option<Amount>;

    /// Escalate pending reconciliations past their deadline.
    fn tick(&self, now: u64) -> Vec<IncompleteSettlement>;

    fn incomplete_settlements(&self) -> Vec<IncompleteSettlement>;

    /// Submit `settleBondedWithdrawals` for a reconciled bundle.
    async fn settle_bundle(&self, bundle_id: BundleId) -> Result<TxHash, SettlementError>;
}
