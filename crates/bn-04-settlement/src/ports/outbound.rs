//! # Outbound Ports (Driven Ports)

use shared_types::{Amount, Bundle, BundleId, TransferId, TransferRecord};

/// Read access to transfers and bundles as persisted by the state store.
pub trait SettlementLedger: Send + Sync {
    fn transfer(&self, transfer_id: &TransferId) -> Option<TransferRecord>;

    fn bundle(&self, bundle_id: &BundleId) -> Option<Bundle>;

    /// Bundles not settled yet, plus settled bundles with a member that has
    /// not reached `Settled`.
    fn open_bundles(&self) -> Vec<Bundle>;
}

/// Returns bonded liquidity to the available pool.
pub trait LiquidityReleaser: Send + Sync {
    /// Release the bond of a settled transfer. `Some(amount)` the first
    /// time only; `None` when nothing was held for it.
    fn release(&self, transfer_id: &TransferId) -> Option<Amount>;
}
