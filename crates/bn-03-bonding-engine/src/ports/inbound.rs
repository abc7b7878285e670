//! # Inbound Ports (Driving Ports)

use async_trait::async_trait;
use shared_types::{Amount, RouteKey, Transfer};

use crate::domain::decision::BondDecision;
use crate::domain::errors::BondingError;

#[async_trait]
pub trait BondingApi: Send + Sync {
    /// Evaluate a `Sent` transfer and bond it when every check passes.
    ///
    /// Skips and deferrals are `Ok`. An `Err` means the check could not be
    /// completed or the bond was not confirmed; any reservation is released
    /// and the transfer is evaluated again on the next rescan.
    async fn on_transfer_sent(&self, transfer: Transfer) -> Result<BondDecision, BondingError>;

    /// Reserved plus bonded-but-unsettled amount on a route.
    fn outstanding(&self, route: &RouteKey) -> Amount;

    /// Rebuild bonded liquidity from the ledger. Returns how many bonds were
    /// restored.
    fn restore_liquidity(&self) -> usize;
}
