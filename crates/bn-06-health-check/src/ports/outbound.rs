//! # Outbound Ports (Driven Ports)
//!
//! Everything the monitor reads. None of these ports mutate state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared_types::{
    Address, Amount, Bundle, BundleId, CctpMessage, ChainId, ChainReadError, ChainWatermark,
    RouteKey, TransferId, TransferRecord,
};

use crate::domain::errors::HealthError;
use crate::domain::report::HealthCheckReport;

/// A store gap that outlived its timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapSummary {
    pub gap: String,
    pub buffered_since: u64,
    pub escalated_at: u64,
    pub events: usize,
}

/// A bundle whose members did not all bond before its deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncompleteSummary {
    pub bundle_id: BundleId,
    pub route: RouteKey,
    pub missing: usize,
    pub deadline: u64,
}

/// Read-only view of the transfer state store.
pub trait HealthLedger: Send + Sync {
    fn transfer(&self, transfer_id: &TransferId) -> Option<TransferRecord>;

    /// Transfers sent at or after `since`.
    fn transfers_since(&self, since: u64) -> Vec<TransferRecord>;

    /// Bundles committed at or after `since`.
    fn bundles_since(&self, since: u64) -> Vec<Bundle>;

    /// Messages observed at or after `since`.
    fn messages_since(&self, since: u64) -> Vec<CctpMessage>;

    fn watermarks(&self) -> Vec<ChainWatermark>;

    fn unresolvable_gaps(&self) -> Vec<GapSummary>;
}

#[async_trait]
pub trait ChainStatus: Send + Sync {
    async fn head(&self, chain: ChainId) -> Result<u64, ChainReadError>;

    async fn native_balance(&self, chain: ChainId, address: Address)
        -> Result<Amount, ChainReadError>;
}

/// Bonder credit net of outstanding bonds, per route.
#[async_trait]
pub trait LiquidityView: Send + Sync {
    async fn available(&self, route: &RouteKey) -> Result<Amount, ChainReadError>;
}

pub trait SettlementView: Send + Sync {
    fn incomplete_settlements(&self) -> Vec<IncompleteSummary>;
}

/// Where finished reports go.
#[async_trait]
pub trait ReportSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn publish(&self, report: &HealthCheckReport) -> Result<(), HealthError>;
}
