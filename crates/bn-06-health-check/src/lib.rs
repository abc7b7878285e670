//! # Health Check Monitor (bn-06)
//!
//! Periodic, read-only audit of the bonder. Each cycle looks back over a
//! configurable window and reports transfers left unbonded, bundles left
//! unsettled, CCTP messages left unrelayed, low balances and liquidity,
//! lagging watchers, incomplete settlements and unresolvable store gaps.
//!
//! ```text
//!  HealthLedger ─┐
//!  ChainStatus ──┤                       ┌─► LogReportSink
//!  LiquidityView ┼─► HealthCheckMonitor ─┼─► FileReportSink (JSON cache)
//!  SettlementView┘   (interval, window)  └─► latest() → /health
//! ```
//!
//! Checks never write. A check that cannot read its data is unhealthy
//! and names the failure in its items.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

#[cfg(test)]
mod test_utils;

pub use adapters::{read_cached, FileReportSink, LogReportSink};
pub use domain::{
    AuditWindow, BalanceFloor, CheckItem, CheckName, CheckResult, HealthCheckReport, HealthConfig,
    HealthError, LagLimit, LiquidityFloor,
};
pub use ports::inbound::HealthCheckApi;
pub use ports::outbound::{
    ChainStatus, GapSummary, HealthLedger, IncompleteSummary, LiquidityView, ReportSink,
    SettlementView,
};
pub use service::{HealthCheckMonitor, HealthPorts};
