//! # Inbound Ports (Driving Ports)

use async_trait::async_trait;

use crate::domain::report::HealthCheckReport;

#[async_trait]
pub trait HealthCheckApi: Send + Sync {
    /// Run every enabled check once and hand the report to the sinks.
    async fn run_checks(&self) -> HealthCheckReport;

    /// Most recent report, if a cycle has completed.
    fn latest(&self) -> Option<HealthCheckReport>;
}
