pub mod checks;
pub mod config;
pub mod errors;
pub mod report;

pub use checks::AuditWindow;
pub use config::{BalanceFloor, HealthConfig, LagLimit, LiquidityFloor};
pub use errors::HealthError;
pub use report::{CheckItem, CheckName, CheckResult, HealthCheckReport};
