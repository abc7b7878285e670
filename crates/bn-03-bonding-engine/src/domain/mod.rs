pub mod config;
pub mod decision;
pub mod errors;
pub mod liquidity;

pub use config::{BondingConfig, RouteConfig};
pub use decision::{BondDecision, DeferReason, SkipReason};
pub use errors::{BondingError, LedgerError};
pub use liquidity::{InsufficientLiquidity, LiquidityTracker, ReserveRequest, RouteLiquidity};
