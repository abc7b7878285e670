pub mod config;
pub mod errors;
pub mod reconciliation;

pub use config::{SettleBridge, SettlementConfig};
pub use errors::SettlementError;
pub use reconciliation::{
    BundlePhase, IncompleteSettlement, MemberProgress, Reconciliation, ReconciliationBook,
    ReconcileStatus,
};
