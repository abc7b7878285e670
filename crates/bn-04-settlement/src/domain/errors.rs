use shared_types::{BundleId, Classified, ErrorClass, RouteKey, SubmitError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettlementError {
    #[error("invalid settlement configuration: {0}")]
    InvalidConfiguration(String),

    #[error("no settlement bridge configured for {0}")]
    NoBridge(RouteKey),

    #[error("bundle {0} is not known to the ledger")]
    UnknownBundle(BundleId),

    #[error("settlement of bundle {bundle_id} failed: {source}")]
    Submission {
        bundle_id: BundleId,
        #[source]
        source: SubmitError,
    },
}

impl Classified for SettlementError {
    fn class(&self) -> ErrorClass {
        match self {
            SettlementError::InvalidConfiguration(_) | SettlementError::NoBridge(_) => {
                ErrorClass::InvalidConfiguration
            }
            SettlementError::UnknownBundle(_) => ErrorClass::OutOfOrderEvent,
            SettlementError::Submission { source, .. } => source.class(),
        }
    }
}
