use shared_types::{ChainId, ChainReadError, Classified, ErrorClass};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HealthError {
    #[error("invalid health check configuration: {0}")]
    InvalidConfiguration(String),

    #[error("chain {chain}: {source}")]
    ChainRead {
        chain: ChainId,
        #[source]
        source: ChainReadError,
    },

    #[error("report sink {sink}: {message}")]
    Sink { sink: &'static str, message: String },
}

impl Classified for HealthError {
    fn class(&self) -> ErrorClass {
        match self {
            HealthError::InvalidConfiguration(_) => ErrorClass::InvalidConfiguration,
            HealthError::ChainRead { source, .. } => source.class(),
            HealthError::Sink { .. } => ErrorClass::TransientIO,
        }
    }
}
