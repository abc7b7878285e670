use shared_types::{Classified, ErrorClass, EventKey};
use thiserror::Error;

/// Failures reported by a [`ChainDataSource`](crate::ports::outbound::ChainDataSource).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataSourceError {
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("block {0} not found")]
    BlockNotFound(u64),

    #[error("provider rate limited the request")]
    RateLimited,
}

impl Classified for DataSourceError {
    fn class(&self) -> ErrorClass {
        ErrorClass::TransientIO
    }
}

/// Failures reported by an [`EventSink`](crate::ports::outbound::EventSink).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} ({class})")]
pub struct SinkError {
    pub class: ErrorClass,
    pub message: String,
}

impl SinkError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatcherError {
    #[error("watcher not initialized")]
    NotInitialized,

    #[error("invalid watcher configuration: {0}")]
    InvalidConfiguration(String),

    #[error("data source: {0}")]
    DataSource(#[from] DataSourceError),

    /// The provider answered for fewer blocks than asked.
    #[error("truncated log batch: requested up to {requested_to}, covered up to {covered_to}")]
    TruncatedLogs { requested_to: u64, covered_to: u64 },

    #[error("malformed log {key}: {reason}")]
    MalformedLog { key: EventKey, reason: String },

    #[error("event sink: {0}")]
    Sink(#[from] SinkError),
}

impl Classified for WatcherError {
    fn class(&self) -> ErrorClass {
        match self {
            WatcherError::NotInitialized | WatcherError::InvalidConfiguration(_) => {
                ErrorClass::InvalidConfiguration
            }
            WatcherError::DataSource(_)
            | WatcherError::TruncatedLogs { .. }
            | WatcherError::MalformedLog { .. } => ErrorClass::TransientIO,
            WatcherError::Sink(e) => e.class,
        }
    }
}
