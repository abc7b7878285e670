pub mod config;
pub mod decode;
pub mod entities;
pub mod errors;
pub mod window;

pub use config::WatcherConfig;
pub use decode::{decode_log, Decoded};
pub use entities::{BlockHeader, LogBatch, LogFilter, PollOutcome, RawLog};
pub use errors::{DataSourceError, SinkError, WatcherError};
pub use window::BlockWindow;
