//! # Inbound Ports (Driving Ports)

use async_trait::async_trait;
use shared_types::{ChainWatermark, WatermarkKey};

use crate::domain::entities::PollOutcome;
use crate::domain::errors::WatcherError;

/// Control surface of one watcher.
#[async_trait]
pub trait ChainWatcherApi: Send {
    fn key(&self) -> WatermarkKey;

    /// Bind the log filter and load the persisted watermark, falling back to
    /// the configured start block.
    async fn init(&mut self) -> Result<ChainWatermark, WatcherError>;

    /// Run one poll cycle.
    ///
    /// ## Errors
    ///
    /// - `NotInitialized`: `init` has not completed
    /// - `TruncatedLogs` / `MalformedLog`: retries exhausted, watermark unchanged
    async fn poll_once(&mut self) -> Result<PollOutcome, WatcherError>;

    /// Last committed watermark, once initialized.
    fn current_watermark(&self) -> Option<ChainWatermark>;
}
