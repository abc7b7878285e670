//! # Outbound Ports (Driven Ports)
//!
//! What a watcher needs from the outside: a chain to read and a sink to
//! commit validated events into.

use async_trait::async_trait;
use shared_types::{ChainEvent, ChainWatermark, EventKey, WatermarkKey};
use tokio::sync::broadcast;

use crate::domain::entities::{BlockHeader, LogBatch, LogFilter};
use crate::domain::errors::{DataSourceError, SinkError};

/// Read access to one chain.
#[async_trait]
pub trait ChainDataSource: Send + Sync {
    /// Latest block number.
    async fn head(&self) -> Result<u64, DataSourceError>;

    async fn get_block(&self, number: u64) -> Result<BlockHeader, DataSourceError>;

    /// Logs matching `filter` in `[from, to]`.
    ///
    /// Providers may answer for a shorter range; `covered_to` says how far.
    async fn get_logs(
        &self,
        from: u64,
        to: u64,
        filter: &LogFilter,
    ) -> Result<LogBatch, DataSourceError>;

    /// New-head notifications, if the source supports push.
    fn subscribe(&self, _filter: &LogFilter) -> Option<broadcast::Receiver<u64>> {
        None
    }
}

/// Durable destination of watcher output.
pub trait EventSink: Send + Sync {
    fn watermark(&self, key: &WatermarkKey) -> Option<ChainWatermark>;

    /// Persist `events` and `watermark` atomically.
    fn commit(&self, watermark: ChainWatermark, events: Vec<ChainEvent>) -> Result<(), SinkError>;

    /// Retract this watcher's events above `watermark.block_number` and
    /// rewrite the watermark. Returns each newly retracted key once.
    fn rollback(&self, watermark: ChainWatermark) -> Result<Vec<EventKey>, SinkError>;
}
