//! # Chain Event Watcher Service
//!
//! One instance per `(chain, event kind)`. Each poll:
//!
//! 1. reads the head and derives the confirmed head;
//! 2. re-checks recorded block hashes and rolls back on a reorg;
//! 3. fetches, validates and commits the next block range.
//!
//! The watermark only moves after the sink has durably committed the range.

use bonder_telemetry::metrics::{
    SUBSYSTEM_ERRORS, WATCHER_EVENTS, WATCHER_POLLS, WATCHER_REORGS, WATCHER_WATERMARK,
};
use shared_resilience::RetryExecutor;
use shared_types::{BlockHash, ChainEvent, ChainWatermark, Classified, ErrorClass, WatermarkKey};
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::domain::config::WatcherConfig;
use crate::domain::decode::{decode_log, Decoded};
use crate::domain::entities::{BlockHeader, LogFilter, PollOutcome};
use crate::domain::errors::{DataSourceError, WatcherError};
use crate::domain::window::BlockWindow;
use crate::ports::inbound::ChainWatcherApi;
use crate::ports::outbound::{ChainDataSource, EventSink};

/// A validated block range ready to commit.
struct FetchedRange {
    end: BlockHeader,
    events: Vec<ChainEvent>,
    log_blocks: Vec<(u64, BlockHash)>,
    rejected: usize,
}

pub struct ChainEventWatcher {
    config: WatcherConfig,
    source: Arc<dyn ChainDataSource>,
    sink: Arc<dyn EventSink>,
    retry: RetryExecutor,
    filter: Option<LogFilter>,
    watermark: Option<ChainWatermark>,
    window: BlockWindow,
    chain_label: String,
}

impl ChainEventWatcher {
    pub fn new(
        config: WatcherConfig,
        source: Arc<dyn ChainDataSource>,
        sink: Arc<dyn EventSink>,
        retry: RetryExecutor,
    ) -> Self {
        let window = BlockWindow::new(config.window_size);
        let chain_label = config.chain_id.to_string();
        Self {
            config,
            source,
            sink,
            retry,
            filter: None,
            watermark: None,
            window,
            chain_label,
        }
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    pub fn window(&self) -> &BlockWindow {
        &self.window
    }

    fn labels(&self) -> [&str; 2] {
        [self.chain_label.as_str(), self.config.kind.name()]
    }

    // =========================================================================
    // DATA SOURCE ACCESS
    // =========================================================================

    async fn fetch_head(&self) -> Result<u64, WatcherError> {
        let source = &self.source;
        let head = self
            .retry
            .run_while("head", || source.head(), DataSourceError::is_retryable)
            .await?;
        Ok(head)
    }

    async fn fetch_block(&self, number: u64) -> Result<BlockHeader, WatcherError> {
        let source = &self.source;
        let header = self
            .retry
            .run_while(
                "get_block",
                || source.get_block(number),
                DataSourceError::is_retryable,
            )
            .await?;
        Ok(header)
    }

    /// One attempt at `[from, to]`: logs, the end block and validation.
    async fn fetch_range(
        &self,
        from: u64,
        to: u64,
        filter: &LogFilter,
    ) -> Result<FetchedRange, WatcherError> {
        let batch = self.source.get_logs(from, to, filter).await?;
        if batch.covered_to < to {
            return Err(WatcherError::TruncatedLogs {
                requested_to: to,
                covered_to: batch.covered_to,
            });
        }
        let end = self.source.get_block(to).await?;

        let mut logs = batch.logs;
        logs.sort_by_key(|l| (l.block_number, l.log_index));

        let mut events = Vec::with_capacity(logs.len());
        let mut log_blocks: Vec<(u64, BlockHash)> = Vec::new();
        let mut rejected = 0;
        for log in &logs {
            if log.block_number < from || log.block_number > to {
                return Err(WatcherError::MalformedLog {
                    key: log.key(),
                    reason: format!("block {} outside [{}, {}]", log.block_number, from, to),
                });
            }
            if log.block_number == to && log.block_hash != end.hash {
                return Err(WatcherError::DataSource(DataSourceError::Rpc(format!(
                    "block {} changed while fetching",
                    to
                ))));
            }
            if log_blocks.last() != Some(&(log.block_number, log.block_hash)) {
                log_blocks.push((log.block_number, log.block_hash));
            }

            match decode_log(&self.config, log, end.timestamp)? {
                Decoded::Event(event) => events.push(event),
                Decoded::Rejected { key, reason } => {
                    warn!(
                        chain = %self.config.chain_id,
                        kind = %self.config.kind,
                        %key,
                        reason = %reason,
                        "[bn-01] Dropping invalid log"
                    );
                    SUBSYSTEM_ERRORS
                        .with_label_values(&["bn-01", ErrorClass::InvalidInput.name()])
                        .inc();
                    rejected += 1;
                }
            }
        }

        Ok(FetchedRange {
            end,
            events,
            log_blocks,
            rejected,
        })
    }

    // =========================================================================
    // REORG HANDLING
    // =========================================================================

    /// Lowest recorded height whose hash is no longer canonical, plus the
    /// highest recorded height below it that still matched.
    async fn detect_reorg(&self, head: u64) -> Result<Option<(u64, Option<u64>)>, WatcherError> {
        let Some((top, top_hash)) = self.window.highest() else {
            return Ok(None);
        };
        // A matching top block commits to everything below it.
        if top <= head && self.fetch_block(top).await?.hash == top_hash {
            return Ok(None);
        }

        let recorded: Vec<(u64, BlockHash)> = self.window.entries().collect();
        let mut last_match = None;
        for (height, hash) in recorded {
            let matches = height <= head && self.fetch_block(height).await?.hash == hash;
            if !matches {
                return Ok(Some((height, last_match)));
            }
            last_match = Some(height);
        }
        Ok(Some((top, last_match)))
    }

    async fn roll_back(
        &mut self,
        detected_at: u64,
        last_match: Option<u64>,
        head: u64,
        current: ChainWatermark,
    ) -> Result<PollOutcome, WatcherError> {
        let depth = self.config.reorg_safety_depth;
        let mut target = detected_at
            .saturating_sub(depth)
            .min(head.saturating_sub(depth))
            .min(current.block_number);
        if let Some(matched) = last_match {
            target = target.min(matched);
        }

        let header = self.fetch_block(target).await?;
        let watermark = ChainWatermark {
            key: current.key,
            block_number: target,
            block_hash: header.hash,
        };
        let retracted = self.sink.rollback(watermark)?;

        self.window.truncate_above(target);
        self.window.record(target, header.hash);
        self.watermark = Some(watermark);

        warn!(
            chain = %self.config.chain_id,
            kind = %self.config.kind,
            detected_at,
            rolled_back_to = target,
            head,
            retracted = retracted.len(),
            "[bn-01] Reorg detected, watermark rolled back"
        );
        WATCHER_REORGS.with_label_values(&[self.chain_label.as_str()]).inc();
        WATCHER_WATERMARK
            .with_label_values(&self.labels())
            .set(target as f64);

        Ok(PollOutcome::Reorg {
            detected_at,
            rolled_back_to: target,
            retracted: retracted.len(),
        })
    }

    // =========================================================================
    // RUN LOOP
    // =========================================================================

    /// Poll until `shutdown` flips to `true`.
    ///
    /// A poll in progress always completes. New heads from the data source
    /// wake the loop early; otherwise it sleeps `poll_interval_ms`.
    pub async fn start(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), WatcherError> {
        let filter = self.filter.ok_or(WatcherError::NotInitialized)?;
        let mut heads = self.source.subscribe(&filter);
        let interval = Duration::from_millis(self.config.poll_interval_ms);

        info!(
            chain = %self.config.chain_id,
            kind = %self.config.kind,
            contract = %self.config.contract,
            push = heads.is_some(),
            "[bn-01] Watcher started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let backlog = match self.poll_once().await {
                Ok(PollOutcome::Advanced { caught_up, .. }) => !caught_up,
                Ok(PollOutcome::Reorg { .. }) => true,
                Ok(PollOutcome::Idle { .. }) => false,
                Err(e) if e.class().is_fatal() => {
                    error!(chain = %self.config.chain_id, kind = %self.config.kind, error = %e, "[bn-01] Watcher stopping");
                    return Err(e);
                }
                Err(e) => {
                    warn!(chain = %self.config.chain_id, kind = %self.config.kind, error = %e, "[bn-01] Poll failed");
                    false
                }
            };
            if backlog {
                continue;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(interval) => {}
                _ = next_head(&mut heads) => {}
            }
        }

        info!(chain = %self.config.chain_id, kind = %self.config.kind, "[bn-01] Watcher stopped");
        Ok(())
    }
}

async fn next_head(heads: &mut Option<broadcast::Receiver<u64>>) {
    let Some(rx) = heads.as_mut() else {
        return pending().await;
    };
    if let Err(broadcast::error::RecvError::Closed) = rx.recv().await {
        *heads = None;
        pending::<()>().await;
    }
}

#[async_trait::async_trait]
impl ChainWatcherApi for ChainEventWatcher {
    fn key(&self) -> WatermarkKey {
        self.config.watermark_key()
    }

    async fn init(&mut self) -> Result<ChainWatermark, WatcherError> {
        self.config.validate()?;
        let key = self.config.watermark_key();

        let watermark = match self.sink.watermark(&key) {
            Some(persisted) => {
                info!(
                    chain = %key.chain_id,
                    kind = %key.kind,
                    block = persisted.block_number,
                    "[bn-01] Resuming from persisted watermark"
                );
                persisted
            }
            None => {
                let block = self.config.start_block.saturating_sub(1);
                info!(chain = %key.chain_id, kind = %key.kind, start_block = self.config.start_block, "[bn-01] No watermark, starting from configured block");
                ChainWatermark {
                    key,
                    block_number: block,
                    block_hash: BlockHash::ZERO,
                }
            }
        };

        self.window.clear();
        if !watermark.block_hash.is_zero() {
            self.window.record(watermark.block_number, watermark.block_hash);
        }
        self.filter = Some(LogFilter {
            chain_id: self.config.chain_id,
            address: self.config.contract,
            kind: self.config.kind,
        });
        self.watermark = Some(watermark);
        WATCHER_WATERMARK
            .with_label_values(&self.labels())
            .set(watermark.block_number as f64);
        Ok(watermark)
    }

    async fn poll_once(&mut self) -> Result<PollOutcome, WatcherError> {
        let (Some(current), Some(filter)) = (self.watermark, self.filter) else {
            return Err(WatcherError::NotInitialized);
        };

        let result = self.poll_inner(current, filter).await;
        let outcome = match &result {
            Ok(PollOutcome::Idle { .. }) => "idle",
            Ok(PollOutcome::Advanced { .. }) => "ok",
            Ok(PollOutcome::Reorg { .. }) => "reorg",
            Err(e) => {
                SUBSYSTEM_ERRORS
                    .with_label_values(&["bn-01", e.class().name()])
                    .inc();
                "error"
            }
        };
        WATCHER_POLLS
            .with_label_values(&[self.chain_label.as_str(), self.config.kind.name(), outcome])
            .inc();
        result
    }

    fn current_watermark(&self) -> Option<ChainWatermark> {
        self.watermark
    }
}

impl ChainEventWatcher {
    async fn poll_inner(
        &mut self,
        current: ChainWatermark,
        filter: LogFilter,
    ) -> Result<PollOutcome, WatcherError> {
        let head = self.fetch_head().await?;

        if let Some((detected_at, last_match)) = self.detect_reorg(head).await? {
            return self.roll_back(detected_at, last_match, head, current).await;
        }

        let safe_head = head.saturating_sub(self.config.confirmations);
        let from = current.block_number.saturating_add(1);
        if from > safe_head {
            debug!(chain = %self.config.chain_id, kind = %self.config.kind, head, watermark = current.block_number, "[bn-01] Nothing confirmed yet");
            return Ok(PollOutcome::Idle {
                head,
                watermark: current.block_number,
            });
        }
        let to = current
            .block_number
            .saturating_add(self.config.batch_size)
            .min(safe_head);

        let fetched = {
            let this = &*self;
            this.retry
                .run_while(
                    "get_logs",
                    || this.fetch_range(from, to, &filter),
                    WatcherError::is_retryable,
                )
                .await?
        };

        let watermark = ChainWatermark {
            key: current.key,
            block_number: to,
            block_hash: fetched.end.hash,
        };
        let count = fetched.events.len();
        self.sink.commit(watermark, fetched.events)?;

        for (number, hash) in fetched.log_blocks {
            self.window.record(number, hash);
        }
        self.window.record(to, fetched.end.hash);
        self.watermark = Some(watermark);

        WATCHER_EVENTS
            .with_label_values(&self.labels())
            .inc_by(count as f64);
        WATCHER_WATERMARK
            .with_label_values(&self.labels())
            .set(to as f64);
        if count > 0 || fetched.rejected > 0 {
            info!(
                chain = %self.config.chain_id,
                kind = %self.config.kind,
                from,
                to,
                events = count,
                rejected = fetched.rejected,
                "[bn-01] Committed block range"
            );
        }

        Ok(PollOutcome::Advanced {
            from,
            to,
            events: count,
            caught_up: to >= safe_head,
        })
    }
}
