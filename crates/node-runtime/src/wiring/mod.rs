//! # Runtime Wiring
//!
//! Spawns every subsystem loop onto one [`JoinSet`] and stops them together.
//!
//! ```text
//!  watchers ──► StoreBridge ──► TransferStateStore ──► TransitionBus
//!                                                          │
//!           ┌──────────────────┬──────────────────┬────────┘
//!           ▼                  ▼                  ▼
//!     Transfers topic    Transfers/Bundles/   Messages topic
//!     bonding engine     Retractions topics   attestation relay
//!                        settlement
//! ```
//!
//! The health monitor, the gap sweeper and the status server read the store
//! directly on their own timers.
//!
//! ## Shutdown
//!
//! One `watch` channel. Every loop finishes its current unit of work before
//! returning, so [`NodeRuntime::shutdown`] only returns once nothing is in
//! flight.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use bn_01_chain_watcher::{ChainEventWatcher, ChainWatcherApi};
use bn_02_transfer_store::{TransferStateApi, TransferStateStore};
use bn_04_settlement::SettlementFeeds;
use shared_bus::TransitionTopic;
use shared_types::TimeSource;

use crate::adapters::{status, EvmChainSource};
use crate::container::NodeContainer;

/// How often buffered events are checked against the gap timeout.
pub const GAP_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct NodeRuntime {
    shutdown: watch::Sender<bool>,
    tasks: JoinSet<()>,
    status_addr: Option<SocketAddr>,
}

impl NodeRuntime {
    /// Initialize the watchers, then spawn every enabled loop.
    ///
    /// Fails without spawning anything if a watcher cannot load its
    /// watermark or the status listener cannot bind.
    pub async fn start(container: NodeContainer, status_port: u16) -> Result<Self> {
        let (shutdown, rx) = watch::channel(false);
        let mut tasks = JoinSet::new();
        let config = &container.config;

        // Watchers first: a bad watermark must stop startup.
        let mut watchers = Vec::with_capacity(config.watchers.len());
        for watcher_config in &config.watchers {
            let key = watcher_config.watermark_key();
            let rpc = container
                .rpcs
                .get(&watcher_config.chain_id)
                .cloned()
                .with_context(|| format!("watcher {key}: chain not configured"))?;
            let mut watcher = ChainEventWatcher::new(
                watcher_config.clone(),
                Arc::new(EvmChainSource::new(watcher_config.chain_id, rpc)),
                container.bridge.clone(),
                container.retry,
            );
            watcher
                .init()
                .await
                .with_context(|| format!("watcher {key}"))?;
            watchers.push(watcher);
        }

        let listener = if config.status.enabled {
            let addr = SocketAddr::new(config.status.bind, status_port);
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("bind status server on {addr}"))?;
            Some(listener)
        } else {
            None
        };
        let status_addr = listener.as_ref().and_then(|l| l.local_addr().ok());

        for watcher in watchers {
            let rx = rx.clone();
            tasks.spawn(async move {
                let key = watcher.key();
                if let Err(e) = watcher.start(rx).await {
                    error!(watcher = %key, error = %e, "[runtime] Watcher exited");
                }
            });
        }

        if let Some(engine) = &container.bonding {
            let transfers = container.bus.subscribe(TransitionTopic::Transfers);
            tasks.spawn(engine.clone().run(transfers, rx.clone()));
        }

        let feeds = SettlementFeeds {
            transfers: container.bus.subscribe(TransitionTopic::Transfers),
            bundles: container.bus.subscribe(TransitionTopic::Bundles),
            retractions: container.bus.subscribe(TransitionTopic::Retractions),
        };
        tasks.spawn(container.settlement.clone().run(feeds, rx.clone()));

        if let Some(relay) = &container.relay {
            let messages = container.bus.subscribe(TransitionTopic::Messages);
            tasks.spawn(relay.clone().run(messages, rx.clone()));
        }

        if config.health.enabled {
            tasks.spawn(container.health.clone().run(rx.clone()));
        }

        tasks.spawn(sweep_gaps(
            container.store.clone(),
            container.time.clone(),
            GAP_SWEEP_INTERVAL,
            rx.clone(),
        ));

        if let Some(listener) = listener {
            let state = container.status_state();
            let rx = rx.clone();
            tasks.spawn(async move {
                if let Err(e) = status::serve(listener, state, rx).await {
                    error!(error = %e, "[runtime] Status server failed");
                }
            });
        }

        info!(
            tasks = tasks.len(),
            watchers = config.watchers.len(),
            bonding = container.bonding.is_some(),
            relay = container.relay.is_some(),
            health = config.health.enabled,
            status = ?status_addr,
            "[runtime] Bonder node running"
        );

        Ok(Self {
            shutdown,
            tasks,
            status_addr,
        })
    }

    pub fn status_addr(&self) -> Option<SocketAddr> {
        self.status_addr
    }

    /// Number of loops still running.
    pub fn running(&self) -> usize {
        self.tasks.len()
    }

    /// Signal every loop and wait for all of them to return.
    pub async fn shutdown(mut self) {
        info!(tasks = self.tasks.len(), "[runtime] Shutting down");
        let _ = self.shutdown.send(true);
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "[runtime] Task ended abnormally");
            }
        }
        info!("[runtime] All tasks stopped");
    }
}

/// Escalate buffered events whose gap has outlived the timeout.
pub async fn sweep_gaps(
    store: Arc<TransferStateStore>,
    time: Arc<dyn TimeSource>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                match store.sweep_gaps(time.now()) {
                    Ok(escalated) => {
                        for gap in escalated {
                            error!(
                                gap = %gap.gap,
                                events = gap.events,
                                buffered_since = gap.buffered_since,
                                "[runtime] Unresolvable gap"
                            );
                        }
                    }
                    Err(e) => warn!(error = %e, "[runtime] Gap sweep failed"),
                }
            }
        }
    }
}
