//! # Node Container
//!
//! Builds and holds every subsystem instance.
//!
//! ## Build Order
//!
//! ```text
//! 1. Ledger:     key-value backend, transition bus, transfer state store
//! 2. Chains:     one JSON-RPC client per enabled chain, reads, signer
//! 3. Subsystems: bonding, settlement, relay, health
//! ```
//!
//! Subsystems never call each other. Everything they share goes through
//! the store and the transition bus it publishes on.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use bn_02_transfer_store::{InMemoryKVStore, KeyValueStore, TransferStateStore};
use bn_03_bonding_engine::{BondingDecisionEngine, BondingPorts, LiquidityTracker};
use bn_04_settlement::{SettlementCoordinator, SettlementPorts};
use bn_05_attestation_relay::{AttestationRelayer, IrisClient, RelayPorts};
use bn_06_health_check::{FileReportSink, HealthCheckMonitor, HealthPorts, LogReportSink, ReportSink};
use shared_bus::TransitionBus;
use shared_resilience::{RateLimiter, RetryExecutor};
use shared_types::{ChainId, SystemTimeSource, TimeSource, TransactionSubmitter};

use crate::adapters::{
    CoordinatorView, EvmChainReader, JsonRpcClient, SignerSubmitter, StatusState, StoreBridge,
    TrackerLiquidity, TrackerReleaser,
};
use crate::container::config::{BonderConfig, StorageConfig};

/// Everything the runtime spawns, already wired.
pub struct NodeContainer {
    pub config: BonderConfig,
    pub time: Arc<dyn TimeSource>,
    pub retry: RetryExecutor,

    // =========================================================================
    // LEDGER
    // =========================================================================
    pub bus: Arc<TransitionBus>,
    pub store: Arc<TransferStateStore>,
    pub bridge: Arc<StoreBridge>,

    // =========================================================================
    // CHAINS
    // =========================================================================
    pub rpcs: HashMap<ChainId, JsonRpcClient>,
    pub reader: Arc<EvmChainReader>,

    // =========================================================================
    // SUBSYSTEMS
    // =========================================================================
    /// Absent when bonding is disabled.
    pub bonding: Option<Arc<BondingDecisionEngine>>,
    pub settlement: Arc<SettlementCoordinator>,
    /// Absent when the CCTP relay is disabled.
    pub relay: Option<Arc<AttestationRelayer>>,
    /// Always built so `/health` can answer; only polled when enabled.
    pub health: Arc<HealthCheckMonitor>,
    pub limiter: Arc<RateLimiter>,
}

impl NodeContainer {
    /// Build against real chains and the configured ledger backend.
    #[instrument(name = "container_build", skip(config))]
    pub fn build(config: BonderConfig) -> Result<Self> {
        let kv = open_backend(&config.storage)?;
        let rpcs = rpc_clients(&config)?;
        let signer = JsonRpcClient::new(
            config.signer.url.clone(),
            Duration::from_secs(config.signer.receipt_timeout_secs.max(1)),
        )
        .context("signer client")?;
        let submitter: Arc<dyn TransactionSubmitter> = Arc::new(SignerSubmitter::new(
            signer,
            config.bonder,
            rpcs.clone(),
            &config.signer,
        ));
        Self::assemble(config, kv, rpcs, submitter, Arc::new(SystemTimeSource))
    }

    /// Wire the subsystems around an existing backend and submitter.
    pub fn assemble(
        config: BonderConfig,
        kv: Box<dyn KeyValueStore>,
        rpcs: HashMap<ChainId, JsonRpcClient>,
        submitter: Arc<dyn TransactionSubmitter>,
        time: Arc<dyn TimeSource>,
    ) -> Result<Self> {
        let retry = RetryExecutor::new(config.retry);

        // =====================================================================
        // PHASE 1: Ledger
        // =====================================================================
        let bus = Arc::new(TransitionBus::new());
        let store = Arc::new(
            TransferStateStore::open(kv, bus.clone(), time.clone(), config.storage.store.clone())
                .context("open transfer state store")?,
        );
        let bridge = Arc::new(StoreBridge::new(store.clone(), config.bonder));
        info!(gap_timeout_secs = config.storage.store.gap_timeout_secs, "[runtime] Transfer state store opened");

        // =====================================================================
        // PHASE 2: Chain reads
        // =====================================================================
        let mut reader = EvmChainReader::new(rpcs.clone(), config.bonder);
        for route in &config.bonding.routes {
            reader = reader.with_bridge(route.key(), route.bridge);
        }
        for transmitter in &config.relay.transmitters {
            reader = reader.with_transmitter(transmitter.chain, transmitter.address);
        }
        let reader = Arc::new(reader);

        // =====================================================================
        // PHASE 3: Subsystems
        // =====================================================================
        let liquidity = Arc::new(LiquidityTracker::new());

        let bonding = if config.bonding.enabled {
            let engine = BondingDecisionEngine::new(
                config.bonding_config(),
                BondingPorts {
                    ledger: bridge.clone(),
                    credit: reader.clone(),
                    gas: reader.clone(),
                    submitter: submitter.clone(),
                    time: time.clone(),
                },
                liquidity.clone(),
                retry,
            )
            .context("bonding engine")?;
            info!(routes = config.bonding.routes.len(), dry_mode = config.bonding.dry_mode, "[runtime] Bonding engine built");
            Some(Arc::new(engine))
        } else {
            warn!("[runtime] Bonding disabled");
            None
        };

        let settlement = Arc::new(
            SettlementCoordinator::new(
                config.settlement_config(),
                SettlementPorts {
                    ledger: bridge.clone(),
                    releaser: Arc::new(TrackerReleaser(liquidity.clone())),
                    submitter: submitter.clone(),
                    time: time.clone(),
                },
                retry,
            )
            .context("settlement coordinator")?,
        );

        let relay = if config.relay.enabled {
            let iris = IrisClient::new(
                &config.relay.attestation_url,
                Duration::from_secs(config.relay.request_timeout_secs.max(1)),
            )
            .context("attestation client")?;
            let relayer = AttestationRelayer::new(
                config.relay.clone(),
                RelayPorts {
                    attestation: Arc::new(iris),
                    nonces: reader.clone(),
                    ledger: bridge.clone(),
                    submitter,
                    time: time.clone(),
                },
                retry,
            )
            .context("attestation relay")?;
            info!(transmitters = config.relay.transmitters.len(), "[runtime] Attestation relay built");
            Some(Arc::new(relayer))
        } else {
            None
        };

        let mut sinks: Vec<Arc<dyn ReportSink>> = vec![Arc::new(LogReportSink)];
        if let Some(path) = &config.health.cache_file {
            sinks.push(Arc::new(FileReportSink::new(path.clone())));
        }
        let health = Arc::new(
            HealthCheckMonitor::new(
                config.health_config(),
                HealthPorts {
                    ledger: bridge.clone(),
                    chains: reader.clone(),
                    liquidity: Arc::new(TrackerLiquidity::new(liquidity, reader.clone())),
                    settlement: Arc::new(CoordinatorView(settlement.clone())),
                    sinks,
                    time: time.clone(),
                },
            )
            .context("health monitor")?,
        );

        let limiter = Arc::new(RateLimiter::new(config.status.rate_limit.clone()));

        Ok(Self {
            config,
            time,
            retry,
            bus,
            store,
            bridge,
            rpcs,
            reader,
            bonding,
            settlement,
            relay,
            health,
            limiter,
        })
    }

    pub fn status_state(&self) -> StatusState {
        StatusState {
            health: self.health.clone(),
            limiter: self.limiter.clone(),
        }
    }
}

fn rpc_clients(config: &BonderConfig) -> Result<HashMap<ChainId, JsonRpcClient>> {
    config
        .enabled_chains()
        .map(|chain| {
            let client = JsonRpcClient::new(
                chain.rpc_url.clone(),
                Duration::from_secs(chain.request_timeout_secs.max(1)),
            )
            .with_context(|| format!("rpc client for chain {}", chain.chain_id))?;
            Ok((chain.chain_id, client))
        })
        .collect()
}

fn open_backend(storage: &StorageConfig) -> Result<Box<dyn KeyValueStore>> {
    if storage.in_memory {
        warn!("[runtime] Ledger kept in memory; all state is lost on exit");
        return Ok(Box::new(InMemoryKVStore::new()));
    }
    open_durable(storage)
}

#[cfg(feature = "rocksdb")]
fn open_durable(storage: &StorageConfig) -> Result<Box<dyn KeyValueStore>> {
    let path = storage.data_dir.join("ledger");
    let db = bn_02_transfer_store::RocksDbStore::open_default(&path)
        .with_context(|| format!("open ledger at {}", path.display()))?;
    info!(path = %path.display(), "[runtime] RocksDB ledger opened");
    Ok(Box::new(db))
}

#[cfg(not(feature = "rocksdb"))]
fn open_durable(_storage: &StorageConfig) -> Result<Box<dyn KeyValueStore>> {
    anyhow::bail!("built without the `rocksdb` feature: set storage.in_memory = true or rebuild")
}
