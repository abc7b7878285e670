//! # Health Check Monitor Service
//!
//! Runs every enabled check on its own interval and hands the report to
//! each sink. Reads only; a check whose data cannot be read is reported
//! unhealthy with the failure as an item. Nothing is retried between cycles.

use async_trait::async_trait;
use bonder_telemetry::metrics::{HEALTH_CHECK_FAILING, SUBSYSTEM_ERRORS};
use parking_lot::RwLock;
use shared_types::{Amount, ChainId, Classified, RouteKey, TimeSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::domain::checks::{self, AuditWindow, Reading};
use crate::domain::config::HealthConfig;
use crate::domain::errors::HealthError;
use crate::domain::report::{CheckItem, CheckName, CheckResult, HealthCheckReport};
use crate::ports::inbound::HealthCheckApi;
use crate::ports::outbound::{ChainStatus, HealthLedger, LiquidityView, ReportSink, SettlementView};

#[derive(Clone)]
pub struct HealthPorts {
    pub ledger: Arc<dyn HealthLedger>,
    pub chains: Arc<dyn ChainStatus>,
    pub liquidity: Arc<dyn LiquidityView>,
    pub settlement: Arc<dyn SettlementView>,
    pub sinks: Vec<Arc<dyn ReportSink>>,
    pub time: Arc<dyn TimeSource>,
}

pub struct HealthCheckMonitor {
    config: HealthConfig,
    ports: HealthPorts,
    latest: RwLock<Option<HealthCheckReport>>,
}

impl HealthCheckMonitor {
    pub fn new(config: HealthConfig, ports: HealthPorts) -> Result<Self, HealthError> {
        config.validate()?;
        Ok(Self {
            config,
            ports,
            latest: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    async fn evaluate(&self, check: CheckName, window: &AuditWindow) -> CheckResult {
        match check {
            CheckName::UnbondedTransfers => {
                let records = self.ports.ledger.transfers_since(window.start);
                checks::unbonded_transfers(&records, window, self.config.bond_grace_secs)
            }
            CheckName::UnsettledBundles => {
                let bundles = self.ports.ledger.bundles_since(window.start);
                checks::unsettled_bundles(&bundles, window, self.config.settle_grace_secs)
            }
            CheckName::UnrelayedMessages => {
                let messages = self.ports.ledger.messages_since(window.start);
                checks::unrelayed_messages(&messages, window, self.config.relay_grace_secs)
            }
            CheckName::InvalidBondWithdrawals => {
                let records = self.ports.ledger.transfers_since(window.start);
                checks::invalid_bond_withdrawals(&records)
            }
            CheckName::UncommittedBonds => {
                let records = self.ports.ledger.transfers_since(window.start);
                checks::uncommitted_bonds(&records, window, self.config.settle_grace_secs)
            }
            CheckName::MissedEvents => {
                let bundles = self.ports.ledger.bundles_since(window.start);
                let ledger = &self.ports.ledger;
                checks::missed_events(&bundles, window, self.config.bond_grace_secs, |id| {
                    ledger.transfer(id).is_some()
                })
            }
            CheckName::LowBonderBalance => checks::low_bonder_balance(&self.balances().await),
            CheckName::LowAvailableLiquidity => {
                checks::low_available_liquidity(&self.liquidity().await)
            }
            CheckName::UnsyncedDataSources => checks::unsynced_data_sources(&self.lags().await),
            CheckName::IncompleteSettlements => {
                let items = self
                    .ports
                    .settlement
                    .incomplete_settlements()
                    .into_iter()
                    .map(|s| {
                        CheckItem::new(
                            s.bundle_id,
                            format!(
                                "{}: {} members unbonded past deadline {}",
                                s.route, s.missing, s.deadline
                            ),
                        )
                    })
                    .collect();
                CheckResult::from_items(check, items)
            }
            CheckName::UnresolvableGaps => {
                let items = self
                    .ports
                    .ledger
                    .unresolvable_gaps()
                    .into_iter()
                    .map(|g| {
                        CheckItem::new(
                            g.gap,
                            format!(
                                "{} events buffered since {}, escalated at {}",
                                g.events, g.buffered_since, g.escalated_at
                            ),
                        )
                    })
                    .collect();
                CheckResult::from_items(check, items)
            }
        }
    }

    async fn balances(&self) -> Vec<(ChainId, Amount, Reading<Amount>)> {
        let mut readings = Vec::with_capacity(self.config.balance_floors.len());
        for floor in &self.config.balance_floors {
            let balance = self
                .ports
                .chains
                .native_balance(floor.chain, self.config.bonder)
                .await
                .map_err(|source| self.read_failed(floor.chain, source));
            readings.push((floor.chain, floor.floor, balance));
        }
        readings
    }

    async fn liquidity(&self) -> Vec<(RouteKey, Amount, Reading<Amount>)> {
        let mut readings = Vec::with_capacity(self.config.liquidity_floors.len());
        for floor in &self.config.liquidity_floors {
            let route = floor.route();
            let available = self
                .ports
                .liquidity
                .available(&route)
                .await
                .map_err(|source| self.read_failed(route.destination_chain, source));
            readings.push((route, floor.floor, available));
        }
        readings
    }

    async fn lags(&self) -> Vec<(shared_types::ChainWatermark, u64, Reading<u64>)> {
        let watermarks = self.ports.ledger.watermarks();
        let mut readings = Vec::with_capacity(watermarks.len());
        for watermark in watermarks {
            let chain = watermark.key.chain_id;
            let head = self
                .ports
                .chains
                .head(chain)
                .await
                .map_err(|source| self.read_failed(chain, source));
            readings.push((watermark, self.config.max_lag(chain), head));
        }
        readings
    }

    fn read_failed(&self, chain: ChainId, source: shared_types::ChainReadError) -> String {
        let error = HealthError::ChainRead { chain, source };
        SUBSYSTEM_ERRORS
            .with_label_values(&["bn-06", error.class().name()])
            .inc();
        error.to_string()
    }

    /// Run the audit on an interval until `shutdown` flips.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            interval_secs = self.config.interval_secs,
            window_days = self.config.window_days,
            checks = self.config.enabled_checks.len(),
            "[bn-06] Health check monitor started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.run_checks().await;
                }
            }
        }
        info!("[bn-06] Health check monitor stopped");
    }
}

#[async_trait]
impl HealthCheckApi for HealthCheckMonitor {
    async fn run_checks(&self) -> HealthCheckReport {
        let now = self.ports.time.now();
        let window = AuditWindow::new(now, self.config.window_secs());

        let mut results = Vec::with_capacity(self.config.enabled_checks.len());
        for check in CheckName::ALL {
            if !self.config.is_enabled(check) {
                continue;
            }
            let result = self.evaluate(check, &window).await;
            HEALTH_CHECK_FAILING
                .with_label_values(&[check.name()])
                .set(if result.healthy { 0.0 } else { 1.0 });
            results.push(result);
        }

        let report = HealthCheckReport::new(now, self.config.window_days, results);
        for sink in &self.ports.sinks {
            if let Err(e) = sink.publish(&report).await {
                SUBSYSTEM_ERRORS
                    .with_label_values(&["bn-06", e.class().name()])
                    .inc();
                warn!(sink = sink.name(), error = %e, "[bn-06] Report sink failed");
            }
        }
        *self.latest.write() = Some(report.clone());
        report
    }

    fn latest(&self) -> Option<HealthCheckReport> {
        self.latest.read().clone()
    }
}
