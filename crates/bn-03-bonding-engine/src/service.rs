//! # Bonding Decision Engine Service
//!
//! Evaluates each `Sent` transfer in a fixed order and bonds it on the
//! destination chain when every check passes:
//!
//! 1. not already bonded or marked unbondable
//! 2. route enabled
//! 3. amount at or above the route threshold
//! 4. bonder fee at or above the route minimum
//! 5. deadline not passed
//! 6. gas price and gas limit within bounds
//! 7. liquidity available, then reserved
//! 8. dry mode stops here
//! 9. submit, confirm, record
//!
//! Steps 1-7 run under the route's async mutex, so two transfers on one
//! route never reserve against the same credit reading.
//!
//! Once a bond is broadcast its hash is kept with the reservation until the
//! outcome is known. A later evaluation waits on that hash again instead of
//! sending a second bond. Only a revert or a dropped transaction frees the
//! reservation.

use async_trait::async_trait;
use bonder_telemetry::metrics::{BONDING_DECISIONS, BONDING_SUBMISSION_FAILURES, SUBSYSTEM_ERRORS};
use dashmap::DashMap;
use shared_bus::{StoreTransition, Subscription};
use shared_resilience::RetryExecutor;
use shared_types::{
    Amount, BondedWithdrawal, ChainId, ChainReadError, Classified, ContractCall, PreparedTx, RouteKey,
    SubmitError, TimeSource, TransactionSubmitter, Transfer, TransferId, TxHash, TxReceipt,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::domain::config::{BondingConfig, RouteConfig};
use crate::domain::decision::{BondDecision, DeferReason, SkipReason};
use crate::domain::errors::BondingError;
use crate::domain::liquidity::{LiquidityTracker, ReserveRequest};
use crate::ports::inbound::BondingApi;
use crate::ports::outbound::{BondLedger, CreditSource, GasOracle};

/// Everything the engine talks to.
#[derive(Clone)]
pub struct BondingPorts {
    pub ledger: Arc<dyn BondLedger>,
    pub credit: Arc<dyn CreditSource>,
    pub gas: Arc<dyn GasOracle>,
    pub submitter: Arc<dyn TransactionSubmitter>,
    pub time: Arc<dyn TimeSource>,
}

/// Result of the locked part of an evaluation.
enum Checked<'a> {
    Decided(BondDecision),
    Reserved(&'a RouteConfig),
    /// Broadcast earlier with an unknown outcome; wait on it again.
    Unresolved(TxHash),
}

/// A reserved bond between reservation and a known outcome.
#[derive(Debug, Clone, Copy)]
struct InFlightBond {
    /// Set once `send` returns.
    tx_hash: Option<TxHash>,
    /// An evaluation is currently sending or waiting on it.
    claimed: bool,
}

pub struct BondingDecisionEngine {
    config: BondingConfig,
    ports: BondingPorts,
    retry: RetryExecutor,
    liquidity: Arc<LiquidityTracker>,
    route_locks: DashMap<RouteKey, Arc<Mutex<()>>>,
    in_flight: DashMap<TransferId, InFlightBond>,
}

impl BondingDecisionEngine {
    pub fn new(
        config: BondingConfig,
        ports: BondingPorts,
        liquidity: Arc<LiquidityTracker>,
        retry: RetryExecutor,
    ) -> Result<Self, BondingError> {
        config.validate()?;
        Ok(Self {
            config,
            ports,
            retry,
            liquidity,
            route_locks: DashMap::new(),
            in_flight: DashMap::new(),
        })
    }

    pub fn config(&self) -> &BondingConfig {
        &self.config
    }

    pub fn liquidity(&self) -> Arc<LiquidityTracker> {
        Arc::clone(&self.liquidity)
    }

    /// Bonds broadcast or being broadcast whose outcome is still open.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn route_lock(&self, route: &RouteKey) -> Arc<Mutex<()>> {
        Arc::clone(self.route_locks.entry(route.clone()).or_default().value())
    }

    // =========================================================================
    // CHECKS (under the route lock)
    // =========================================================================

    async fn check_and_reserve(&self, transfer: &Transfer) -> Result<Checked<'_>, BondingError> {
        let id = transfer.transfer_id;

        if let Some(record) = self.ports.ledger.get(&id) {
            if record.is_bonded() {
                self.adopt_recorded_bond(&id);
                return Ok(Checked::Decided(BondDecision::AlreadyBonded));
            }
            if record.unbondable.is_some() || record.settled_without_bond() {
                return Ok(Checked::Decided(BondDecision::Skip(SkipReason::Unbondable)));
            }
        }
        if self.liquidity.is_bonded(&id) {
            return Ok(Checked::Decided(BondDecision::AlreadyBonded));
        }
        if let Some(mut pending) = self.in_flight.get_mut(&id) {
            return Ok(match pending.tx_hash {
                Some(tx_hash) if !pending.claimed => {
                    pending.claimed = true;
                    Checked::Unresolved(tx_hash)
                }
                _ => Checked::Decided(BondDecision::Defer(DeferReason::InFlight)),
            });
        }
        if self.liquidity.is_reserved(&id) {
            return Ok(Checked::Decided(BondDecision::Defer(DeferReason::InFlight)));
        }

        let key = transfer.route();
        let Some(route) = self.config.route(&key).filter(|r| r.enabled) else {
            return Ok(Checked::Decided(BondDecision::Skip(SkipReason::RouteDisabled)));
        };

        if transfer.amount < route.min_threshold {
            self.mark_unbondable(&id, "amount below route threshold");
            return Ok(Checked::Decided(BondDecision::Skip(SkipReason::BelowThreshold)));
        }
        if transfer.bonder_fee < route.min_bonder_fee {
            return Ok(Checked::Decided(BondDecision::Skip(SkipReason::FeeTooLow)));
        }
        if transfer.is_expired(self.ports.time.now()) {
            self.mark_unbondable(&id, "deadline passed before bonding");
            return Ok(Checked::Decided(BondDecision::Skip(SkipReason::DeadlineExpired)));
        }

        let gas_price = self.read_gas_price(transfer).await?;
        if gas_price > route.max_gas_price {
            debug!(%id, %gas_price, max = %route.max_gas_price, "[bn-03] Gas price above route maximum");
            return Ok(Checked::Decided(BondDecision::Defer(DeferReason::GasPriceTooHigh)));
        }
        if route
            .gas_limit_override
            .is_some_and(|limit| limit > route.max_gas_limit)
        {
            return Ok(Checked::Decided(BondDecision::Skip(
                SkipReason::GasLimitOutOfBounds,
            )));
        }

        let credit = self.read_credit(transfer).await?;
        let request = ReserveRequest {
            route: key,
            transfer_id: id,
            amount: transfer.amount,
            credit,
            fee_margin: route.fee_margin,
            floor: route.liquidity_floor,
        };
        if let Err(short) = self.liquidity.try_reserve(&request) {
            info!(%id, route = %short.route, available = %short.available, required = %short.required, "[bn-03] Not enough liquidity to bond");
            return Ok(Checked::Decided(BondDecision::Skip(
                SkipReason::InsufficientLiquidity,
            )));
        }
        self.in_flight.insert(
            id,
            InFlightBond {
                tx_hash: None,
                claimed: true,
            },
        );
        Ok(Checked::Reserved(route))
    }

    /// The store saw our bond land while its outcome was still open here.
    fn adopt_recorded_bond(&self, id: &TransferId) {
        if self.in_flight.remove(id).is_some() {
            self.liquidity.mark_bonded(id);
            info!(%id, "[bn-03] In-flight bond observed on chain");
        }
    }

    async fn read_gas_price(&self, transfer: &Transfer) -> Result<Amount, BondingError> {
        let chain = transfer.destination_chain;
        let gas = &self.ports.gas;
        self.retry
            .run_while("gas_price", || gas.gas_price(chain), ChainReadError::is_retryable)
            .await
            .map_err(|source| BondingError::ChainRead {
                what: "gas price",
                chain,
                source,
            })
    }

    async fn read_credit(&self, transfer: &Transfer) -> Result<Amount, BondingError> {
        let chain = transfer.destination_chain;
        let token = &transfer.token;
        let credit = &self.ports.credit;
        self.retry
            .run_while("credit", || credit.credit(chain, token), ChainReadError::is_retryable)
            .await
            .map_err(|source| BondingError::ChainRead {
                what: "bonder credit",
                chain,
                source,
            })
    }

    fn mark_unbondable(&self, id: &TransferId, reason: &str) {
        if let Err(e) = self.ports.ledger.mark_unbondable(id, reason) {
            warn!(%id, error = %e, "[bn-03] Could not mark transfer unbondable");
            SUBSYSTEM_ERRORS
                .with_label_values(&["bn-03", e.class.name()])
                .inc();
        }
    }

    // =========================================================================
    // SUBMISSION
    // =========================================================================

    async fn send_bond(&self, transfer: &Transfer, route: &RouteConfig) -> Result<TxHash, SubmitError> {
        let tx = PreparedTx {
            chain_id: transfer.destination_chain,
            to: route.bridge,
            call: ContractCall::BondWithdrawal {
                recipient: transfer.recipient,
                amount: transfer.amount,
                transfer_nonce: transfer.nonce,
                bonder_fee: transfer.bonder_fee,
            },
            gas_limit: route.gas_limit_override,
            max_gas_price: Some(route.max_gas_price),
        };
        let submitter = &self.ports.submitter;

        let tx_hash = self
            .retry
            .run_while("send_bond", || submitter.send(&tx), SubmitError::is_retryable)
            .await?;
        info!(id = %transfer.transfer_id, %tx_hash, chain = %tx.chain_id, "[bn-03] Bond submitted");
        Ok(tx_hash)
    }

    async fn confirm_bond(&self, chain_id: ChainId, tx_hash: TxHash) -> Result<TxReceipt, SubmitError> {
        let submitter = &self.ports.submitter;
        let receipt = self
            .retry
            .run_while(
                "confirm_bond",
                || submitter.wait_for_confirmation(chain_id, tx_hash),
                SubmitError::is_retryable,
            )
            .await?;
        if !receipt.success {
            return Err(SubmitError::Reverted { tx_hash });
        }
        Ok(receipt)
    }

    /// Drop the reservation of a bond that never took effect.
    fn abandon(&self, id: &TransferId, source: SubmitError) -> BondingError {
        self.in_flight.remove(id);
        self.liquidity.release(id);
        BONDING_SUBMISSION_FAILURES.inc();
        BondingError::Submission {
            transfer_id: *id,
            source,
        }
    }

    async fn bond(&self, transfer: &Transfer, route: &RouteConfig) -> Result<BondDecision, BondingError> {
        let id = transfer.transfer_id;

        if self.config.dry_mode {
            self.in_flight.remove(&id);
            self.liquidity.release(&id);
            return Ok(BondDecision::Defer(DeferReason::DryMode));
        }

        let tx_hash = match self.send_bond(transfer, route).await {
            Ok(tx_hash) => tx_hash,
            Err(source) => return Err(self.abandon(&id, source)),
        };
        if let Some(mut pending) = self.in_flight.get_mut(&id) {
            pending.tx_hash = Some(tx_hash);
        }
        self.await_bond(transfer, tx_hash).await
    }

    async fn await_bond(&self, transfer: &Transfer, tx_hash: TxHash) -> Result<BondDecision, BondingError> {
        let id = transfer.transfer_id;

        match self.confirm_bond(transfer.destination_chain, tx_hash).await {
            Ok(receipt) => {
                self.in_flight.remove(&id);
                self.liquidity.mark_bonded(&id);
                let bond = BondedWithdrawal {
                    transfer_id: id,
                    tx_hash: receipt.tx_hash,
                    amount: transfer.amount,
                    bonder: self.config.bonder,
                    bonded_at: self.ports.time.now(),
                };
                if let Err(e) = self.ports.ledger.record_bond(bond) {
                    // The chain watcher still observes the bond event.
                    error!(%id, tx_hash = %receipt.tx_hash, error = %e, "[bn-03] Bond confirmed but not recorded");
                    SUBSYSTEM_ERRORS
                        .with_label_values(&["bn-03", e.class.name()])
                        .inc();
                }
                Ok(BondDecision::Bonded {
                    tx_hash: receipt.tx_hash,
                })
            }
            Err(source) if source.is_dead() => Err(self.abandon(&id, source)),
            Err(source) => {
                // Liquidity stays reserved until the hash resolves.
                if let Some(mut pending) = self.in_flight.get_mut(&id) {
                    pending.claimed = false;
                }
                warn!(%id, %tx_hash, error = %source, "[bn-03] Bond outcome unknown, keeping reservation");
                BONDING_SUBMISSION_FAILURES.inc();
                Err(BondingError::Submission {
                    transfer_id: id,
                    source,
                })
            }
        }
    }

    async fn evaluate(&self, transfer: &Transfer) -> Result<BondDecision, BondingError> {
        let lock = self.route_lock(&transfer.route());
        let checked = {
            let _guard = lock.lock().await;
            self.check_and_reserve(transfer).await?
        };
        match checked {
            Checked::Decided(decision) => Ok(decision),
            Checked::Reserved(route) => self.bond(transfer, route).await,
            Checked::Unresolved(tx_hash) => {
                debug!(id = %transfer.transfer_id, %tx_hash, "[bn-03] Waiting again on unresolved bond");
                self.await_bond(transfer, tx_hash).await
            }
        }
    }

    // =========================================================================
    // RUN LOOP
    // =========================================================================

    /// React to observed transfers and rescan pending ones until `shutdown`
    /// flips. Evaluations already running are awaited before returning.
    pub async fn run(self: Arc<Self>, mut transfers: Subscription, mut shutdown: watch::Receiver<bool>) {
        let restored = self.restore_liquidity();
        let mut rescan = tokio::time::interval(Duration::from_secs(
            self.config.rescan_interval_secs.max(1),
        ));
        rescan.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tasks = JoinSet::new();

        info!(restored, dry_mode = self.config.dry_mode, routes = self.config.routes.len(), "[bn-03] Bonding engine started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                transition = transfers.recv() => match transition {
                    Ok(StoreTransition::TransferObserved { transfer }) => {
                        self.spawn_evaluation(&mut tasks, transfer);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "[bn-03] Transition bus closed");
                        break;
                    }
                },
                _ = rescan.tick() => {
                    let missed = transfers.take_missed();
                    if missed > 0 {
                        warn!(missed, "[bn-03] Missed transfer notifications, rescanning");
                    }
                    for transfer in self.ports.ledger.pending_transfers() {
                        self.spawn_evaluation(&mut tasks, transfer);
                    }
                }
                Some(joined) = tasks.join_next() => {
                    if let Err(e) = joined {
                        error!(error = %e, "[bn-03] Evaluation task panicked");
                    }
                }
            }
        }

        let in_flight = tasks.len();
        if in_flight > 0 {
            info!(in_flight, "[bn-03] Waiting for in-flight evaluations");
        }
        while tasks.join_next().await.is_some() {}
        info!("[bn-03] Bonding engine stopped");
    }

    fn spawn_evaluation(self: &Arc<Self>, tasks: &mut JoinSet<()>, transfer: Transfer) {
        let engine = Arc::clone(self);
        tasks.spawn(async move {
            let _ = engine.on_transfer_sent(transfer).await;
        });
    }
}

#[async_trait]
impl BondingApi for BondingDecisionEngine {
    async fn on_transfer_sent(&self, transfer: Transfer) -> Result<BondDecision, BondingError> {
        let id = transfer.transfer_id;
        let result = self.evaluate(&transfer).await;
        match &result {
            Ok(decision) => {
                BONDING_DECISIONS.with_label_values(&decision.labels()).inc();
                match decision {
                    BondDecision::Bonded { tx_hash } => {
                        info!(%id, %tx_hash, route = %transfer.route(), amount = %transfer.amount, "[bn-03] Transfer bonded")
                    }
                    BondDecision::Skip(reason) => {
                        info!(%id, route = %transfer.route(), reason = reason.name(), "[bn-03] Skipping transfer")
                    }
                    BondDecision::AlreadyBonded | BondDecision::Defer(_) => {
                        debug!(%id, %decision, "[bn-03] Transfer not bonded now")
                    }
                }
            }
            Err(e) => {
                warn!(%id, error = %e, "[bn-03] Bonding failed");
                SUBSYSTEM_ERRORS
                    .with_label_values(&["bn-03", e.class().name()])
                    .inc();
            }
        }
        result
    }

    fn outstanding(&self, route: &RouteKey) -> Amount {
        self.liquidity.outstanding(route)
    }

    fn restore_liquidity(&self) -> usize {
        self.ports
            .ledger
            .bonded_unsettled()
            .into_iter()
            .filter(|(transfer, bond)| {
                self.liquidity
                    .restore_bonded(transfer.route(), transfer.transfer_id, bond.amount)
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use shared_bus::{TransitionBus, TransitionPublisher, TransitionTopic};
    use shared_resilience::RetryPolicy;
    use shared_types::{ErrorClass, ManualTimeSource, TxHash};
    use std::sync::atomic::Ordering;

    struct Harness {
        engine: Arc<BondingDecisionEngine>,
        ledger: Arc<MockLedger>,
        credit: Arc<FixedCredit>,
        gas: Arc<FixedGas>,
        submitter: Arc<MockSubmitter>,
        time: Arc<ManualTimeSource>,
    }

    fn harness(config: BondingConfig, transfers: &[&Transfer], credit: u64) -> Harness {
        let ledger = Arc::new(MockLedger::with(transfers));
        let credit = Arc::new(FixedCredit::new(credit));
        let gas = Arc::new(FixedGas::gwei(20));
        let submitter = Arc::new(MockSubmitter::default());
        let time = Arc::new(ManualTimeSource::new(NOW));
        let ports = BondingPorts {
            ledger: ledger.clone(),
            credit: credit.clone(),
            gas: gas.clone(),
            submitter: submitter.clone(),
            time: time.clone(),
        };
        let retry = RetryExecutor::new(RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 10,
        });
        let engine = BondingDecisionEngine::new(config, ports, Arc::new(LiquidityTracker::new()), retry)
            .unwrap();
        Harness {
            engine: Arc::new(engine),
            ledger,
            credit,
            gas,
            submitter,
            time,
        }
    }

    fn route_key() -> RouteKey {
        RouteKey::new(usdc(), DESTINATION)
    }

    #[tokio::test]
    async fn test_bonds_eligible_transfer() {
        let t = transfer(1, 1_000);
        let h = harness(config(), &[&t], 10_000);

        let decision = h.engine.on_transfer_sent(t.clone()).await.unwrap();
        let BondDecision::Bonded { tx_hash } = decision else {
            panic!("expected a bond, got {decision}");
        };

        let record = h.ledger.record(&t.transfer_id).unwrap();
        let bond = record.bond.unwrap();
        assert_eq!(bond.tx_hash, tx_hash);
        assert_eq!(bond.amount, t.amount);
        assert_eq!(bond.bonder, config().bonder);
        assert_eq!(bond.bonded_at, NOW);
        assert_eq!(h.engine.outstanding(&route_key()), t.amount);

        let sent = h.submitter.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].chain_id, DESTINATION);
        assert_eq!(sent[0].to, route().bridge);
        assert_eq!(
            sent[0].call,
            ContractCall::BondWithdrawal {
                recipient: t.recipient,
                amount: t.amount,
                transfer_nonce: t.nonce,
                bonder_fee: t.bonder_fee,
            }
        );
    }

    #[tokio::test]
    async fn test_second_evaluation_is_already_bonded() {
        let t = transfer(1, 1_000);
        let h = harness(config(), &[&t], 10_000);
        h.engine.on_transfer_sent(t.clone()).await.unwrap();
        let again = h.engine.on_transfer_sent(t).await.unwrap();
        assert_eq!(again, BondDecision::AlreadyBonded);
        assert_eq!(h.submitter.sends(), 1);
    }

    #[tokio::test]
    async fn test_unrecorded_bond_still_counts_as_bonded() {
        let t = transfer(1, 1_000);
        let h = harness(config(), &[&t], 10_000);
        h.ledger.fail_record.store(true, Ordering::SeqCst);

        assert!(matches!(
            h.engine.on_transfer_sent(t.clone()).await.unwrap(),
            BondDecision::Bonded { .. }
        ));
        assert_eq!(
            h.engine.on_transfer_sent(t).await.unwrap(),
            BondDecision::AlreadyBonded
        );
        assert_eq!(h.submitter.sends(), 1);
    }

    #[tokio::test]
    async fn test_unbondable_transfer_skipped() {
        let t = transfer(1, 1_000);
        let h = harness(config(), &[&t], 10_000);
        h.ledger.mark_unbondable(&t.transfer_id, "manual").unwrap();
        assert_eq!(
            h.engine.on_transfer_sent(t).await.unwrap(),
            BondDecision::Skip(SkipReason::Unbondable)
        );
    }

    #[tokio::test]
    async fn test_route_disabled_or_missing() {
        let t = transfer(1, 1_000);
        let mut disabled = route();
        disabled.enabled = false;
        let h = harness(BondingConfig::new(config().bonder).with_route(disabled), &[&t], 10_000);
        assert_eq!(
            h.engine.on_transfer_sent(t.clone()).await.unwrap(),
            BondDecision::Skip(SkipReason::RouteDisabled)
        );

        let h = harness(BondingConfig::new(config().bonder), &[&t], 10_000);
        assert_eq!(
            h.engine.on_transfer_sent(t).await.unwrap(),
            BondDecision::Skip(SkipReason::RouteDisabled)
        );
    }

    #[tokio::test]
    async fn test_below_threshold_marks_unbondable() {
        let t = transfer(1, 1_000);
        let mut r = route();
        r.min_threshold = Amount::from(5_000u64);
        let h = harness(BondingConfig::new(config().bonder).with_route(r), &[&t], 10_000);

        assert_eq!(
            h.engine.on_transfer_sent(t.clone()).await.unwrap(),
            BondDecision::Skip(SkipReason::BelowThreshold)
        );
        assert!(h.ledger.record(&t.transfer_id).unwrap().unbondable.is_some());
        assert_eq!(h.submitter.sends(), 0);
    }

    #[tokio::test]
    async fn test_fee_too_low_is_not_permanent() {
        let t = transfer(1, 1_000);
        let mut r = route();
        r.min_bonder_fee = Amount::from(50u64);
        let h = harness(BondingConfig::new(config().bonder).with_route(r), &[&t], 10_000);

        assert_eq!(
            h.engine.on_transfer_sent(t.clone()).await.unwrap(),
            BondDecision::Skip(SkipReason::FeeTooLow)
        );
        assert!(h.ledger.record(&t.transfer_id).unwrap().unbondable.is_none());
    }

    #[tokio::test]
    async fn test_expired_deadline_marks_unbondable() {
        let mut t = transfer(1, 1_000);
        t.deadline = NOW + 10;
        let h = harness(config(), &[&t], 10_000);
        h.time.advance(11);

        assert_eq!(
            h.engine.on_transfer_sent(t.clone()).await.unwrap(),
            BondDecision::Skip(SkipReason::DeadlineExpired)
        );
        assert!(h.ledger.record(&t.transfer_id).unwrap().unbondable.is_some());
    }

    #[tokio::test]
    async fn test_high_gas_price_defers() {
        let t = transfer(1, 1_000);
        let h = harness(config(), &[&t], 10_000);
        h.gas.0.store(600_000_000_000, Ordering::SeqCst);

        assert_eq!(
            h.engine.on_transfer_sent(t.clone()).await.unwrap(),
            BondDecision::Defer(DeferReason::GasPriceTooHigh)
        );
        assert_eq!(h.engine.outstanding(&route_key()), Amount::zero());

        h.gas.0.store(1_000_000_000, Ordering::SeqCst);
        assert!(matches!(
            h.engine.on_transfer_sent(t).await.unwrap(),
            BondDecision::Bonded { .. }
        ));
    }

    #[tokio::test]
    async fn test_gas_limit_override_out_of_bounds() {
        let t = transfer(1, 1_000);
        let mut r = route();
        r.gas_limit_override = Some(2_000_000);
        let h = harness(BondingConfig::new(config().bonder).with_route(r), &[&t], 10_000);
        assert_eq!(
            h.engine.on_transfer_sent(t).await.unwrap(),
            BondDecision::Skip(SkipReason::GasLimitOutOfBounds)
        );
    }

    #[tokio::test]
    async fn test_insufficient_liquidity_respects_margin_and_floor() {
        let t = transfer(1, 1_000);
        let mut r = route();
        r.fee_margin = Amount::from(100u64);
        let h = harness(BondingConfig::new(config().bonder).with_route(r.clone()), &[&t], 1_050);
        assert_eq!(
            h.engine.on_transfer_sent(t.clone()).await.unwrap(),
            BondDecision::Skip(SkipReason::InsufficientLiquidity)
        );

        r.fee_margin = Amount::zero();
        r.liquidity_floor = Amount::from(200u64);
        let h = harness(BondingConfig::new(config().bonder).with_route(r), &[&t], 1_150);
        assert_eq!(
            h.engine.on_transfer_sent(t.clone()).await.unwrap(),
            BondDecision::Skip(SkipReason::InsufficientLiquidity)
        );

        *h.credit.credit.lock() = Amount::from(1_200u64);
        assert!(matches!(
            h.engine.on_transfer_sent(t).await.unwrap(),
            BondDecision::Bonded { .. }
        ));
    }

    #[tokio::test]
    async fn test_dry_mode_defers_and_releases() {
        let t = transfer(1, 1_000);
        let mut cfg = config();
        cfg.dry_mode = true;
        let h = harness(cfg, &[&t], 10_000);

        assert_eq!(
            h.engine.on_transfer_sent(t).await.unwrap(),
            BondDecision::Defer(DeferReason::DryMode)
        );
        assert_eq!(h.engine.outstanding(&route_key()), Amount::zero());
        assert_eq!(h.submitter.sends(), 0);
    }

    #[tokio::test]
    async fn test_rejected_submission_releases_liquidity() {
        let t = transfer(1, 1_000);
        let h = harness(config(), &[&t], 10_000);
        h.submitter.reject.store(true, Ordering::SeqCst);

        let err = h.engine.on_transfer_sent(t.clone()).await.unwrap_err();
        assert!(matches!(err, BondingError::Submission { .. }));
        assert_eq!(err.class(), ErrorClass::InvalidInput);
        assert_eq!(h.engine.outstanding(&route_key()), Amount::zero());
        assert!(h.ledger.record(&t.transfer_id).unwrap().bond.is_none());

        h.submitter.reject.store(false, Ordering::SeqCst);
        assert!(matches!(
            h.engine.on_transfer_sent(t).await.unwrap(),
            BondDecision::Bonded { .. }
        ));
    }

    #[tokio::test]
    async fn test_reverted_bond_is_not_recorded() {
        let t = transfer(1, 1_000);
        let h = harness(config(), &[&t], 10_000);
        h.submitter.revert.store(true, Ordering::SeqCst);

        let err = h.engine.on_transfer_sent(t.clone()).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::TransactionReverted);
        assert_eq!(h.engine.outstanding(&route_key()), Amount::zero());
        assert!(h.ledger.record(&t.transfer_id).unwrap().bond.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfirmed_bond_is_awaited_not_resent() {
        let t = transfer(1, 1_000);
        let h = harness(config(), &[&t], 10_000);
        h.submitter.unconfirmed.store(true, Ordering::SeqCst);

        let err = h.engine.on_transfer_sent(t.clone()).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::TransientIO);
        assert_eq!(h.engine.outstanding(&route_key()), t.amount);
        assert_eq!(h.engine.in_flight(), 1);

        assert!(h.engine.on_transfer_sent(t.clone()).await.is_err());
        assert_eq!(h.submitter.sends(), 1);
        assert_eq!(h.engine.outstanding(&route_key()), t.amount);

        h.submitter.unconfirmed.store(false, Ordering::SeqCst);
        let BondDecision::Bonded { tx_hash } = h.engine.on_transfer_sent(t.clone()).await.unwrap() else {
            panic!("expected the first bond to confirm");
        };
        assert_eq!(h.submitter.sends(), 1);
        let waited = h.submitter.waited.lock().clone();
        assert!(waited.iter().all(|hash| *hash == tx_hash));
        assert_eq!(h.ledger.record(&t.transfer_id).unwrap().bond.unwrap().tx_hash, tx_hash);
        assert_eq!(h.engine.outstanding(&route_key()), t.amount);
        assert_eq!(h.engine.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfirmed_bond_holds_route_credit() {
        let a = transfer(1, 1_000);
        let b = transfer(2, 1_000);
        let h = harness(config(), &[&a, &b], 1_500);
        h.submitter.unconfirmed.store(true, Ordering::SeqCst);

        assert!(h.engine.on_transfer_sent(a).await.is_err());
        assert_eq!(
            h.engine.on_transfer_sent(b).await.unwrap(),
            BondDecision::Skip(SkipReason::InsufficientLiquidity)
        );
        assert_eq!(h.submitter.sends(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_bond_releases_and_resends() {
        let t = transfer(1, 1_000);
        let h = harness(config(), &[&t], 10_000);
        h.submitter.unconfirmed.store(true, Ordering::SeqCst);
        assert!(h.engine.on_transfer_sent(t.clone()).await.is_err());

        h.submitter.dropped.store(true, Ordering::SeqCst);
        let err = h.engine.on_transfer_sent(t.clone()).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::TransactionReverted);
        assert_eq!(h.engine.outstanding(&route_key()), Amount::zero());
        assert_eq!(h.engine.in_flight(), 0);
        assert_eq!(h.submitter.sends(), 1);

        h.submitter.dropped.store(false, Ordering::SeqCst);
        h.submitter.unconfirmed.store(false, Ordering::SeqCst);
        assert!(matches!(
            h.engine.on_transfer_sent(t).await.unwrap(),
            BondDecision::Bonded { .. }
        ));
        assert_eq!(h.submitter.sends(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfirmed_bond_seen_by_watcher_becomes_bonded() {
        let t = transfer(1, 1_000);
        let h = harness(config(), &[&t], 10_000);
        h.submitter.unconfirmed.store(true, Ordering::SeqCst);
        assert!(h.engine.on_transfer_sent(t.clone()).await.is_err());

        h.ledger
            .record_bond(BondedWithdrawal {
                transfer_id: t.transfer_id,
                tx_hash: TxHash([9; 32]),
                amount: t.amount,
                bonder: config().bonder,
                bonded_at: NOW,
            })
            .unwrap();
        assert_eq!(
            h.engine.on_transfer_sent(t.clone()).await.unwrap(),
            BondDecision::AlreadyBonded
        );
        assert_eq!(h.engine.in_flight(), 0);
        assert_eq!(h.engine.outstanding(&route_key()), t.amount);
        assert_eq!(h.submitter.sends(), 1);
        assert_eq!(h.engine.restore_liquidity(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_send_failures_are_retried() {
        let t = transfer(1, 1_000);
        let h = harness(config(), &[&t], 10_000);
        h.submitter.transient_failures.store(2, Ordering::SeqCst);
        h.credit.failures.store(1, Ordering::SeqCst);

        assert!(matches!(
            h.engine.on_transfer_sent(t).await.unwrap(),
            BondDecision::Bonded { .. }
        ));
        assert_eq!(h.submitter.sends(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_credit_read_failure_is_an_error() {
        let t = transfer(1, 1_000);
        let h = harness(config(), &[&t], 10_000);
        h.credit.failures.store(10, Ordering::SeqCst);

        let err = h.engine.on_transfer_sent(t).await.unwrap_err();
        assert!(matches!(err, BondingError::ChainRead { what: "bonder credit", .. }));
        assert!(err.is_retryable());
        assert_eq!(h.engine.outstanding(&route_key()), Amount::zero());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_transfers_share_route_credit() {
        let a = transfer(1, 1_000);
        let b = transfer(2, 1_000);
        let h = harness(config(), &[&a, &b], 1_500);
        h.submitter.confirm_delay_ms.store(20, Ordering::SeqCst);

        let (ra, rb) = tokio::join!(
            h.engine.on_transfer_sent(a.clone()),
            h.engine.on_transfer_sent(b.clone())
        );
        let decisions = [ra.unwrap(), rb.unwrap()];
        let bonded = decisions
            .iter()
            .filter(|d| matches!(d, BondDecision::Bonded { .. }))
            .count();
        assert_eq!(bonded, 1);
        assert!(decisions.contains(&BondDecision::Skip(SkipReason::InsufficientLiquidity)));
        assert_eq!(h.engine.outstanding(&route_key()), Amount::from(1_000u64));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_duplicate_concurrent_evaluations_bond_once() {
        let t = transfer(1, 1_000);
        let h = harness(config(), &[&t], 100_000);
        h.submitter.confirm_delay_ms.store(20, Ordering::SeqCst);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let engine = Arc::clone(&h.engine);
                let t = t.clone();
                tokio::spawn(async move { engine.on_transfer_sent(t).await })
            })
            .collect();
        let mut bonded = 0;
        for task in tasks {
            match task.await.unwrap().unwrap() {
                BondDecision::Bonded { .. } => bonded += 1,
                BondDecision::AlreadyBonded | BondDecision::Defer(DeferReason::InFlight) => {}
                other => panic!("unexpected decision {other}"),
            }
        }
        assert_eq!(bonded, 1);
        assert_eq!(h.submitter.sends(), 1);
        assert_eq!(h.engine.outstanding(&route_key()), t.amount);
    }

    #[tokio::test]
    async fn test_restore_liquidity_from_ledger() {
        let t = transfer(1, 1_000);
        let h = harness(config(), &[&t], 10_000);
        h.ledger
            .record_bond(BondedWithdrawal {
                transfer_id: t.transfer_id,
                tx_hash: TxHash([9; 32]),
                amount: t.amount,
                bonder: config().bonder,
                bonded_at: NOW,
            })
            .unwrap();

        assert_eq!(h.engine.restore_liquidity(), 1);
        assert_eq!(h.engine.restore_liquidity(), 0);
        assert_eq!(h.engine.outstanding(&route_key()), t.amount);
    }

    #[tokio::test]
    async fn test_run_bonds_observed_transfers_until_shutdown() {
        let t = transfer(1, 1_000);
        let h = harness(config(), &[], 10_000);
        let bus = TransitionBus::new();
        let subscription = bus.subscribe(TransitionTopic::Transfers);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(Arc::clone(&h.engine).run(subscription, shutdown_rx));
        h.ledger.insert(t.clone());
        bus.publish(StoreTransition::TransferObserved { transfer: t.clone() });

        for _ in 0..100 {
            if h.ledger.record(&t.transfer_id).unwrap().bond.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(h.ledger.record(&t.transfer_id).unwrap().bond.is_some());

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(h.submitter.sends(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescan_picks_up_pending_transfers() {
        let t = transfer(1, 1_000);
        let h = harness(config(), &[&t], 10_000);
        let bus = TransitionBus::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(
            Arc::clone(&h.engine).run(bus.subscribe(TransitionTopic::Transfers), shutdown_rx),
        );
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(h.ledger.record(&t.transfer_id).unwrap().bond.is_some());

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
