//! # Settlement Coordinator Service
//!
//! Follows bundles from commitment to on-chain settlement:
//!
//! - on commit, records which members still lack a bond;
//! - on each bond or unbondable verdict, checks the member off;
//! - on settlement, releases the liquidity held for bonded members;
//! - on each tick, escalates bundles still missing bonds past the deadline.
//!
//! With `auto_settle`, reconciled bundles are claimed for settlement as soon
//! as they qualify. A bundle whose settlement failed is claimed again only
//! by the periodic tick, once its backoff has elapsed.
//!
//! Every decision re-reads member state from the ledger, so the order in
//! which bundle and transfer transitions arrive does not matter.

use async_trait::async_trait;
use bonder_telemetry::metrics::{
    SETTLEMENT_INCOMPLETE, SETTLEMENT_PENDING, SETTLEMENT_RELEASES, SUBSYSTEM_ERRORS,
};
use parking_lot::Mutex;
use shared_bus::{StoreTransition, Subscription, SubscriptionError};
use shared_resilience::RetryExecutor;
use shared_types::{
    Amount, Bundle, BundleId, Classified, ContractCall, ErrorClass, EventKind, PreparedTx,
    RouteKey, SubmitError, TimeSource, TransactionSubmitter, TransferId, TransferState, TxHash,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::domain::config::SettlementConfig;
use crate::domain::errors::SettlementError;
use crate::domain::reconciliation::{
    IncompleteSettlement, ReconcileStatus, Reconciliation, ReconciliationBook,
};
use crate::ports::inbound::SettlementApi;
use crate::ports::outbound::{LiquidityReleaser, SettlementLedger};

#[derive(Clone)]
pub struct SettlementPorts {
    pub ledger: Arc<dyn SettlementLedger>,
    pub releaser: Arc<dyn LiquidityReleaser>,
    pub submitter: Arc<dyn TransactionSubmitter>,
    pub time: Arc<dyn TimeSource>,
}

/// Backoff of a bundle whose settlement failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleRetry {
    pub failures: u32,
    pub retry_after: u64,
}

/// The store's transition feeds the coordinator consumes.
pub struct SettlementFeeds {
    pub transfers: Subscription,
    pub bundles: Subscription,
    pub retractions: Subscription,
}

pub struct SettlementCoordinator {
    config: SettlementConfig,
    ports: SettlementPorts,
    retry: RetryExecutor,
    book: Mutex<ReconciliationBook>,
    /// Bundles with a settlement submitted and not yet observed.
    settling: Mutex<HashSet<BundleId>>,
    retries: Mutex<HashMap<BundleId, SettleRetry>>,
}

impl SettlementCoordinator {
    pub fn new(
        config: SettlementConfig,
        ports: SettlementPorts,
        retry: RetryExecutor,
    ) -> Result<Self, SettlementError> {
        config.validate()?;
        let book = ReconciliationBook::new(config.reconcile_timeout_secs);
        Ok(Self {
            config,
            ports,
            retry,
            book: Mutex::new(book),
            settling: Mutex::new(HashSet::new()),
            retries: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    pub fn reconciliation(&self, bundle_id: &BundleId) -> Option<Reconciliation> {
        self.book.lock().get(bundle_id).cloned()
    }

    pub fn settle_retry(&self, bundle_id: &BundleId) -> Option<SettleRetry> {
        self.retries.lock().get(bundle_id).copied()
    }

    /// Bonded or marked unbondable.
    fn is_accounted(&self, transfer_id: &TransferId) -> bool {
        self.ports
            .ledger
            .transfer(transfer_id)
            .is_some_and(|r| r.is_bonded() || r.unbondable.is_some())
    }

    fn update_gauge(&self, book: &ReconciliationBook) {
        SETTLEMENT_PENDING.set(book.waiting_count() as f64);
    }

    /// Rebuild the book from the ledger. Returns the number of bundles
    /// still tracked.
    pub fn resync(&self) -> usize {
        let bundles = self.ports.ledger.open_bundles();
        self.book.lock().clear();
        for bundle in &bundles {
            self.on_bundle_committed(bundle);
            if bundle.is_settled() {
                self.apply_settlement(bundle);
            }
        }
        let mut book = self.book.lock();
        book.forget_untracked_escalations();
        self.update_gauge(&book);
        info!(bundles = bundles.len(), tracked = book.len(), "[bn-04] Reconciliations rebuilt from ledger");
        book.len()
    }

    fn apply_settlement(&self, bundle: &Bundle) -> ReconcileStatus {
        for member in &bundle.members {
            let bonded = self
                .ports
                .ledger
                .transfer(member)
                .is_some_and(|r| r.is_bonded());
            if bonded {
                self.on_transfer_settled(member);
            }
        }
        let now = self.ports.time.now();
        let mut book = self.book.lock();
        let status = book.settled(bundle, |id| self.is_accounted(id), now);
        self.update_gauge(&book);
        status
    }

    // =========================================================================
    // AUTO-SETTLE
    // =========================================================================

    /// Share of the bundle amount bonded by this node reaches the threshold.
    fn meets_threshold(&self, bundle: &Bundle) -> bool {
        if bundle.total_amount.is_zero() {
            return false;
        }
        let ours = bundle
            .members
            .iter()
            .filter_map(|id| self.ports.ledger.transfer(id))
            .filter_map(|r| r.bond)
            .filter(|b| b.bonder == self.config.bonder)
            .fold(Amount::zero(), |acc, b| acc.saturating_add(b.amount));
        let percent = Amount::from(self.config.settle_threshold_percent);
        ours.saturating_mul(Amount::from(100u64)) >= bundle.total_amount.saturating_mul(percent)
    }

    /// Reconciled committed bundles this node should settle now and has
    /// not failed to settle before. Returned bundles are claimed until the
    /// submission finishes.
    pub fn settle_candidates(&self) -> Vec<BundleId> {
        self.claim(None)
    }

    /// Like [`settle_candidates`](Self::settle_candidates), plus failed
    /// bundles whose backoff has elapsed at `now`.
    pub fn retry_candidates(&self, now: u64) -> Vec<BundleId> {
        self.claim(Some(now))
    }

    fn claim(&self, retry_at: Option<u64>) -> Vec<BundleId> {
        if !self.config.auto_settle {
            return Vec::new();
        }
        let reconciled = self.book.lock().reconciled_committed();
        let mut claimed = Vec::new();
        for bundle_id in reconciled {
            let backing_off = self
                .retries
                .lock()
                .get(&bundle_id)
                .is_some_and(|r| retry_at.map_or(true, |now| now < r.retry_after));
            if backing_off {
                continue;
            }
            let Some(bundle) = self.ports.ledger.bundle(&bundle_id) else {
                continue;
            };
            if bundle.is_settled() || !self.meets_threshold(&bundle) {
                continue;
            }
            if self.settling.lock().insert(bundle_id) {
                claimed.push(bundle_id);
            }
        }
        claimed
    }

    fn record_failure(&self, bundle_id: BundleId) -> SettleRetry {
        let now = self.ports.time.now();
        let mut retries = self.retries.lock();
        let failures = retries.get(&bundle_id).map_or(0, |r| r.failures).saturating_add(1);
        let retry = SettleRetry {
            failures,
            retry_after: now.saturating_add(self.config.settle_retry_delay(failures)),
        };
        retries.insert(bundle_id, retry);
        retry
    }

    async fn submit_settlement(&self, bundle: &Bundle) -> Result<TxHash, SettlementError> {
        let route = RouteKey::new(bundle.token.clone(), bundle.destination_chain);
        let bridge = self
            .config
            .bridge(&route)
            .ok_or_else(|| SettlementError::NoBridge(route))?;
        let tx = PreparedTx {
            chain_id: bundle.destination_chain,
            to: bridge,
            call: ContractCall::SettleBondedWithdrawals {
                bonder: self.config.bonder,
                transfer_ids: bundle.members.clone(),
                total_amount: bundle.total_amount,
            },
            gas_limit: None,
            max_gas_price: None,
        };
        let submitter = &self.ports.submitter;
        let submission = async {
            let tx_hash = self
                .retry
                .run_while("send_settlement", || submitter.send(&tx), SubmitError::is_retryable)
                .await?;
            let receipt = self
                .retry
                .run_while(
                    "confirm_settlement",
                    || submitter.wait_for_confirmation(tx.chain_id, tx_hash),
                    SubmitError::is_retryable,
                )
                .await?;
            if receipt.success {
                Ok(tx_hash)
            } else {
                Err(SubmitError::Reverted { tx_hash })
            }
        };
        submission
            .await
            .map_err(|source| SettlementError::Submission {
                bundle_id: bundle.bundle_id,
                source,
            })
    }

    // =========================================================================
    // RUN LOOP
    // =========================================================================

    /// Dispatch one store transition.
    pub fn handle(&self, transition: &StoreTransition) {
        match transition {
            StoreTransition::TransferAdvanced {
                transfer_id,
                from,
                to,
            } => {
                if *from == TransferState::Sent {
                    self.on_transfer_accounted(transfer_id);
                }
                if *to == TransferState::Settled {
                    self.on_transfer_settled(transfer_id);
                }
            }
            StoreTransition::TransferUnbondable { transfer_id, .. } => {
                self.on_transfer_accounted(transfer_id)
            }
            StoreTransition::BundleCommitted { bundle } => {
                self.on_bundle_committed(bundle);
            }
            StoreTransition::BundleSettled { bundle_id, .. } => {
                if let Err(e) = self.on_bundle_settled(bundle_id) {
                    warn!(%bundle_id, error = %e, "[bn-04] Settlement not reconciled");
                }
            }
            StoreTransition::Retracted { kind, .. } => match kind {
                EventKind::TransferSent
                | EventKind::WithdrawalBonded
                | EventKind::BundleCommitted
                | EventKind::BundleSettled => {
                    self.resync();
                }
                EventKind::MessageSent | EventKind::MessageReceived => {}
            },
            StoreTransition::StateRebuilt => {
                self.resync();
            }
            StoreTransition::TransferObserved { .. }
            | StoreTransition::MessageObserved { .. }
            | StoreTransition::MessageRelayed { .. } => {}
        }
    }

    /// Handle one received transition. `false` once the bus is gone.
    fn receive(&self, received: Result<StoreTransition, SubscriptionError>) -> bool {
        match received {
            Ok(transition) => {
                self.handle(&transition);
                true
            }
            Err(e) => {
                warn!(error = %e, "[bn-04] Transition bus closed");
                false
            }
        }
    }

    /// Consume store transitions and tick until `shutdown` flips. In-flight
    /// settlement submissions finish before this returns.
    pub async fn run(self: Arc<Self>, mut feeds: SettlementFeeds, mut shutdown: watch::Receiver<bool>) {
        let tracked = self.resync();
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.tick_interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tasks = JoinSet::new();

        info!(tracked, auto_settle = self.config.auto_settle, "[bn-04] Settlement coordinator started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            let mut retry_at = None;
            let open = tokio::select! {
                changed = shutdown.changed() => changed.is_ok(),
                received = feeds.transfers.recv() => self.receive(received),
                received = feeds.bundles.recv() => self.receive(received),
                received = feeds.retractions.recv() => self.receive(received),
                _ = ticker.tick() => {
                    let missed = feeds.transfers.take_missed()
                        + feeds.bundles.take_missed()
                        + feeds.retractions.take_missed();
                    if missed > 0 {
                        warn!(missed, "[bn-04] Missed transitions, rebuilding from ledger");
                        self.resync();
                    }
                    let now = self.ports.time.now();
                    self.tick(now);
                    retry_at = Some(now);
                    true
                }
                Some(joined) = tasks.join_next() => {
                    if let Err(e) = joined {
                        error!(error = %e, "[bn-04] Settlement task panicked");
                    }
                    true
                }
            };
            if !open {
                break;
            }
            let candidates = match retry_at {
                Some(now) => self.retry_candidates(now),
                None => self.settle_candidates(),
            };
            for bundle_id in candidates {
                let coordinator = Arc::clone(&self);
                tasks.spawn(async move {
                    let _ = coordinator.settle_bundle(bundle_id).await;
                });
            }
        }

        while tasks.join_next().await.is_some() {}
        info!("[bn-04] Settlement coordinator stopped");
    }
}

#[async_trait]
impl SettlementApi for SettlementCoordinator {
    fn on_bundle_committed(&self, bundle: &Bundle) -> ReconcileStatus {
        let mut book = self.book.lock();
        let status = book.register(bundle, |id| self.is_accounted(id));
        self.update_gauge(&book);
        drop(book);

        match status {
            ReconcileStatus::Reconciled => {
                debug!(bundle_id = %bundle.bundle_id, members = bundle.members.len(), "[bn-04] Bundle committed, all members accounted")
            }
            ReconcileStatus::Pending { deadline } => {
                info!(bundle_id = %bundle.bundle_id, members = bundle.members.len(), deadline, "[bn-04] Bundle committed with unbonded members")
            }
            ReconcileStatus::Incomplete { .. } => {}
        }
        status
    }

    fn on_transfer_accounted(&self, transfer_id: &TransferId) {
        let mut book = self.book.lock();
        let progress = book.accounted(transfer_id);
        self.update_gauge(&book);
        drop(book);

        let Some(progress) = progress else {
            return;
        };
        if progress.recovered {
            info!(bundle_id = %progress.bundle_id, %transfer_id, phase = progress.phase.name(), "[bn-04] Incomplete settlement recovered");
        } else if progress.status == ReconcileStatus::Reconciled {
            info!(bundle_id = %progress.bundle_id, phase = progress.phase.name(), "[bn-04] Bundle reconciled");
        }
    }

    fn on_bundle_settled(&self, bundle_id: &BundleId) -> Result<ReconcileStatus, SettlementError> {
        let bundle = self
            .ports
            .ledger
            .bundle(bundle_id)
            .ok_or(SettlementError::UnknownBundle(*bundle_id))?;
        let status = self.apply_settlement(&bundle);
        self.settling.lock().remove(bundle_id);
        self.retries.lock().remove(bundle_id);

        match status {
            ReconcileStatus::Reconciled => {
                info!(%bundle_id, members = bundle.members.len(), "[bn-04] Bundle settled and reconciled")
            }
            ReconcileStatus::Pending { deadline } | ReconcileStatus::Incomplete { deadline, .. } => {
                warn!(%bundle_id, deadline, "[bn-04] Bundle settled with unbonded members")
            }
        }
        Ok(status)
    }

    fn on_transfer_settled(&self, transfer_id: &TransferId) -> Option<Amount> {
        let released = self.ports.releaser.release(transfer_id)?;
        SETTLEMENT_RELEASES.inc();
        debug!(%transfer_id, amount = %released, "[bn-04] Liquidity released");
        Some(released)
    }

    fn tick(&self, now: u64) -> Vec<IncompleteSettlement> {
        let mut book = self.book.lock();
        let escalated = book.expire(now);
        self.update_gauge(&book);
        drop(book);

        for incomplete in &escalated {
            error!(
                bundle_id = %incomplete.bundle_id,
                route = %incomplete.route,
                phase = incomplete.phase.name(),
                missing = incomplete.missing.len(),
                deadline = incomplete.deadline,
                "[bn-04] Incomplete settlement: members not bonded before deadline"
            );
            SETTLEMENT_INCOMPLETE.inc();
            SUBSYSTEM_ERRORS
                .with_label_values(&["bn-04", ErrorClass::IncompleteSettlement.name()])
                .inc();
        }
        escalated
    }

    fn incomplete_settlements(&self) -> Vec<IncompleteSettlement> {
        self.book.lock().incomplete()
    }

    async fn settle_bundle(&self, bundle_id: BundleId) -> Result<TxHash, SettlementError> {
        let result = match self.ports.ledger.bundle(&bundle_id) {
            Some(bundle) => self.submit_settlement(&bundle).await,
            None => Err(SettlementError::UnknownBundle(bundle_id)),
        };
        match &result {
            Ok(tx_hash) => {
                self.retries.lock().remove(&bundle_id);
                info!(%bundle_id, %tx_hash, "[bn-04] Settlement confirmed, waiting for the settle event")
            }
            Err(e) => {
                let retry = self.record_failure(bundle_id);
                self.settling.lock().remove(&bundle_id);
                warn!(
                    %bundle_id,
                    error = %e,
                    failures = retry.failures,
                    retry_after = retry.retry_after,
                    "[bn-04] Settlement submission failed"
                );
                SUBSYSTEM_ERRORS
                    .with_label_values(&["bn-04", e.class().name()])
                    .inc();
            }
        }
        result
    }
}
