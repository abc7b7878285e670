//! # Attestation Relayer Service
//!
//! One task per unrelayed message. Each cycle:
//!
//! 1. stops if the store already saw the message received on its destination;
//! 2. polls the attestation service (throttled) until an attestation arrives;
//! 3. waits out the pair's minimum delay;
//! 4. checks the destination nonce, then submits `receiveMessage`.
//!
//! Attestation failures never end a task; only shutdown, a relay, or a fatal
//! configuration error does. A submission in flight when shutdown arrives
//! finishes and is recorded first.

use async_trait::async_trait;
use bonder_telemetry::metrics::{
    RELAY_ATTESTATION_POLLS, RELAY_IN_FLIGHT, RELAY_RELAYED, SUBSYSTEM_ERRORS,
};
use dashmap::DashMap;
use shared_bus::{StoreTransition, Subscription};
use shared_resilience::{OutboundThrottle, RetryExecutor};
use shared_types::{
    CctpMessage, ChainReadError, Classified, ContractCall, MessageHash, PreparedTx, SubmitError,
    TimeSource, TransactionSubmitter, TxHash,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::domain::config::RelayConfig;
use crate::domain::errors::{AttestationError, RelayError};
use crate::domain::state::{AttestationStep, RelayMachine, RelayState};
use crate::ports::inbound::{RelayApi, RelayOutcome};
use crate::ports::outbound::{AttestationService, NonceChecker, RelayLedger};

#[derive(Clone)]
pub struct RelayPorts {
    pub attestation: Arc<dyn AttestationService>,
    pub nonces: Arc<dyn NonceChecker>,
    pub ledger: Arc<dyn RelayLedger>,
    pub submitter: Arc<dyn TransactionSubmitter>,
    pub time: Arc<dyn TimeSource>,
}

/// Result of one relay cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Come back after this many seconds.
    Wait(u64),
    Done(RelayOutcome),
}

pub struct AttestationRelayer {
    config: RelayConfig,
    ports: RelayPorts,
    throttle: OutboundThrottle,
    retry: RetryExecutor,
    /// Messages with a live task and their last known state.
    active: DashMap<MessageHash, RelayState>,
}

impl AttestationRelayer {
    pub fn new(
        config: RelayConfig,
        ports: RelayPorts,
        retry: RetryExecutor,
    ) -> Result<Self, RelayError> {
        config.validate()?;
        let throttle = OutboundThrottle::new(config.throttle);
        Ok(Self {
            config,
            ports,
            throttle,
            retry,
            active: DashMap::new(),
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn machine_for(&self, message: &CctpMessage) -> RelayMachine {
        let delay = self
            .config
            .delays
            .delay_secs(message.source_chain, message.destination_chain);
        RelayMachine::new(message, delay)
    }

    fn claim(&self, message_hash: MessageHash) -> bool {
        let claimed = match self.active.entry(message_hash) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(RelayState::Observed);
                true
            }
        };
        RELAY_IN_FLIGHT.set(self.active.len() as f64);
        claimed
    }

    fn release(&self, message_hash: &MessageHash) {
        self.active.remove(message_hash);
        RELAY_IN_FLIGHT.set(self.active.len() as f64);
    }

    // =========================================================================
    // ONE CYCLE
    // =========================================================================

    /// Advance `machine` as far as the current time and the attestation
    /// service allow.
    pub async fn step(
        &self,
        message: &CctpMessage,
        machine: &mut RelayMachine,
    ) -> Result<Step, RelayError> {
        if machine.state() == RelayState::Observed {
            machine.observe()?;
        }
        let relayed = self
            .ports
            .ledger
            .message(&message.message_hash)
            .is_some_and(|m| m.is_relayed());
        if relayed {
            machine.on_relayed_elsewhere()?;
            return Ok(Step::Done(RelayOutcome::RelayedElsewhere));
        }

        let now = self.ports.time.now();
        if machine.attestation().is_none() {
            if let Some(wait) = self.poll(machine, now).await? {
                return Ok(Step::Wait(wait));
            }
        }
        if !machine.ready_to_relay(now) {
            let remaining = machine.remaining_delay(now);
            debug!(message_hash = %machine.message_hash(), remaining, "[bn-05] Attested, waiting out the confirmation delay");
            return Ok(Step::Wait(remaining.clamp(1, self.config.poll_interval_secs)));
        }
        self.relay(message, machine).await.map(Step::Done)
    }

    /// Fetch the attestation once. `Some(wait)` when there is nothing to
    /// relay yet.
    async fn poll(&self, machine: &mut RelayMachine, now: u64) -> Result<Option<u64>, RelayError> {
        let message_hash = machine.message_hash();
        let fetched = match self.throttle.acquire().await {
            Ok(_permit) => self.ports.attestation.fetch(&message_hash).await,
            Err(e) => Err(AttestationError::Http(e.to_string())),
        };
        let step = match fetched {
            Ok(response) => machine.on_attestation(response, now)?,
            Err(e) => {
                let failures = machine.on_attestation_error()?;
                RELAY_ATTESTATION_POLLS.with_label_values(&["error"]).inc();
                SUBSYSTEM_ERRORS
                    .with_label_values(&["bn-05", e.class().name()])
                    .inc();
                warn!(%message_hash, failures, error = %e, "[bn-05] Attestation fetch failed, retrying");
                return Ok(Some(self.config.poll_interval_secs));
            }
        };
        match step {
            AttestationStep::NotReady => {
                RELAY_ATTESTATION_POLLS.with_label_values(&["pending"]).inc();
                Ok(Some(self.config.poll_interval_secs))
            }
            AttestationStep::Delayed { remaining_secs } => {
                RELAY_ATTESTATION_POLLS.with_label_values(&["complete"]).inc();
                info!(%message_hash, remaining_secs, "[bn-05] Attestation received before the confirmation delay");
                Ok(Some(remaining_secs.clamp(1, self.config.poll_interval_secs)))
            }
            AttestationStep::Attested => {
                RELAY_ATTESTATION_POLLS.with_label_values(&["complete"]).inc();
                info!(%message_hash, "[bn-05] Message attested");
                Ok(None)
            }
        }
    }

    async fn relay(
        &self,
        message: &CctpMessage,
        machine: &mut RelayMachine,
    ) -> Result<RelayOutcome, RelayError> {
        let destination = message.destination_chain;
        let nonces = &self.ports.nonces;
        let used = self
            .retry
            .run_while(
                "check_nonce",
                || nonces.is_nonce_used(destination, message.source_domain, message.nonce),
                ChainReadError::is_retryable,
            )
            .await
            .map_err(|source| RelayError::NonceCheck {
                chain: destination,
                source,
            })?;
        if used {
            machine.on_relayed_elsewhere()?;
            info!(message_hash = %message.message_hash, nonce = message.nonce, "[bn-05] Nonce already used on destination");
            self.record(message.message_hash, None);
            return Ok(RelayOutcome::RelayedElsewhere);
        }

        let transmitter = self
            .config
            .transmitter(destination)
            .ok_or(RelayError::NoTransmitter(destination))?;
        let tx = PreparedTx {
            chain_id: destination,
            to: transmitter,
            call: ContractCall::ReceiveMessage {
                message: message.message.clone(),
                attestation: machine.attestation().map(<[u8]>::to_vec).unwrap_or_default(),
            },
            gas_limit: None,
            max_gas_price: None,
        };

        let submitter = &self.ports.submitter;
        let submission = async {
            let tx_hash = self
                .retry
                .run_while("send_relay", || submitter.send(&tx), SubmitError::is_retryable)
                .await?;
            let receipt = self
                .retry
                .run_while(
                    "confirm_relay",
                    || submitter.wait_for_confirmation(destination, tx_hash),
                    SubmitError::is_retryable,
                )
                .await?;
            if receipt.success {
                Ok(tx_hash)
            } else {
                Err(SubmitError::Reverted { tx_hash })
            }
        };
        let tx_hash: TxHash = submission
            .await
            .map_err(|source| RelayError::Submission {
                message_hash: message.message_hash,
                source,
            })?;

        machine.on_relayed(tx_hash)?;
        RELAY_RELAYED.inc();
        info!(message_hash = %message.message_hash, %tx_hash, chain = %destination, "[bn-05] Message relayed");
        self.record(message.message_hash, Some(tx_hash));
        Ok(RelayOutcome::Relayed { tx_hash })
    }

    /// The watcher also observes `MessageReceived`, so a failed write here
    /// is recovered from the chain.
    fn record(&self, message_hash: MessageHash, tx_hash: Option<TxHash>) {
        if let Err(e) = self.ports.ledger.record_relayed(message_hash, tx_hash) {
            error!(%message_hash, error = %e, "[bn-05] Relay confirmed but not recorded");
        }
    }

    // =========================================================================
    // TASKS
    // =========================================================================

    async fn drive(
        &self,
        message: CctpMessage,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<RelayOutcome, RelayError> {
        let message_hash = message.message_hash;
        let mut machine = self.machine_for(&message);
        loop {
            if *shutdown.borrow() {
                return Ok(RelayOutcome::Interrupted {
                    state: machine.state(),
                });
            }
            let wait = match self.step(&message, &mut machine).await {
                Ok(Step::Done(outcome)) => return Ok(outcome),
                Ok(Step::Wait(secs)) => secs,
                Err(e) if e.class().is_fatal() || matches!(e, RelayError::InvalidTransition { .. }) => {
                    return Err(e)
                }
                Err(e) => {
                    SUBSYSTEM_ERRORS
                        .with_label_values(&["bn-05", e.class().name()])
                        .inc();
                    warn!(%message_hash, state = %machine.state(), error = %e, "[bn-05] Relay attempt failed, retrying");
                    self.config.poll_interval_secs
                }
            };
            self.active.insert(message_hash, machine.state());
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(wait)) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return Ok(RelayOutcome::Interrupted { state: machine.state() });
                    }
                }
            }
        }
    }

    fn spawn_relay(
        self: &Arc<Self>,
        tasks: &mut JoinSet<()>,
        message: CctpMessage,
        shutdown: &watch::Receiver<bool>,
    ) {
        if message.is_relayed() || !self.claim(message.message_hash) {
            return;
        }
        let relayer = Arc::clone(self);
        let shutdown = shutdown.clone();
        tasks.spawn(async move {
            let message_hash = message.message_hash;
            let result = relayer.drive(message, shutdown).await;
            relayer.release(&message_hash);
            match result {
                Ok(outcome) => debug!(%message_hash, ?outcome, "[bn-05] Relay task finished"),
                Err(e) => {
                    SUBSYSTEM_ERRORS
                        .with_label_values(&["bn-05", e.class().name()])
                        .inc();
                    error!(%message_hash, error = %e, "[bn-05] Relay task stopped");
                }
            }
        });
    }

    /// Spawn tasks for every unrelayed message in the store.
    fn rehydrate(
        self: &Arc<Self>,
        tasks: &mut JoinSet<()>,
        shutdown: &watch::Receiver<bool>,
    ) -> usize {
        let pending = self.ports.ledger.pending_messages();
        let count = pending.len();
        for message in pending {
            self.spawn_relay(tasks, message, shutdown);
        }
        count
    }

    /// Follow observed messages until `shutdown` flips, then wait for every
    /// relay task to stop.
    pub async fn run(self: Arc<Self>, mut messages: Subscription, mut shutdown: watch::Receiver<bool>) {
        let mut tasks = JoinSet::new();
        let pending = self.rehydrate(&mut tasks, &shutdown);
        let mut resync = tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs));
        resync.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(pending, "[bn-05] Attestation relayer started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                received = messages.recv() => match received {
                    Ok(StoreTransition::MessageObserved { message }) => {
                        self.spawn_relay(&mut tasks, message, &shutdown);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "[bn-05] Transition bus closed");
                        break;
                    }
                },
                _ = resync.tick() => {
                    let missed = messages.take_missed();
                    if missed > 0 {
                        warn!(missed, "[bn-05] Missed transitions, rehydrating from the store");
                        self.rehydrate(&mut tasks, &shutdown);
                    }
                }
                Some(joined) = tasks.join_next() => {
                    if let Err(e) = joined {
                        error!(error = %e, "[bn-05] Relay task panicked");
                    }
                }
            }
        }

        while tasks.join_next().await.is_some() {}
        info!("[bn-05] Attestation relayer stopped");
    }
}

#[async_trait]
impl RelayApi for AttestationRelayer {
    async fn relay_message(
        &self,
        message: CctpMessage,
        shutdown: watch::Receiver<bool>,
    ) -> Result<RelayOutcome, RelayError> {
        let message_hash = message.message_hash;
        if !self.claim(message_hash) {
            return Err(RelayError::AlreadyActive(message_hash));
        }
        let result = self.drive(message, shutdown).await;
        self.release(&message_hash);
        result
    }

    fn state_of(&self, message_hash: &MessageHash) -> Option<RelayState> {
        self.active.get(message_hash).map(|s| *s)
    }

    fn in_flight(&self) -> usize {
        self.active.len()
    }
}
