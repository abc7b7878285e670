//! # Transfer State Store Service
//!
//! Single-writer append over the ledger log, with derived state behind a
//! read-write lock.
//!
//! ## Write Path
//!
//! 1. Take the writer mutex (one writer at a time)
//! 2. Classify each event against current state (dedupe, predecessor check)
//! 3. Persist accepted events, the sequence counter and any watermark in ONE
//!    atomic batch
//! 4. Fold the persisted events under the state write lock
//! 5. Publish the resulting transitions, still holding the writer mutex so
//!    subscribers see them in commit order
//!
//! Nothing is folded unless the batch write succeeded.

use bonder_telemetry::metrics::{STORE_EVENTS, STORE_UNRESOLVABLE_GAPS, SUBSYSTEM_ERRORS};
use parking_lot::{Mutex, RwLock};
use shared_bus::{StoreTransition, TransitionPublisher};
use shared_types::{
    BondedWithdrawal, Bundle, BundleId, CctpMessage, ChainEvent, ChainWatermark, Classified,
    EventKey, MessageHash, TimeSource, TransferId, TransferRecord, TxHash, WatermarkKey,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::domain::config::StoreConfig;
use crate::domain::errors::StoreError;
use crate::domain::ledger::{
    log_key, watermark_key, GapKey, LedgerEvent, StoredEvent, LOG_PREFIX, SEQ_KEY,
    WATERMARK_PREFIX,
};
use crate::domain::state::{Admission, LedgerState, UnresolvableGap};
use crate::ports::inbound::{ApplyOutcome, BatchReport, StoreSnapshot, TransferStateApi};
use crate::ports::outbound::{BatchOperation, KeyValueStore};

/// What happened to one event handed to the write path.
#[derive(Debug, Clone, PartialEq, Eq)]
enum EventOutcome {
    Applied,
    Duplicate,
    Buffered(GapKey),
    Refused(StoreError),
}

impl EventOutcome {
    fn label(&self) -> &'static str {
        match self {
            EventOutcome::Applied => "applied",
            EventOutcome::Duplicate => "duplicate",
            EventOutcome::Buffered(_) => "buffered",
            EventOutcome::Refused(_) => "refused",
        }
    }
}

struct Writer {
    kv: Box<dyn KeyValueStore>,
    next_seq: u64,
}

/// The transfer state store.
///
/// Holds the durable ledger log and the state derived from it. All
/// subsystems read through [`TransferStateApi`].
pub struct TransferStateStore {
    writer: Mutex<Writer>,
    state: RwLock<LedgerState>,
    publisher: Arc<dyn TransitionPublisher>,
    time: Arc<dyn TimeSource>,
    config: StoreConfig,
}

impl TransferStateStore {
    /// Open the store, folding the persisted log into fresh state.
    pub fn open(
        kv: Box<dyn KeyValueStore>,
        publisher: Arc<dyn TransitionPublisher>,
        time: Arc<dyn TimeSource>,
        config: StoreConfig,
    ) -> Result<Self, StoreError> {
        let log = load_log(kv.as_ref())?;

        let persisted_seq = match kv.get(SEQ_KEY)? {
            Some(bytes) => decode_seq(&bytes)?,
            None => 0,
        };
        let next_seq = persisted_seq.max(log.last().map_or(0, |e| e.seq + 1));

        let mut state = LedgerState::new();
        for stored in &log {
            state.fold(stored);
        }
        for (_, value) in kv.prefix_scan(WATERMARK_PREFIX)? {
            let watermark: ChainWatermark = bincode::deserialize(&value)?;
            state.set_watermark(watermark);
        }

        let unresolvable = state.unresolvable_gaps().len();
        STORE_UNRESOLVABLE_GAPS.set(unresolvable as f64);
        info!(
            events = log.len(),
            next_seq,
            buffered = state.buffered_events(),
            unresolvable,
            "[bn-02] Transfer store opened"
        );

        Ok(Self {
            writer: Mutex::new(Writer { kv, next_seq }),
            state: RwLock::new(state),
            publisher,
            time,
            config,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Events persisted but still waiting for a predecessor.
    pub fn buffered_events(&self) -> usize {
        self.state.read().buffered_events()
    }

    // =========================================================================
    // WRITE PATH
    // =========================================================================

    fn append(
        &self,
        events: Vec<(LedgerEvent, Option<WatermarkKey>)>,
        watermark: Option<ChainWatermark>,
    ) -> Result<Vec<EventOutcome>, StoreError> {
        let mut writer = self.writer.lock();
        let now = self.time.now();
        let mut seq = writer.next_seq;
        let mut persisted = Vec::with_capacity(events.len());
        let mut outcomes = Vec::with_capacity(events.len());
        let mut batch_keys = HashSet::new();

        {
            let state = self.state.read();
            for (event, source) in events {
                if let Some(key) = event.event_key() {
                    if !batch_keys.insert(key) {
                        outcomes.push(EventOutcome::Duplicate);
                        continue;
                    }
                }
                let outcome = match state.classify(&event) {
                    Admission::Ready => EventOutcome::Applied,
                    Admission::Missing(gap) => EventOutcome::Buffered(gap),
                    Admission::Duplicate => {
                        outcomes.push(EventOutcome::Duplicate);
                        continue;
                    }
                    Admission::Unresolvable(gap) => {
                        outcomes.push(EventOutcome::Refused(StoreError::UnresolvableGap { gap }));
                        continue;
                    }
                    Admission::Rejected(e) => {
                        outcomes.push(EventOutcome::Refused(e));
                        continue;
                    }
                };
                persisted.push(StoredEvent {
                    seq,
                    recorded_at: now,
                    source,
                    retracted: false,
                    event,
                });
                seq += 1;
                outcomes.push(outcome);
            }
        }

        if persisted.is_empty() && watermark.is_none() {
            record_outcomes(&outcomes);
            return Ok(outcomes);
        }

        let mut ops = Vec::with_capacity(persisted.len() + 2);
        for stored in &persisted {
            ops.push(BatchOperation::put(
                log_key(stored.seq),
                bincode::serialize(stored)?,
            ));
        }
        ops.push(BatchOperation::put(SEQ_KEY, seq.to_be_bytes().to_vec()));
        if let Some(wm) = &watermark {
            ops.push(BatchOperation::put(
                watermark_key(&wm.key),
                bincode::serialize(wm)?,
            ));
        }
        writer.kv.atomic_batch_write(ops)?;
        writer.next_seq = seq;

        let mut transitions = Vec::new();
        {
            let mut state = self.state.write();
            for stored in &persisted {
                transitions.extend(state.fold(stored));
            }
            if let Some(wm) = watermark {
                state.set_watermark(wm);
            }
        }

        for stored in &persisted {
            debug!(
                seq = stored.seq,
                event = stored.event.label(),
                "[bn-02] Event persisted"
            );
        }
        for transition in transitions {
            self.publisher.publish(transition);
        }
        record_outcomes(&outcomes);
        Ok(outcomes)
    }

    fn append_one(
        &self,
        event: LedgerEvent,
        source: Option<WatermarkKey>,
    ) -> Result<ApplyOutcome, StoreError> {
        let label = event.label();
        let mut outcomes = self.append(vec![(event, source)], None)?;
        match outcomes.pop() {
            Some(EventOutcome::Applied) => Ok(ApplyOutcome::Applied),
            Some(EventOutcome::Duplicate) | None => Ok(ApplyOutcome::Duplicate),
            Some(EventOutcome::Buffered(gap)) => {
                info!(%gap, event = label, "[bn-02] Event buffered behind missing predecessor");
                Err(StoreError::OutOfOrderEvent { gap })
            }
            Some(EventOutcome::Refused(e)) => {
                warn!(event = label, error = %e, "[bn-02] Event refused");
                Err(e)
            }
        }
    }
}

impl TransferStateApi for TransferStateStore {
    fn apply(&self, event: ChainEvent) -> Result<ApplyOutcome, StoreError> {
        let source = WatermarkKey {
            chain_id: event.meta().chain_id,
            kind: event.kind(),
        };
        self.append_one(LedgerEvent::Chain(event), Some(source))
    }

    fn commit_batch(
        &self,
        watermark: ChainWatermark,
        events: Vec<ChainEvent>,
    ) -> Result<BatchReport, StoreError> {
        let key = watermark.key;
        if let Some(foreign) = events
            .iter()
            .find(|ev| ev.meta().chain_id != key.chain_id || ev.kind() != key.kind)
        {
            return Err(StoreError::InvalidInput(format!(
                "event {} ({} on chain {}) does not belong to watcher {}",
                foreign.key(),
                foreign.kind(),
                foreign.meta().chain_id,
                key
            )));
        }
        if let Some(current) = self.state.read().watermark(&key) {
            if watermark.block_number < current.block_number {
                return Err(StoreError::InvalidInput(format!(
                    "watermark {} would move back from {} to {}",
                    key, current.block_number, watermark.block_number
                )));
            }
        }

        let tagged = events
            .into_iter()
            .map(|ev| (LedgerEvent::Chain(ev), Some(key)))
            .collect();
        let outcomes = self.append(tagged, Some(watermark))?;

        let mut report = BatchReport::default();
        for outcome in &outcomes {
            match outcome {
                EventOutcome::Applied => report.applied += 1,
                EventOutcome::Duplicate => report.duplicates += 1,
                EventOutcome::Buffered(gap) => {
                    info!(%gap, watcher = %key, "[bn-02] Event buffered behind missing predecessor");
                    report.buffered += 1;
                }
                EventOutcome::Refused(e) => {
                    warn!(watcher = %key, error = %e, "[bn-02] Event refused");
                    report.unresolvable += 1;
                }
            }
        }
        debug!(
            watcher = %key,
            block = watermark.block_number,
            applied = report.applied,
            duplicates = report.duplicates,
            buffered = report.buffered,
            "[bn-02] Batch committed"
        );
        Ok(report)
    }

    fn rollback(&self, watermark: ChainWatermark) -> Result<Vec<EventKey>, StoreError> {
        let mut writer = self.writer.lock();
        let key = watermark.key;
        let target = watermark.block_number;

        let log = load_log(writer.kv.as_ref())?;
        let mut ops = Vec::new();
        let mut retracted = Vec::new();
        let mut survivors = Vec::with_capacity(log.len());

        for mut stored in log {
            let above_target = stored.block_number().is_some_and(|b| b > target);
            if !stored.retracted && stored.source == Some(key) && above_target {
                stored.retracted = true;
                if let Some(event_key) = stored.event.event_key() {
                    retracted.push(event_key);
                }
                ops.push(BatchOperation::put(
                    log_key(stored.seq),
                    bincode::serialize(&stored)?,
                ));
            }
            survivors.push(stored);
        }

        // A rollback never moves the watermark forward.
        let current = self.state.read().watermark(&key);
        let new_watermark = match current {
            Some(c) if c.block_number < target => c,
            _ => watermark,
        };
        ops.push(BatchOperation::put(
            watermark_key(&key),
            bincode::serialize(&new_watermark)?,
        ));
        writer.kv.atomic_batch_write(ops)?;

        let mut rebuilt = LedgerState::new();
        for stored in &survivors {
            rebuilt.fold(stored);
        }
        {
            let mut state = self.state.write();
            for wm in state.watermarks() {
                rebuilt.set_watermark(wm);
            }
            rebuilt.set_watermark(new_watermark);
            *state = rebuilt;
        }

        warn!(
            watcher = %key,
            to_block = new_watermark.block_number,
            retracted = retracted.len(),
            "[bn-02] Rolled back after reorg"
        );
        STORE_EVENTS
            .with_label_values(&["retracted"])
            .inc_by(retracted.len() as f64);
        for event_key in &retracted {
            self.publisher.publish(StoreTransition::Retracted {
                key: *event_key,
                kind: key.kind,
            });
        }
        self.publisher.publish(StoreTransition::StateRebuilt);

        Ok(retracted)
    }

    fn sweep_gaps(&self, now: u64) -> Result<Vec<UnresolvableGap>, StoreError> {
        let Some(cutoff) = now.checked_sub(self.config.gap_timeout_secs) else {
            return Ok(Vec::new());
        };
        let expired = self.state.read().expired_gaps(cutoff);
        if expired.is_empty() {
            return Ok(Vec::new());
        }

        let events = expired
            .iter()
            .map(|gap| (LedgerEvent::GapEscalated { gap: *gap, at: now }, None))
            .collect();
        self.append(events, None)?;

        let all = self.state.read().unresolvable_gaps();
        STORE_UNRESOLVABLE_GAPS.set(all.len() as f64);
        let escalated: Vec<_> = all
            .into_iter()
            .filter(|g| expired.contains(&g.gap) && g.escalated_at == now)
            .collect();
        for gap in &escalated {
            error!(
                gap = %gap.gap,
                events = gap.events,
                buffered_since = gap.buffered_since,
                "[bn-02] Unresolvable gap: predecessor never arrived"
            );
            SUBSYSTEM_ERRORS
                .with_label_values(&["bn-02", "unresolvable_gap"])
                .inc();
        }
        Ok(escalated)
    }

    fn record_bond(&self, bond: BondedWithdrawal) -> Result<ApplyOutcome, StoreError> {
        self.append_one(LedgerEvent::BondRecorded(bond), None)
    }

    fn mark_unbondable(
        &self,
        transfer_id: TransferId,
        reason: String,
    ) -> Result<ApplyOutcome, StoreError> {
        self.append_one(
            LedgerEvent::MarkedUnbondable {
                transfer_id,
                reason,
            },
            None,
        )
    }

    fn record_relayed(
        &self,
        message_hash: MessageHash,
        tx_hash: Option<TxHash>,
    ) -> Result<ApplyOutcome, StoreError> {
        self.append_one(
            LedgerEvent::MessageRelayed {
                message_hash,
                tx_hash,
            },
            None,
        )
    }

    fn get(&self, transfer_id: &TransferId) -> Option<TransferRecord> {
        self.state.read().transfer(transfer_id).cloned()
    }

    fn bundle(&self, bundle_id: &BundleId) -> Option<Bundle> {
        self.state.read().bundle(bundle_id).cloned()
    }

    fn message(&self, message_hash: &MessageHash) -> Option<CctpMessage> {
        self.state.read().message(message_hash).cloned()
    }

    fn message_by_nonce(&self, source_domain: u32, nonce: u64) -> Option<CctpMessage> {
        self.state
            .read()
            .message_by_nonce(source_domain, nonce)
            .cloned()
    }

    fn query(&self, predicate: &dyn Fn(&TransferRecord) -> bool) -> Vec<TransferRecord> {
        self.state
            .read()
            .transfers()
            .filter(|r| predicate(r))
            .cloned()
            .collect()
    }

    fn query_bundles(&self, predicate: &dyn Fn(&Bundle) -> bool) -> Vec<Bundle> {
        self.state
            .read()
            .bundles()
            .filter(|b| predicate(b))
            .cloned()
            .collect()
    }

    fn query_messages(&self, predicate: &dyn Fn(&CctpMessage) -> bool) -> Vec<CctpMessage> {
        self.state
            .read()
            .messages()
            .filter(|m| predicate(m))
            .cloned()
            .collect()
    }

    fn watermark(&self, key: &WatermarkKey) -> Option<ChainWatermark> {
        self.state.read().watermark(key)
    }

    fn watermarks(&self) -> Vec<ChainWatermark> {
        self.state.read().watermarks()
    }

    fn unresolvable_gaps(&self) -> Vec<UnresolvableGap> {
        self.state.read().unresolvable_gaps()
    }

    fn snapshot(&self) -> StoreSnapshot {
        let state = self.state.read();
        let mut transfers: Vec<_> = state.transfers().cloned().collect();
        transfers.sort_by_key(|r| r.id());
        let mut bundles: Vec<_> = state.bundles().cloned().collect();
        bundles.sort_by_key(|b| b.bundle_id);
        let mut messages: Vec<_> = state.messages().cloned().collect();
        messages.sort_by_key(|m| m.message_hash);
        StoreSnapshot {
            transfers,
            bundles,
            messages,
            watermarks: state.watermarks(),
            unresolvable: state.unresolvable_gaps(),
            buffered_events: state.buffered_events(),
        }
    }
}

fn load_log(kv: &dyn KeyValueStore) -> Result<Vec<StoredEvent>, StoreError> {
    let mut log = kv
        .prefix_scan(LOG_PREFIX)?
        .into_iter()
        .map(|(_, value)| bincode::deserialize::<StoredEvent>(&value))
        .collect::<Result<Vec<_>, _>>()?;
    log.sort_by_key(|e| e.seq);
    Ok(log)
}

fn decode_seq(bytes: &[u8]) -> Result<u64, StoreError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::Serialization(format!("bad sequence length {}", bytes.len())))?;
    Ok(u64::from_be_bytes(arr))
}

fn record_outcomes(outcomes: &[EventOutcome]) {
    for outcome in outcomes {
        STORE_EVENTS.with_label_values(&[outcome.label()]).inc();
        if let EventOutcome::Refused(e) = outcome {
            SUBSYSTEM_ERRORS
                .with_label_values(&["bn-02", e.class().name()])
                .inc();
        }
    }
}
