//! Port doubles and fixtures for the relayer tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{
    Address, CctpMessage, ChainId, ChainReadError, MessageHash, PreparedTx, RelayStatus,
    SubmitError, TransactionSubmitter, TxHash, TxReceipt,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::domain::errors::{AttestationError, LedgerError};
use crate::domain::state::AttestationResponse;
use crate::ports::outbound::{AttestationService, NonceChecker, RelayLedger};

pub const SOURCE: ChainId = ChainId(1);
pub const DESTINATION: ChainId = ChainId(10);
pub const TRANSMITTER: Address = Address([0x7e; 20]);

pub fn message(n: u8, observed_at: u64) -> CctpMessage {
    let bytes = vec![n; 120];
    CctpMessage {
        message_hash: MessageHash::of(&bytes),
        source_chain: SOURCE,
        destination_chain: DESTINATION,
        source_domain: 0,
        destination_domain: 2,
        nonce: u64::from(n),
        message: bytes,
        observed_at,
        relay: RelayStatus::Pending,
    }
}

pub fn attested() -> AttestationResponse {
    AttestationResponse::Complete {
        attestation: vec![0xa7; 65],
    }
}

/// Answers from `script` first, then `fallback` forever.
pub struct MockAttestation {
    pub script: Mutex<VecDeque<Result<AttestationResponse, AttestationError>>>,
    pub fallback: Mutex<AttestationResponse>,
    pub calls: AtomicUsize,
}

impl MockAttestation {
    pub fn answering(fallback: AttestationResponse) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(fallback),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn then(self, reply: Result<AttestationResponse, AttestationError>) -> Self {
        self.script.lock().push_back(reply);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AttestationService for MockAttestation {
    async fn fetch(
        &self,
        _message_hash: &MessageHash,
    ) -> Result<AttestationResponse, AttestationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reply) = self.script.lock().pop_front() {
            return reply;
        }
        Ok(self.fallback.lock().clone())
    }
}

#[derive(Default)]
pub struct MockNonces {
    pub used: AtomicBool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl NonceChecker for MockNonces {
    async fn is_nonce_used(
        &self,
        _chain: ChainId,
        _source_domain: u32,
        _nonce: u64,
    ) -> Result<bool, ChainReadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.used.load(Ordering::SeqCst))
    }
}

#[derive(Default)]
pub struct MockLedger {
    pub messages: Mutex<HashMap<MessageHash, CctpMessage>>,
    pub relayed: Mutex<Vec<(MessageHash, Option<TxHash>)>>,
}

impl MockLedger {
    pub fn insert(&self, message: &CctpMessage) {
        self.messages
            .lock()
            .insert(message.message_hash, message.clone());
    }

    /// Another relayer's `MessageReceived` reached the store.
    pub fn relayed_elsewhere(&self, message_hash: &MessageHash) {
        if let Some(m) = self.messages.lock().get_mut(message_hash) {
            m.relay = RelayStatus::Relayed { tx_hash: None };
        }
    }
}

impl RelayLedger for MockLedger {
    fn message(&self, message_hash: &MessageHash) -> Option<CctpMessage> {
        self.messages.lock().get(message_hash).cloned()
    }

    fn record_relayed(
        &self,
        message_hash: MessageHash,
        tx_hash: Option<TxHash>,
    ) -> Result<(), LedgerError> {
        if let Some(m) = self.messages.lock().get_mut(&message_hash) {
            m.relay = RelayStatus::Relayed { tx_hash };
        }
        self.relayed.lock().push((message_hash, tx_hash));
        Ok(())
    }

    fn pending_messages(&self) -> Vec<CctpMessage> {
        self.messages
            .lock()
            .values()
            .filter(|m| !m.is_relayed())
            .cloned()
            .collect()
    }
}

#[derive(Default)]
pub struct MockSubmitter {
    pub sent: Mutex<Vec<PreparedTx>>,
    pub reject: AtomicBool,
}

#[async_trait]
impl TransactionSubmitter for MockSubmitter {
    async fn send(&self, tx: &PreparedTx) -> Result<TxHash, SubmitError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(SubmitError::Rejected("invalid attestation".into()));
        }
        let mut sent = self.sent.lock();
        sent.push(tx.clone());
        Ok(TxHash([0x40 + sent.len() as u8; 32]))
    }

    async fn wait_for_confirmation(
        &self,
        _chain_id: ChainId,
        tx_hash: TxHash,
    ) -> Result<TxReceipt, SubmitError> {
        Ok(TxReceipt {
            tx_hash,
            block_number: 500,
            success: true,
        })
    }
}
