//! # Fixtures
//!
//! A node harness around the real transfer state store and store bridges.
//! Chains, the signer and the attestation service are in-process doubles.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use bn_02_transfer_store::{InMemoryKVStore, StoreConfig, TransferStateApi, TransferStateStore};
use bn_03_bonding_engine::{
    BondingConfig, BondingDecisionEngine, BondingPorts, CreditSource, GasOracle, LiquidityTracker,
    RouteConfig,
};
use bn_04_settlement::{SettleBridge, SettlementConfig, SettlementCoordinator, SettlementPorts};
use bn_05_attestation_relay::{
    AttestationDelayTable, AttestationError, AttestationRelayer, AttestationResponse,
    AttestationService, NonceChecker, PairDelay, RelayConfig, RelayPorts, Transmitter,
};
use node_runtime::adapters::{StoreBridge, TrackerReleaser};
use shared_bus::{Subscription, TransitionBus};
use shared_resilience::{RetryExecutor, RetryPolicy};
use shared_types::cctp::build_message;
use shared_types::{
    keccak256, Address, Amount, BlockHash, Bundle, BundleId, BundleSettlement, CctpMessage,
    ChainEvent, ChainId, ChainReadError, EventMeta, MessageHash, PreparedTx, RelayStatus,
    SubmitError, TokenSymbol, Transfer, TransferId, TransactionSubmitter, TxHash, TxReceipt,
    ManualTimeSource,
};

pub const BONDER: Address = Address([0xb0; 20]);
pub const BRIDGE: Address = Address([0xbb; 20]);
pub const TRANSMITTER: Address = Address([0x7e; 20]);
pub const SOURCE: ChainId = ChainId(1);
pub const DESTINATION: ChainId = ChainId(10);
pub const NOW: u64 = 1_700_000_000;
pub const MINUTE: u64 = 60;

pub fn usdc() -> TokenSymbol {
    TokenSymbol::new("USDC")
}

pub fn units(n: u64) -> Amount {
    Amount::from(n)
}

pub fn fast_retry() -> RetryExecutor {
    RetryExecutor::new(RetryPolicy {
        max_attempts: 3,
        base_delay_ms: 1,
    })
}

// =============================================================================
// CHAIN DOUBLES
// =============================================================================

/// Credit, gas and nonce reads of the destination chain.
pub struct FakeChain {
    credit: Mutex<Amount>,
    gas_price: Amount,
    used_nonces: Mutex<HashSet<(u32, u64)>>,
}

impl FakeChain {
    pub fn new(credit: Amount) -> Self {
        Self {
            credit: Mutex::new(credit),
            gas_price: Amount::from(20_000_000_000u64),
            used_nonces: Mutex::new(HashSet::new()),
        }
    }

    pub fn set_credit(&self, credit: Amount) {
        *self.credit.lock() = credit;
    }

    pub fn use_nonce(&self, source_domain: u32, nonce: u64) {
        self.used_nonces.lock().insert((source_domain, nonce));
    }
}

#[async_trait]
impl CreditSource for FakeChain {
    async fn credit(&self, _chain_id: ChainId, _token: &TokenSymbol) -> Result<Amount, ChainReadError> {
        Ok(*self.credit.lock())
    }
}

#[async_trait]
impl GasOracle for FakeChain {
    async fn gas_price(&self, _chain_id: ChainId) -> Result<Amount, ChainReadError> {
        Ok(self.gas_price)
    }
}

#[async_trait]
impl NonceChecker for FakeChain {
    async fn is_nonce_used(
        &self,
        _chain: ChainId,
        source_domain: u32,
        nonce: u64,
    ) -> Result<bool, ChainReadError> {
        Ok(self.used_nonces.lock().contains(&(source_domain, nonce)))
    }
}

/// Accepts every transaction and confirms it successfully.
#[derive(Default)]
pub struct RecordingSubmitter {
    pub sent: Mutex<Vec<PreparedTx>>,
    counter: AtomicU64,
    /// Held inside `send`, so concurrent callers overlap.
    send_latency: Mutex<Option<Duration>>,
}

impl RecordingSubmitter {
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            send_latency: Mutex::new(Some(latency)),
            ..Default::default()
        }
    }

    pub fn sends(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl TransactionSubmitter for RecordingSubmitter {
    async fn send(&self, tx: &PreparedTx) -> Result<TxHash, SubmitError> {
        let latency = *self.send_latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.sent.lock().push(tx.clone());
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TxHash(keccak256(&n.to_be_bytes())))
    }

    async fn wait_for_confirmation(&self, _chain_id: ChainId, tx_hash: TxHash) -> Result<TxReceipt, SubmitError> {
        Ok(TxReceipt {
            tx_hash,
            block_number: 100,
            success: true,
        })
    }
}

/// Attestation service whose answer the test sets.
pub struct ScriptedAttestation {
    response: Mutex<AttestationResponse>,
    pub fetches: AtomicU64,
}

impl Default for ScriptedAttestation {
    fn default() -> Self {
        Self {
            response: Mutex::new(AttestationResponse::Pending),
            fetches: AtomicU64::new(0),
        }
    }
}

impl ScriptedAttestation {
    pub fn complete(&self, attestation: Vec<u8>) {
        *self.response.lock() = AttestationResponse::Complete { attestation };
    }
}

#[async_trait]
impl AttestationService for ScriptedAttestation {
    async fn fetch(&self, _message_hash: &MessageHash) -> Result<AttestationResponse, AttestationError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.lock().clone())
    }
}

// =============================================================================
// NODE HARNESS
// =============================================================================

pub struct Node {
    pub time: Arc<ManualTimeSource>,
    pub bus: Arc<TransitionBus>,
    pub store: Arc<TransferStateStore>,
    pub bridge: Arc<StoreBridge>,
    pub liquidity: Arc<LiquidityTracker>,
    pub chain: Arc<FakeChain>,
    pub submitter: Arc<RecordingSubmitter>,
}

impl Node {
    /// A node whose bonder holds `credit` on the destination chain.
    pub fn new(credit: u64) -> Self {
        Self::with_submitter(credit, RecordingSubmitter::default())
    }

    pub fn with_submitter(credit: u64, submitter: RecordingSubmitter) -> Self {
        let time = Arc::new(ManualTimeSource::new(NOW));
        let bus = Arc::new(TransitionBus::new());
        let store = Arc::new(
            TransferStateStore::open(
                Box::new(InMemoryKVStore::new()),
                bus.clone(),
                time.clone(),
                StoreConfig::default(),
            )
            .expect("open store"),
        );
        Self {
            bridge: Arc::new(StoreBridge::new(store.clone(), BONDER)),
            liquidity: Arc::new(LiquidityTracker::new()),
            chain: Arc::new(FakeChain::new(units(credit))),
            submitter: Arc::new(submitter),
            time,
            bus,
            store,
        }
    }

    pub fn apply(&self, event: ChainEvent) {
        self.store.apply(event).expect("apply event");
    }

    pub fn engine(&self, route: RouteConfig) -> Arc<BondingDecisionEngine> {
        let ports = BondingPorts {
            ledger: self.bridge.clone(),
            credit: self.chain.clone(),
            gas: self.chain.clone(),
            submitter: self.submitter.clone(),
            time: self.time.clone(),
        };
        let config = BondingConfig::new(BONDER).with_route(route);
        Arc::new(
            BondingDecisionEngine::new(config, ports, self.liquidity.clone(), fast_retry())
                .expect("bonding engine"),
        )
    }

    pub fn coordinator(&self, reconcile_timeout_secs: u64) -> Arc<SettlementCoordinator> {
        let config = SettlementConfig {
            reconcile_timeout_secs,
            bonder: BONDER,
            bridges: vec![SettleBridge {
                token: usdc(),
                destination_chain: DESTINATION,
                bridge: BRIDGE,
            }],
            ..Default::default()
        };
        let ports = SettlementPorts {
            ledger: self.bridge.clone(),
            releaser: Arc::new(TrackerReleaser(self.liquidity.clone())),
            submitter: self.submitter.clone(),
            time: self.time.clone(),
        };
        Arc::new(SettlementCoordinator::new(config, ports, fast_retry()).expect("coordinator"))
    }

    pub fn relayer(&self, attestation: Arc<ScriptedAttestation>, delay_secs: u64) -> Arc<AttestationRelayer> {
        let config = RelayConfig {
            enabled: true,
            attestation_url: "http://attestation.test".into(),
            poll_interval_secs: MINUTE,
            transmitters: vec![Transmitter {
                chain: DESTINATION,
                address: TRANSMITTER,
            }],
            delays: AttestationDelayTable {
                chains: Vec::new(),
                pairs: vec![PairDelay {
                    source: SOURCE,
                    destination: DESTINATION,
                    delay_secs,
                }],
                fallback_secs: delay_secs,
            },
            ..Default::default()
        };
        let ports = RelayPorts {
            attestation,
            nonces: self.chain.clone(),
            ledger: self.bridge.clone(),
            submitter: self.submitter.clone(),
            time: self.time.clone(),
        };
        Arc::new(AttestationRelayer::new(config, ports, fast_retry()).expect("relayer"))
    }
}

/// Hand every queued transition to the coordinator.
pub fn pump(feeds: &mut [Subscription], coordinator: &SettlementCoordinator) -> usize {
    let mut handled = 0;
    for feed in feeds.iter_mut() {
        while let Ok(Some(transition)) = feed.try_recv() {
            coordinator.handle(&transition);
            handled += 1;
        }
    }
    handled
}

// =============================================================================
// EVENT BUILDERS
// =============================================================================

pub fn route() -> RouteConfig {
    RouteConfig::new(usdc(), DESTINATION, BRIDGE)
}

fn tx_hash(tag: u8, n: u64) -> TxHash {
    let mut seed = [0u8; 9];
    seed[0] = tag;
    seed[1..].copy_from_slice(&n.to_be_bytes());
    TxHash(keccak256(&seed))
}

pub fn meta(chain_id: ChainId, block_number: u64, transaction_hash: TxHash) -> EventMeta {
    EventMeta {
        chain_id,
        block_number,
        block_hash: BlockHash(keccak256(&block_number.to_be_bytes())),
        transaction_hash,
        log_index: 0,
        observed_at: NOW,
    }
}

pub fn transfer(n: u8, amount: u64, bonder_fee: u64) -> Transfer {
    let sender = Address([0x11; 20]);
    let recipient = Address([0x22; 20]);
    let nonce = [n; 32];
    let amount = units(amount);
    Transfer {
        transfer_id: TransferId::derive(SOURCE, &sender, &recipient, amount, &nonce),
        source_chain: SOURCE,
        destination_chain: DESTINATION,
        token: usdc(),
        sender,
        recipient,
        amount,
        bonder_fee: units(bonder_fee),
        nonce,
        deadline: 0,
        sent_at: NOW,
    }
}

pub fn transfer_sent(transfer: &Transfer) -> ChainEvent {
    ChainEvent::TransferSent {
        meta: meta(SOURCE, 10, tx_hash(1, u64::from(transfer.nonce[0]))),
        transfer: transfer.clone(),
    }
}

pub fn bundle(members: &[&Transfer], committed_at: u64) -> Bundle {
    let mut ids = Vec::with_capacity(members.len() * 32);
    for t in members {
        ids.extend_from_slice(&t.transfer_id.0);
    }
    let root = keccak256(&ids);
    Bundle {
        bundle_id: BundleId::derive(&root, DESTINATION),
        root,
        source_chain: SOURCE,
        destination_chain: DESTINATION,
        token: usdc(),
        members: members.iter().map(|t| t.transfer_id).collect(),
        total_amount: members
            .iter()
            .fold(Amount::zero(), |acc, t| acc.saturating_add(t.amount)),
        total_fee: members
            .iter()
            .fold(Amount::zero(), |acc, t| acc.saturating_add(t.bonder_fee)),
        committed_at,
        settlement: BundleSettlement::Committed,
    }
}

pub fn bundle_committed(bundle: &Bundle) -> ChainEvent {
    ChainEvent::BundleCommitted {
        meta: meta(SOURCE, 20, tx_hash(2, u64::from(bundle.root[0]))),
        bundle: bundle.clone(),
    }
}

pub fn bundle_settled(bundle: &Bundle, settled_at: u64) -> ChainEvent {
    ChainEvent::BundleSettled {
        meta: meta(DESTINATION, 30, tx_hash(3, u64::from(bundle.root[0]))),
        bundle_id: bundle.bundle_id,
        root: bundle.root,
        settled_at,
    }
}

/// A USDC burn from Ethereum (domain 0) to Optimism (domain 2).
pub fn cctp_message(nonce: u64, observed_at: u64) -> CctpMessage {
    let message = build_message(0, 2, nonce, b"burn");
    CctpMessage {
        message_hash: MessageHash::of(&message),
        source_chain: SOURCE,
        destination_chain: DESTINATION,
        source_domain: 0,
        destination_domain: 2,
        nonce,
        message,
        observed_at,
        relay: RelayStatus::Pending,
    }
}

pub fn message_sent(message: &CctpMessage) -> ChainEvent {
    ChainEvent::MessageSent {
        meta: meta(SOURCE, 40, tx_hash(4, message.nonce)),
        message: message.clone(),
    }
}
