//! Read-only port doubles for the monitor tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{
    Address, Amount, Bundle, CctpMessage, ChainId, ChainReadError, ChainWatermark, RouteKey,
    TokenSymbol, Transfer, TransferId, TransferRecord,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::domain::errors::HealthError;
use crate::domain::report::HealthCheckReport;
use crate::ports::outbound::{
    ChainStatus, GapSummary, HealthLedger, IncompleteSummary, LiquidityView, ReportSink,
    SettlementView,
};

pub const NOW: u64 = 1_700_000_000;
pub const HOUR: u64 = 3_600;
pub const BONDER: Address = Address([0xb0; 20]);

pub fn record(n: u8, sent_at: u64) -> TransferRecord {
    TransferRecord::new(Transfer {
        transfer_id: TransferId([n; 32]),
        source_chain: ChainId(1),
        destination_chain: ChainId(10),
        token: TokenSymbol::new("USDC"),
        sender: Address([1; 20]),
        recipient: Address([2; 20]),
        amount: Amount::from(500u64),
        bonder_fee: Amount::from(5u64),
        nonce: [n; 32],
        deadline: 0,
        sent_at,
    })
}

#[derive(Default)]
pub struct MockLedger {
    pub transfers: Mutex<Vec<TransferRecord>>,
    pub bundles: Mutex<Vec<Bundle>>,
    pub messages: Mutex<Vec<CctpMessage>>,
    pub watermarks: Mutex<Vec<ChainWatermark>>,
    pub gaps: Mutex<Vec<GapSummary>>,
}

impl HealthLedger for MockLedger {
    fn transfer(&self, transfer_id: &TransferId) -> Option<TransferRecord> {
        self.transfers
            .lock()
            .iter()
            .find(|r| r.id() == *transfer_id)
            .cloned()
    }

    fn transfers_since(&self, since: u64) -> Vec<TransferRecord> {
        self.transfers
            .lock()
            .iter()
            .filter(|r| r.transfer.sent_at >= since)
            .cloned()
            .collect()
    }

    fn bundles_since(&self, since: u64) -> Vec<Bundle> {
        self.bundles
            .lock()
            .iter()
            .filter(|b| b.committed_at >= since)
            .cloned()
            .collect()
    }

    fn messages_since(&self, since: u64) -> Vec<CctpMessage> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.observed_at >= since)
            .cloned()
            .collect()
    }

    fn watermarks(&self) -> Vec<ChainWatermark> {
        self.watermarks.lock().clone()
    }

    fn unresolvable_gaps(&self) -> Vec<GapSummary> {
        self.gaps.lock().clone()
    }
}

#[derive(Default)]
pub struct MockChains {
    heads: Mutex<HashMap<ChainId, u64>>,
    balances: Mutex<HashMap<ChainId, Result<Amount, ChainReadError>>>,
    calls: AtomicUsize,
}

impl MockChains {
    pub fn head(&self, chain: ChainId, head: u64) {
        self.heads.lock().insert(chain, head);
    }

    pub fn balance(&self, chain: ChainId, balance: u64) {
        self.balances
            .lock()
            .insert(chain, Ok(Amount::from(balance)));
    }

    pub fn fail_balance(&self, chain: ChainId, error: ChainReadError) {
        self.balances.lock().insert(chain, Err(error));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainStatus for MockChains {
    async fn head(&self, chain: ChainId) -> Result<u64, ChainReadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.heads
            .lock()
            .get(&chain)
            .copied()
            .ok_or(ChainReadError::UnsupportedChain(chain))
    }

    async fn native_balance(
        &self,
        chain: ChainId,
        _address: Address,
    ) -> Result<Amount, ChainReadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.balances
            .lock()
            .get(&chain)
            .cloned()
            .unwrap_or(Err(ChainReadError::UnsupportedChain(chain)))
    }
}

#[derive(Default)]
pub struct MockLiquidity {
    available: Mutex<Amount>,
}

impl MockLiquidity {
    pub fn set(&self, available: u64) {
        *self.available.lock() = Amount::from(available);
    }
}

#[async_trait]
impl LiquidityView for MockLiquidity {
    async fn available(&self, _route: &RouteKey) -> Result<Amount, ChainReadError> {
        Ok(*self.available.lock())
    }
}

#[derive(Default)]
pub struct MockSettlement {
    pub incomplete: Mutex<Vec<IncompleteSummary>>,
}

impl SettlementView for MockSettlement {
    fn incomplete_settlements(&self) -> Vec<IncompleteSummary> {
        self.incomplete.lock().clone()
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub reports: Mutex<Vec<HealthCheckReport>>,
}

#[async_trait]
impl ReportSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn publish(&self, report: &HealthCheckReport) -> Result<(), HealthError> {
        self.reports.lock().push(report.clone());
        Ok(())
    }
}

pub struct FailingSink;

#[async_trait]
impl ReportSink for FailingSink {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn publish(&self, _report: &HealthCheckReport) -> Result<(), HealthError> {
        Err(HealthError::Sink {
            sink: "failing",
            message: "disk full".into(),
        })
    }
}
