//! Fixtures shared by the store's unit tests.

use shared_types::{
    keccak256, Address, BlockHash, BondedWithdrawal, Bundle, BundleId, BundleSettlement,
    CctpMessage, ChainEvent, ChainId, EventMeta, MessageHash, RelayStatus, TokenSymbol, Transfer,
    TransferId, TxHash, U256,
};

use crate::domain::ledger::LedgerEvent;

pub const SOURCE: ChainId = ChainId(1);
pub const DESTINATION: ChainId = ChainId(10);

pub fn meta(chain_id: ChainId, block_number: u64, tx: u8, log_index: u32) -> EventMeta {
    EventMeta {
        chain_id,
        block_number,
        block_hash: BlockHash([block_number as u8; 32]),
        transaction_hash: TxHash([tx; 32]),
        log_index,
        observed_at: 1_700_000_000 + block_number,
    }
}

pub fn transfer(n: u8) -> Transfer {
    let sender = Address([0x11; 20]);
    let recipient = Address([0x22; 20]);
    let amount = U256::from(1_000_000u64 + n as u64);
    let nonce = [n; 32];
    Transfer {
        transfer_id: TransferId::derive(SOURCE, &sender, &recipient, amount, &nonce),
        source_chain: SOURCE,
        destination_chain: DESTINATION,
        token: TokenSymbol::new("USDC"),
        sender,
        recipient,
        amount,
        bonder_fee: U256::from(1_000u64),
        nonce,
        deadline: 0,
        sent_at: 1_700_000_000,
    }
}

pub fn sent_chain_event(t: &Transfer, block: u64, log_index: u32) -> ChainEvent {
    ChainEvent::TransferSent {
        meta: meta(SOURCE, block, t.nonce[0], log_index),
        transfer: t.clone(),
    }
}

pub fn sent_event(t: &Transfer, log_index: u32) -> LedgerEvent {
    LedgerEvent::Chain(sent_chain_event(t, 100, log_index))
}

pub fn bond(t: &Transfer, tx: u8) -> BondedWithdrawal {
    BondedWithdrawal {
        transfer_id: t.transfer_id,
        tx_hash: TxHash([tx; 32]),
        amount: t.amount,
        bonder: Address([0xbb; 20]),
        bonded_at: 1_700_000_100,
    }
}

pub fn bonded_chain_event(t: &Transfer, tx: u8, block: u64) -> ChainEvent {
    ChainEvent::WithdrawalBonded {
        meta: meta(DESTINATION, block, tx, 0),
        bond: bond(t, tx),
    }
}

pub fn bundle_of(members: &[&Transfer], n: u8) -> Bundle {
    let root = keccak256(&[n; 8]);
    Bundle {
        bundle_id: BundleId::derive(&root, DESTINATION),
        root,
        source_chain: SOURCE,
        destination_chain: DESTINATION,
        token: TokenSymbol::new("USDC"),
        members: members.iter().map(|t| t.transfer_id).collect(),
        total_amount: members.iter().fold(U256::zero(), |acc, t| acc + t.amount),
        total_fee: U256::zero(),
        committed_at: 1_700_000_200,
        settlement: BundleSettlement::Committed,
    }
}

pub fn commit_chain_event(b: &Bundle, block: u64) -> ChainEvent {
    ChainEvent::BundleCommitted {
        meta: meta(SOURCE, block, 0xc0, 0),
        bundle: b.clone(),
    }
}

pub fn commit_event(b: &Bundle, log_index: u32) -> LedgerEvent {
    LedgerEvent::Chain(ChainEvent::BundleCommitted {
        meta: meta(SOURCE, 200, 0xc0, log_index),
        bundle: b.clone(),
    })
}

pub fn settle_chain_event(b: &Bundle, block: u64) -> ChainEvent {
    ChainEvent::BundleSettled {
        meta: meta(DESTINATION, block, 0xd0, 0),
        bundle_id: b.bundle_id,
        root: b.root,
        settled_at: 1_700_000_300,
    }
}

pub fn settle_event(b: &Bundle, log_index: u32) -> LedgerEvent {
    LedgerEvent::Chain(ChainEvent::BundleSettled {
        meta: meta(DESTINATION, 300, 0xd0, log_index),
        bundle_id: b.bundle_id,
        root: b.root,
        settled_at: 1_700_000_300,
    })
}

pub fn message(n: u8) -> CctpMessage {
    let bytes = vec![n; 140];
    CctpMessage {
        message_hash: MessageHash::of(&bytes),
        source_chain: SOURCE,
        destination_chain: DESTINATION,
        source_domain: 0,
        destination_domain: 2,
        nonce: n as u64,
        message: bytes,
        observed_at: 1_700_000_000,
        relay: RelayStatus::Pending,
    }
}

pub fn message_event(m: &CctpMessage, log_index: u32) -> LedgerEvent {
    LedgerEvent::Chain(ChainEvent::MessageSent {
        meta: meta(SOURCE, 400, 0x80 | m.nonce as u8, log_index),
        message: m.clone(),
    })
}

pub fn received_event(m: &CctpMessage, log_index: u32) -> LedgerEvent {
    LedgerEvent::Chain(ChainEvent::MessageReceived {
        meta: meta(DESTINATION, 500, 0xee, log_index),
        source_domain: m.source_domain,
        nonce: m.nonce,
    })
}
