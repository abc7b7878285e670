//! # Contract ABI
//!
//! Bridge and CCTP message transmitter bindings. Logs are decoded into the
//! JSON field maps the watchers validate; contract calls are encoded into
//! calldata for the signer.

use alloy_primitives::{Address as AbiAddress, B256, U256};
use alloy_sol_types::{SolCall, SolEvent};
use serde_json::{json, Value};
use shared_types::{keccak256, Address, Amount, ContractCall, EventKind, TransferId};
use thiserror::Error;

mod bindings {
    alloy_sol_types::sol! {
        event TransferSent(
            bytes32 indexed transferId,
            uint256 indexed destinationChainId,
            address indexed recipient,
            address sender,
            uint256 amount,
            bytes32 transferNonce,
            uint256 bonderFee,
            uint256 deadline
        );

        event WithdrawalBonded(
            bytes32 indexed transferId,
            address indexed bonder,
            uint256 amount
        );

        event TransfersCommitted(
            uint256 indexed destinationChainId,
            bytes32 indexed rootHash,
            uint256 totalAmount,
            uint256 totalFee,
            uint256 rootCommittedAt,
            bytes32[] transferIds
        );

        event MultipleWithdrawalsSettled(
            address indexed bonder,
            bytes32 indexed rootHash,
            uint256 totalBondsSettled
        );

        event MessageSent(bytes message);

        event MessageReceived(
            address indexed caller,
            uint32 sourceDomain,
            uint64 indexed nonce,
            bytes32 sender,
            bytes messageBody
        );

        function bondWithdrawal(
            address recipient,
            uint256 amount,
            bytes32 transferNonce,
            uint256 bonderFee
        ) external;

        function settleBondedWithdrawals(
            address bonder,
            bytes32[] transferIds,
            uint256 totalAmount
        ) external;

        function receiveMessage(bytes message, bytes attestation)
            external returns (bool success);

        function getCredit(address bonder) external view returns (uint256 credit);

        function usedNonces(bytes32 nonceKey) external view returns (uint256 used);
    }
}

#[derive(Debug, Error)]
pub enum AbiError {
    #[error("cannot decode {what}: {message}")]
    Decode { what: &'static str, message: String },

    #[error("{what} out of range")]
    OutOfRange { what: &'static str },
}

fn decode_error(what: &'static str) -> impl FnOnce(alloy_sol_types::Error) -> AbiError {
    move |e| AbiError::Decode {
        what,
        message: e.to_string(),
    }
}

// =============================================================================
// CONVERSIONS
// =============================================================================

pub fn to_amount(value: U256) -> Amount {
    Amount::from_big_endian(&value.to_be_bytes::<32>())
}

pub fn from_amount(value: Amount) -> U256 {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    U256::from_be_bytes(buf)
}

pub fn to_address(value: AbiAddress) -> Address {
    Address(value.0 .0)
}

pub fn from_address(value: Address) -> AbiAddress {
    AbiAddress::from(value.0)
}

fn to_u64(value: U256, what: &'static str) -> Result<u64, AbiError> {
    let amount = to_amount(value);
    if amount > Amount::from(u64::MAX) {
        return Err(AbiError::OutOfRange { what });
    }
    Ok(amount.low_u64())
}

fn saturating_u64(value: U256) -> u64 {
    to_u64(value, "deadline").unwrap_or(u64::MAX)
}

fn hex_bytes(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

// =============================================================================
// EVENTS
// =============================================================================

/// `topic0` of the log carrying `kind`.
pub fn event_topic(kind: EventKind) -> B256 {
    match kind {
        EventKind::TransferSent => bindings::TransferSent::SIGNATURE_HASH,
        EventKind::WithdrawalBonded => bindings::WithdrawalBonded::SIGNATURE_HASH,
        EventKind::BundleCommitted => bindings::TransfersCommitted::SIGNATURE_HASH,
        EventKind::BundleSettled => bindings::MultipleWithdrawalsSettled::SIGNATURE_HASH,
        EventKind::MessageSent => bindings::MessageSent::SIGNATURE_HASH,
        EventKind::MessageReceived => bindings::MessageReceived::SIGNATURE_HASH,
    }
}

/// Decode a log into the field map of its event kind.
pub fn decode_log_fields(kind: EventKind, topics: &[B256], data: &[u8]) -> Result<Value, AbiError> {
    let topics = topics.iter().copied();
    let fields = match kind {
        EventKind::TransferSent => {
            let ev = bindings::TransferSent::decode_raw_log(topics, data, true)
                .map_err(decode_error("TransferSent"))?;
            json!({
                "transfer_id": TransferId(ev.transferId.0),
                "destination_chain": to_u64(ev.destinationChainId, "destination chain")?,
                "sender": to_address(ev.sender),
                "recipient": to_address(ev.recipient),
                "amount": to_amount(ev.amount).to_string(),
                "bonder_fee": to_amount(ev.bonderFee).to_string(),
                "nonce": hex_bytes(ev.transferNonce.as_slice()),
                "deadline": saturating_u64(ev.deadline),
            })
        }
        EventKind::WithdrawalBonded => {
            let ev = bindings::WithdrawalBonded::decode_raw_log(topics, data, true)
                .map_err(decode_error("WithdrawalBonded"))?;
            json!({
                "transfer_id": TransferId(ev.transferId.0),
                "bonder": to_address(ev.bonder),
                "amount": to_amount(ev.amount).to_string(),
            })
        }
        EventKind::BundleCommitted => {
            let ev = bindings::TransfersCommitted::decode_raw_log(topics, data, true)
                .map_err(decode_error("TransfersCommitted"))?;
            let members: Vec<TransferId> =
                ev.transferIds.iter().map(|id| TransferId(id.0)).collect();
            json!({
                "root": hex_bytes(ev.rootHash.as_slice()),
                "destination_chain": to_u64(ev.destinationChainId, "destination chain")?,
                "total_amount": to_amount(ev.totalAmount).to_string(),
                "total_fee": to_amount(ev.totalFee).to_string(),
                "members": members,
                "committed_at": saturating_u64(ev.rootCommittedAt),
            })
        }
        EventKind::BundleSettled => {
            let ev = bindings::MultipleWithdrawalsSettled::decode_raw_log(topics, data, true)
                .map_err(decode_error("MultipleWithdrawalsSettled"))?;
            json!({
                "root": hex_bytes(ev.rootHash.as_slice()),
                "bonder": to_address(ev.bonder),
                "total_bonds_settled": to_amount(ev.totalBondsSettled).to_string(),
            })
        }
        EventKind::MessageSent => {
            let ev = bindings::MessageSent::decode_raw_log(topics, data, true)
                .map_err(decode_error("MessageSent"))?;
            json!({ "message": hex_bytes(&ev.message) })
        }
        EventKind::MessageReceived => {
            let ev = bindings::MessageReceived::decode_raw_log(topics, data, true)
                .map_err(decode_error("MessageReceived"))?;
            json!({
                "source_domain": ev.sourceDomain,
                "nonce": ev.nonce,
            })
        }
    };
    Ok(fields)
}

// =============================================================================
// CALLS
// =============================================================================

/// Calldata for a write the node submits.
pub fn encode_call(call: &ContractCall) -> Vec<u8> {
    match call {
        ContractCall::BondWithdrawal {
            recipient,
            amount,
            transfer_nonce,
            bonder_fee,
        } => bindings::bondWithdrawalCall {
            recipient: from_address(*recipient),
            amount: from_amount(*amount),
            transferNonce: B256::from(*transfer_nonce),
            bonderFee: from_amount(*bonder_fee),
        }
        .abi_encode(),
        ContractCall::SettleBondedWithdrawals {
            bonder,
            transfer_ids,
            total_amount,
        } => bindings::settleBondedWithdrawalsCall {
            bonder: from_address(*bonder),
            transferIds: transfer_ids.iter().map(|id| B256::from(id.0)).collect(),
            totalAmount: from_amount(*total_amount),
        }
        .abi_encode(),
        ContractCall::ReceiveMessage {
            message,
            attestation,
        } => bindings::receiveMessageCall {
            message: message.clone().into(),
            attestation: attestation.clone().into(),
        }
        .abi_encode(),
    }
}

pub fn get_credit_call(bonder: Address) -> Vec<u8> {
    bindings::getCreditCall {
        bonder: from_address(bonder),
    }
    .abi_encode()
}

pub fn decode_credit(output: &[u8]) -> Result<Amount, AbiError> {
    let ret = bindings::getCreditCall::abi_decode_returns(output, true)
        .map_err(decode_error("getCredit"))?;
    Ok(to_amount(ret.credit))
}

/// Key of `usedNonces`: `keccak256(abi.encodePacked(sourceDomain, nonce))`.
pub fn nonce_key(source_domain: u32, nonce: u64) -> [u8; 32] {
    let mut packed = [0u8; 12];
    packed[..4].copy_from_slice(&source_domain.to_be_bytes());
    packed[4..].copy_from_slice(&nonce.to_be_bytes());
    keccak256(&packed)
}

pub fn used_nonces_call(source_domain: u32, nonce: u64) -> Vec<u8> {
    bindings::usedNoncesCall {
        nonceKey: B256::from(nonce_key(source_domain, nonce)),
    }
    .abi_encode()
}

pub fn decode_used_nonce(output: &[u8]) -> Result<bool, AbiError> {
    let ret = bindings::usedNoncesCall::abi_decode_returns(output, true)
        .map_err(decode_error("usedNonces"))?;
    Ok(!ret.used.is_zero())
}
