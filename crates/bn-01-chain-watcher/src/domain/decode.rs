//! # Log Validation
//!
//! Turns a [`RawLog`] into a typed [`ChainEvent`].
//!
//! Two failure modes:
//!
//! - a payload that does not parse is [`WatcherError::MalformedLog`]. The
//!   provider returned garbage, so the fetch is retried and the watermark
//!   stays put;
//! - a payload that parses but describes something impossible (zero
//!   recipient, zero amount, unknown CCTP domain) is [`Decoded::Rejected`]
//!   and dropped. Refetching would return the same bytes.
//!
//! Transfer ids are always derived here from the transfer's own fields.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use shared_types::cctp::{chain_for_domain, domain_for_chain, parse_header};
use shared_types::{
    decimal_amount, Address, Amount, BondedWithdrawal, Bundle, BundleId, BundleSettlement,
    CctpMessage, ChainEvent, ChainId, EventKey, EventKind, EventMeta, Hash, MessageHash,
    RelayStatus, TokenSymbol, Transfer, TransferId,
};
use tracing::warn;

use super::config::WatcherConfig;
use super::entities::RawLog;
use super::errors::WatcherError;

/// A validated log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Event(ChainEvent),
    /// Well-formed but invalid. Dropped with a reason.
    Rejected { key: EventKey, reason: String },
}

// =============================================================================
// PAYLOADS
// =============================================================================

fn hex32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Hash, D::Error> {
    let bytes = hex_vec(deserializer)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| serde::de::Error::custom(format!("expected 32 bytes, got {len}")))
}

fn hex_vec<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let s = String::deserialize(deserializer)?;
    let raw = s.strip_prefix("0x").unwrap_or(&s);
    hex::decode(raw).map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize)]
struct TransferSentPayload {
    destination_chain: ChainId,
    sender: Address,
    recipient: Address,
    #[serde(with = "decimal_amount")]
    amount: Amount,
    #[serde(with = "decimal_amount")]
    bonder_fee: Amount,
    #[serde(deserialize_with = "hex32")]
    nonce: Hash,
    #[serde(default)]
    deadline: u64,
    /// Id as emitted by the contract. Compared, never used.
    #[serde(default)]
    transfer_id: Option<TransferId>,
}

#[derive(Debug, Deserialize)]
struct WithdrawalBondedPayload {
    transfer_id: TransferId,
    #[serde(with = "decimal_amount")]
    amount: Amount,
    bonder: Address,
}

#[derive(Debug, Deserialize)]
struct BundleCommittedPayload {
    #[serde(deserialize_with = "hex32")]
    root: Hash,
    destination_chain: ChainId,
    #[serde(with = "decimal_amount")]
    total_amount: Amount,
    #[serde(default, with = "decimal_amount")]
    total_fee: Amount,
    members: Vec<TransferId>,
    #[serde(default)]
    committed_at: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct BundleSettledPayload {
    #[serde(deserialize_with = "hex32")]
    root: Hash,
}

#[derive(Debug, Deserialize)]
struct MessageSentPayload {
    #[serde(deserialize_with = "hex_vec")]
    message: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct MessageReceivedPayload {
    source_domain: u32,
    nonce: u64,
}

// =============================================================================
// DECODING
// =============================================================================

fn parse<T: DeserializeOwned>(log: &RawLog) -> Result<T, WatcherError> {
    serde_json::from_value(log.fields.clone()).map_err(|e| WatcherError::MalformedLog {
        key: log.key(),
        reason: e.to_string(),
    })
}

fn token(config: &WatcherConfig) -> Result<TokenSymbol, WatcherError> {
    config.token.clone().ok_or_else(|| {
        WatcherError::InvalidConfiguration(format!(
            "{}: no token configured",
            config.watermark_key()
        ))
    })
}

/// Validate `log` for the watcher described by `config`.
///
/// `observed_at` is used when the log carries no block timestamp.
pub fn decode_log(
    config: &WatcherConfig,
    log: &RawLog,
    observed_at: u64,
) -> Result<Decoded, WatcherError> {
    if log.kind != config.kind {
        return Err(WatcherError::MalformedLog {
            key: log.key(),
            reason: format!("expected {} log, got {}", config.kind, log.kind),
        });
    }

    let meta = EventMeta {
        chain_id: config.chain_id,
        block_number: log.block_number,
        block_hash: log.block_hash,
        transaction_hash: log.transaction_hash,
        log_index: log.log_index,
        observed_at: log.block_timestamp.unwrap_or(observed_at),
    };
    let reject = |reason: String| -> Result<Decoded, WatcherError> {
        Ok(Decoded::Rejected {
            key: log.key(),
            reason,
        })
    };

    let event = match config.kind {
        EventKind::TransferSent => {
            let p: TransferSentPayload = parse(log)?;
            if p.recipient.is_zero() {
                return reject("zero recipient".into());
            }
            if p.amount.is_zero() {
                return reject("zero amount".into());
            }
            if p.bonder_fee > p.amount {
                return reject(format!("bonder fee {} exceeds amount {}", p.bonder_fee, p.amount));
            }
            if p.destination_chain == config.chain_id {
                return reject("destination equals source chain".into());
            }
            let transfer_id =
                TransferId::derive(config.chain_id, &p.sender, &p.recipient, p.amount, &p.nonce);
            if let Some(emitted) = p.transfer_id {
                if emitted != transfer_id {
                    warn!(
                        "[bn-01] Emitted transfer id differs from derived id, using derived: key={} emitted={} derived={}",
                        log.key(),
                        emitted,
                        transfer_id
                    );
                }
            }
            ChainEvent::TransferSent {
                meta,
                transfer: Transfer {
                    transfer_id,
                    source_chain: config.chain_id,
                    destination_chain: p.destination_chain,
                    token: token(config)?,
                    sender: p.sender,
                    recipient: p.recipient,
                    amount: p.amount,
                    bonder_fee: p.bonder_fee,
                    nonce: p.nonce,
                    deadline: p.deadline,
                    sent_at: meta.observed_at,
                },
            }
        }

        EventKind::WithdrawalBonded => {
            let p: WithdrawalBondedPayload = parse(log)?;
            if p.transfer_id.is_zero() {
                return reject("zero transfer id".into());
            }
            if p.amount.is_zero() {
                return reject("zero amount".into());
            }
            ChainEvent::WithdrawalBonded {
                meta,
                bond: BondedWithdrawal {
                    transfer_id: p.transfer_id,
                    tx_hash: log.transaction_hash,
                    amount: p.amount,
                    bonder: p.bonder,
                    bonded_at: meta.observed_at,
                },
            }
        }

        EventKind::BundleCommitted => {
            let p: BundleCommittedPayload = parse(log)?;
            if p.members.is_empty() {
                return reject("bundle without members".into());
            }
            if p.total_amount.is_zero() {
                return reject("zero bundle amount".into());
            }
            ChainEvent::BundleCommitted {
                meta,
                bundle: Bundle {
                    bundle_id: BundleId::derive(&p.root, p.destination_chain),
                    root: p.root,
                    source_chain: config.chain_id,
                    destination_chain: p.destination_chain,
                    token: token(config)?,
                    members: p.members,
                    total_amount: p.total_amount,
                    total_fee: p.total_fee,
                    committed_at: p.committed_at.unwrap_or(meta.observed_at),
                    settlement: BundleSettlement::Committed,
                },
            }
        }

        EventKind::BundleSettled => {
            let p: BundleSettledPayload = parse(log)?;
            // Settled on this chain, which is the bundle's destination.
            ChainEvent::BundleSettled {
                meta,
                bundle_id: BundleId::derive(&p.root, config.chain_id),
                root: p.root,
                settled_at: meta.observed_at,
            }
        }

        EventKind::MessageSent => {
            let p: MessageSentPayload = parse(log)?;
            let header = match parse_header(&p.message) {
                Ok(header) => header,
                Err(e) => return reject(e.to_string()),
            };
            if domain_for_chain(config.chain_id) != Some(header.source_domain) {
                return reject(format!(
                    "source domain {} does not belong to chain {}",
                    header.source_domain, config.chain_id
                ));
            }
            let Some(destination_chain) = chain_for_domain(header.destination_domain) else {
                return reject(format!("unknown destination domain {}", header.destination_domain));
            };
            ChainEvent::MessageSent {
                meta,
                message: CctpMessage {
                    message_hash: MessageHash::of(&p.message),
                    source_chain: config.chain_id,
                    destination_chain,
                    source_domain: header.source_domain,
                    destination_domain: header.destination_domain,
                    nonce: header.nonce,
                    message: p.message,
                    observed_at: meta.observed_at,
                    relay: RelayStatus::Pending,
                },
            }
        }

        EventKind::MessageReceived => {
            let p: MessageReceivedPayload = parse(log)?;
            if chain_for_domain(p.source_domain).is_none() {
                return reject(format!("unknown source domain {}", p.source_domain));
            }
            ChainEvent::MessageReceived {
                meta,
                source_domain: p.source_domain,
                nonce: p.nonce,
            }
        }
    };

    Ok(Decoded::Event(event))
}
