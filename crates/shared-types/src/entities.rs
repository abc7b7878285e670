//! # Core Domain Entities
//!
//! ## Clusters
//!
//! - **Identity**: `ChainId`, `Address`, `TransferId`, `BundleId`, `MessageHash`
//! - **Transfers**: `Transfer`, `TransferState`, `TransferRecord`, `BondedWithdrawal`
//! - **Bundles**: `Bundle`, `BundleSettlement`
//! - **Messages**: `CctpMessage`, `RelayStatus`
//! - **Progress**: `WatermarkKey`, `ChainWatermark`

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::events::EventKind;

pub use primitive_types::U256;

/// Token amounts in base units.
pub type Amount = U256;

/// A 32-byte Keccak-256 digest.
pub type Hash = [u8; 32];

/// Compute the Keccak-256 digest of `data`.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Failure to parse a hex-encoded identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseHexError {
    #[error("invalid hex: {0}")]
    Invalid(String),

    #[error("wrong length: expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("invalid amount: {0}")]
    Amount(String),
}

macro_rules! hex_newtype {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// The all-zero value.
            pub const ZERO: Self = Self([0u8; $len]);

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; $len]
            }

            pub fn to_hex(&self) -> String {
                format!("0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(0x{})", stringify!($name), hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = ParseHexError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(raw).map_err(|e| ParseHexError::Invalid(e.to_string()))?;
                let actual = bytes.len();
                let arr: [u8; $len] = bytes.try_into().map_err(|_| ParseHexError::Length {
                    expected: $len,
                    actual,
                })?;
                Ok(Self(arr))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                if serializer.is_human_readable() {
                    serializer.serialize_str(&self.to_hex())
                } else {
                    self.0.serialize(serializer)
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                if deserializer.is_human_readable() {
                    let s = String::deserialize(deserializer)?;
                    s.parse().map_err(serde::de::Error::custom)
                } else {
                    <[u8; $len]>::deserialize(deserializer).map(Self)
                }
            }
        }
    };
}

hex_newtype!(
    /// A 20-byte EVM account or contract address.
    Address,
    20
);

hex_newtype!(
    /// Hash of a transaction on some chain.
    TxHash,
    32
);

hex_newtype!(
    /// Block hash as reported by a chain data source.
    BlockHash,
    32
);

hex_newtype!(
    /// Deterministic transfer identity.
    ///
    /// See [`TransferId::derive`].
    TransferId,
    32
);

hex_newtype!(
    /// Bundle identity: Merkle root plus destination chain.
    BundleId,
    32
);

hex_newtype!(
    /// Keccak-256 of the raw CCTP message bytes.
    MessageHash,
    32
);

impl TransferId {
    /// Derive the transfer id from the fields that make a transfer unique.
    ///
    /// `keccak256(source_chain_be8 ‖ sender ‖ recipient ‖ amount_be32 ‖ nonce)`
    pub fn derive(
        source_chain: ChainId,
        sender: &Address,
        recipient: &Address,
        amount: Amount,
        nonce: &Hash,
    ) -> Self {
        let mut buf = Vec::with_capacity(8 + 20 + 20 + 32 + 32);
        buf.extend_from_slice(&source_chain.0.to_be_bytes());
        buf.extend_from_slice(&sender.0);
        buf.extend_from_slice(&recipient.0);
        let mut amount_bytes = [0u8; 32];
        amount.to_big_endian(&mut amount_bytes);
        buf.extend_from_slice(&amount_bytes);
        buf.extend_from_slice(nonce);
        Self(keccak256(&buf))
    }
}

impl BundleId {
    pub fn derive(root: &Hash, destination_chain: ChainId) -> Self {
        let mut buf = [0u8; 40];
        buf[..32].copy_from_slice(root);
        buf[32..].copy_from_slice(&destination_chain.0.to_be_bytes());
        Self(keccak256(&buf))
    }
}

impl MessageHash {
    pub fn of(message: &[u8]) -> Self {
        Self(keccak256(message))
    }
}

/// Numeric EVM chain id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Token symbol as configured for a bridge route (e.g. `USDC`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSymbol(pub String);

impl TokenSymbol {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }
}

impl fmt::Display for TokenSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A bonding route: one token into one destination chain. Liquidity is
/// tracked and decisions are serialized per route.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteKey {
    pub token: TokenSymbol,
    pub destination_chain: ChainId,
}

impl RouteKey {
    pub fn new(token: TokenSymbol, destination_chain: ChainId) -> Self {
        Self {
            token,
            destination_chain,
        }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.token, self.destination_chain)
    }
}

/// Parse a decimal or `0x`-prefixed hex amount.
pub fn parse_amount(s: &str) -> Result<Amount, ParseHexError> {
    match s.strip_prefix("0x") {
        Some(raw) => U256::from_str_radix(raw, 16).map_err(|e| ParseHexError::Amount(format!("{e:?}"))),
        None => U256::from_dec_str(s).map_err(|e| ParseHexError::Amount(format!("{e:?}"))),
    }
}

/// Serde adapter for amounts written as decimal strings or plain integers,
/// as operators write them in config files.
pub mod decimal_amount {
    use super::{parse_amount, Amount};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(u64),
            Str(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Int(v) => Ok(Amount::from(v)),
            Raw::Str(s) => parse_amount(&s).map_err(serde::de::Error::custom),
        }
    }
}

// =============================================================================
// TRANSFERS
// =============================================================================

/// A cross-chain transfer as observed on its source chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Derived identity.
    pub transfer_id: TransferId,
    /// Chain the transfer was sent from.
    pub source_chain: ChainId,
    /// Chain the recipient is paid on.
    pub destination_chain: ChainId,
    /// Bridged token.
    pub token: TokenSymbol,
    /// Account that initiated the transfer.
    pub sender: Address,
    /// Account paid on the destination chain.
    pub recipient: Address,
    /// Gross amount sent.
    pub amount: Amount,
    /// Fee offered to whoever bonds the withdrawal.
    pub bonder_fee: Amount,
    /// Per-sender transfer nonce.
    pub nonce: Hash,
    /// Unix seconds after which the transfer must not be bonded. Zero means none.
    pub deadline: u64,
    /// Unix seconds when the transfer was observed.
    pub sent_at: u64,
}

impl Transfer {
    /// Amount paid out to the recipient when bonded.
    pub fn payout(&self) -> Amount {
        self.amount.saturating_sub(self.bonder_fee)
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.deadline != 0 && now > self.deadline
    }

    pub fn route(&self) -> RouteKey {
        RouteKey::new(self.token.clone(), self.destination_chain)
    }
}

/// Transfer lifecycle. Ordered: a transfer only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TransferState {
    Sent,
    Bonded,
    RootCommitted,
    Settled,
}

impl TransferState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Settled)
    }

    /// Forward-only: any later state is reachable, nothing earlier is.
    pub fn can_transition_to(&self, next: TransferState) -> bool {
        next > *self
    }

    pub fn name(&self) -> &'static str {
        match self {
            TransferState::Sent => "sent",
            TransferState::Bonded => "bonded",
            TransferState::RootCommitted => "root_committed",
            TransferState::Settled => "settled",
        }
    }
}

/// A confirmed bond of a transfer's withdrawal on the destination chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondedWithdrawal {
    pub transfer_id: TransferId,
    /// Bonding transaction hash (dedupe key).
    pub tx_hash: TxHash,
    pub amount: Amount,
    pub bonder: Address,
    /// Unix seconds of confirmation.
    pub bonded_at: u64,
}

/// Everything the store knows about one transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub transfer: Transfer,
    pub state: TransferState,
    pub bond: Option<BondedWithdrawal>,
    /// Bundle the transfer was committed in, bonded or not.
    pub bundle_id: Option<BundleId>,
    /// Reason the transfer will never be bonded by this node.
    pub unbondable: Option<String>,
    /// Every state the transfer has been in, oldest first.
    pub history: Vec<TransferState>,
}

impl TransferRecord {
    pub fn new(transfer: Transfer) -> Self {
        Self {
            transfer,
            state: TransferState::Sent,
            bond: None,
            bundle_id: None,
            unbondable: None,
            history: vec![TransferState::Sent],
        }
    }

    pub fn id(&self) -> TransferId {
        self.transfer.transfer_id
    }

    pub fn is_bonded(&self) -> bool {
        self.bond.is_some()
    }

    /// Settled through the unbondable exception rather than a bond.
    pub fn settled_without_bond(&self) -> bool {
        self.state == TransferState::Settled && self.bond.is_none()
    }
}

// =============================================================================
// BUNDLES
// =============================================================================

/// Settlement progress of a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BundleSettlement {
    Committed,
    Settled { tx_hash: TxHash, settled_at: u64 },
}

/// A committed transfer root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    pub bundle_id: BundleId,
    /// Merkle root over `members`.
    pub root: Hash,
    pub source_chain: ChainId,
    pub destination_chain: ChainId,
    pub token: TokenSymbol,
    pub members: Vec<TransferId>,
    pub total_amount: Amount,
    pub total_fee: Amount,
    /// Unix seconds the root was committed on the source chain.
    pub committed_at: u64,
    pub settlement: BundleSettlement,
}

impl Bundle {
    pub fn is_settled(&self) -> bool {
        matches!(self.settlement, BundleSettlement::Settled { .. })
    }
}

// =============================================================================
// MESSAGES
// =============================================================================

/// Relay progress of an attested message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayStatus {
    Pending,
    /// `tx_hash` is `None` when the message was relayed by someone else.
    Relayed { tx_hash: Option<TxHash> },
}

/// A CCTP message observed on its source chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CctpMessage {
    pub message_hash: MessageHash,
    pub source_chain: ChainId,
    pub destination_chain: ChainId,
    pub source_domain: u32,
    pub destination_domain: u32,
    pub nonce: u64,
    /// Raw message bytes as emitted by `MessageSent`.
    pub message: Vec<u8>,
    /// Unix seconds of source-chain confirmation.
    pub observed_at: u64,
    pub relay: RelayStatus,
}

impl CctpMessage {
    pub fn is_relayed(&self) -> bool {
        matches!(self.relay, RelayStatus::Relayed { .. })
    }
}

// =============================================================================
// PROGRESS
// =============================================================================

/// One watermark per chain and event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WatermarkKey {
    pub chain_id: ChainId,
    pub kind: EventKind,
}

impl fmt::Display for WatermarkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain_id, self.kind.name())
    }
}

/// Last fully processed block for a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainWatermark {
    pub key: WatermarkKey,
    pub block_number: u64,
    pub block_hash: BlockHash,
}
