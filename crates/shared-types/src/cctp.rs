//! # CCTP Message Format
//!
//! Header layout of messages emitted by the Circle message transmitter and
//! the domain numbering used by the attestation service.
//!
//! ```text
//! offset  size  field
//! 0       4     version
//! 4       4     source domain
//! 8       4     destination domain
//! 12      8     nonce
//! 20      32    sender
//! 52      32    recipient
//! 84      32    destination caller
//! 116     ..    message body
//! ```

use thiserror::Error;

use crate::entities::{keccak256, ChainId, Hash};

/// Minimum length of a well-formed message.
pub const HEADER_LEN: usize = 116;

/// Domain to EVM chain id, mainnet deployments.
const DOMAINS: [(u32, u64); 5] = [(0, 1), (2, 10), (3, 42161), (6, 8453), (7, 137)];

pub fn chain_for_domain(domain: u32) -> Option<ChainId> {
    DOMAINS
        .iter()
        .find(|(d, _)| *d == domain)
        .map(|(_, c)| ChainId(*c))
}

pub fn domain_for_chain(chain: ChainId) -> Option<u32> {
    DOMAINS.iter().find(|(_, c)| *c == chain.0).map(|(d, _)| *d)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CctpError {
    #[error("message too short: {len} bytes, header needs {HEADER_LEN}")]
    TooShort { len: usize },
}

/// Decoded fixed-size header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub version: u32,
    pub source_domain: u32,
    pub destination_domain: u32,
    pub nonce: u64,
    pub sender: Hash,
    pub recipient: Hash,
}

fn be_u32(bytes: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    u32::from_be_bytes(buf)
}

pub fn parse_header(message: &[u8]) -> Result<MessageHeader, CctpError> {
    if message.len() < HEADER_LEN {
        return Err(CctpError::TooShort { len: message.len() });
    }
    let mut nonce = [0u8; 8];
    nonce.copy_from_slice(&message[12..20]);
    let mut sender = [0u8; 32];
    sender.copy_from_slice(&message[20..52]);
    let mut recipient = [0u8; 32];
    recipient.copy_from_slice(&message[52..84]);

    Ok(MessageHeader {
        version: be_u32(message, 0),
        source_domain: be_u32(message, 4),
        destination_domain: be_u32(message, 8),
        nonce: u64::from_be_bytes(nonce),
        sender,
        recipient,
    })
}

/// Key of the destination transmitter's `usedNonces` mapping:
/// `keccak256(abi.encodePacked(uint32 sourceDomain, uint64 nonce))`.
pub fn used_nonce_key(source_domain: u32, nonce: u64) -> Hash {
    let mut buf = [0u8; 12];
    buf[..4].copy_from_slice(&source_domain.to_be_bytes());
    buf[4..].copy_from_slice(&nonce.to_be_bytes());
    keccak256(&buf)
}

/// Assemble a message with zeroed version and fixed sender/recipient bytes.
pub fn build_message(source_domain: u32, destination_domain: u32, nonce: u64, body: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(HEADER_LEN + body.len());
    msg.extend_from_slice(&0u32.to_be_bytes());
    msg.extend_from_slice(&source_domain.to_be_bytes());
    msg.extend_from_slice(&destination_domain.to_be_bytes());
    msg.extend_from_slice(&nonce.to_be_bytes());
    msg.extend_from_slice(&[0x11; 32]);
    msg.extend_from_slice(&[0x22; 32]);
    msg.extend_from_slice(&[0u8; 32]);
    msg.extend_from_slice(body);
    msg
}
