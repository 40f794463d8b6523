//! Per-chain address formatting and validation.
//!
//! - Ethereum: `0x` + last 20 bytes of keccak-256 of the uncompressed public
//!   key (prefix byte dropped), checksummed per EIP-55.
//! - BSV/BTC/BCH: Base58Check of `0x00 || hash160(compressed pubkey)` — the
//!   legacy P2PKH form all three chains share.

use sigil_core::base58::{base58check_decode, base58check_encode};
use sigil_core::hashes::{hash160, keccak256};

/// P2PKH version byte shared by the BSV-family chains.
pub const P2PKH_VERSION: u8 = 0x00;

/// Format an Ethereum address from a 65-byte uncompressed public key.
pub fn eth_address_from_pubkey(uncompressed: &[u8; 65]) -> String {
    let digest = keccak256(&uncompressed[1..]);
    eip55_checksum(&digest[12..])
}

/// Apply the EIP-55 mixed-case checksum to 20 address bytes.
pub fn eip55_checksum(bytes: &[u8]) -> String {
    let lower = hex::encode(bytes);
    let digest = keccak256(lower.as_bytes());
    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (digest[i / 2] >> (4 * (1 - i % 2))) & 0x0F;
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Validate an Ethereum address string.
///
/// All-lowercase and all-uppercase hex are accepted (no checksum encoded);
/// mixed case must match EIP-55 exactly.
pub fn is_valid_eth_address(addr: &str) -> bool {
    let Some(hex_part) = addr.strip_prefix("0x") else {
        return false;
    };
    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return false;
    }
    let has_upper = hex_part.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = hex_part.chars().any(|c| c.is_ascii_lowercase());
    if !(has_upper && has_lower) {
        return true;
    }
    let bytes = match hex::decode(hex_part.to_ascii_lowercase()) {
        Ok(b) => b,
        Err(_) => return false,
    };
    eip55_checksum(&bytes) == addr
}

/// Format a legacy P2PKH address from a 33-byte compressed public key.
pub fn p2pkh_address_from_pubkey(compressed: &[u8; 33]) -> String {
    base58check_encode(P2PKH_VERSION, &hash160(compressed))
}

/// Validate a legacy P2PKH address: Base58Check, version 0, 21-byte payload.
pub fn is_valid_p2pkh_address(addr: &str) -> bool {
    match base58check_decode(addr) {
        Ok(payload) => payload.len() == 21 && payload[0] == P2PKH_VERSION,
        Err(_) => false,
    }
}
