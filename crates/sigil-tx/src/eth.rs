//! Ethereum transaction encoding and signing.
//!
//! Supports the legacy encoding with EIP-155 replay protection and the
//! typed EIP-1559 encoding (type 2, empty access list). ERC-20 transfers
//! are ordinary transactions to the token contract with ABI-encoded
//! `transfer(address,uint256)` calldata and zero value.

use rlp::RlpStream;

use sigil_core::ecdsa;
use sigil_core::hashes::keccak256;
use sigil_core::secret::PrivateKey;
use sigil_keys::address::is_valid_eth_address;

use crate::error::TxError;

/// Gas limit for a plain value transfer.
pub const GAS_LIMIT_TRANSFER: u64 = 21_000;

/// Default gas limit for an ERC-20 transfer.
pub const GAS_LIMIT_ERC20: u64 = 65_000;

/// `transfer(address,uint256)` selector.
const ERC20_TRANSFER_SELECTOR: [u8; 4] = [0xA9, 0x05, 0x9C, 0xBB];

/// An unsigned Ethereum transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthTxRequest {
    pub chain_id: u64,
    pub nonce: u64,
    pub to: [u8; 20],
    pub value: u128,
    pub data: Vec<u8>,
    pub gas_limit: u64,
    /// Legacy gas price in wei.
    pub gas_price: u128,
    /// EIP-1559 fee cap in wei.
    pub max_fee_per_gas: u128,
    /// EIP-1559 priority tip in wei.
    pub max_priority_fee_per_gas: u128,
}

/// Parse and checksum-validate an address into its 20 bytes.
pub fn parse_eth_address(address: &str) -> Result<[u8; 20], TxError> {
    if !is_valid_eth_address(address) {
        return Err(TxError::InvalidAddress(address.to_string()));
    }
    let bytes = hex::decode(&address[2..])
        .map_err(|e| TxError::InvalidAddress(format!("{address}: {e}")))?;
    let mut out = [0u8; 20];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// ABI-encode `transfer(to, amount)` calldata.
pub fn erc20_transfer_data(to: &[u8; 20], amount: u128) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + 32 + 32);
    data.extend_from_slice(&ERC20_TRANSFER_SELECTOR);
    data.extend_from_slice(&[0u8; 12]);
    data.extend_from_slice(to);
    data.extend_from_slice(&[0u8; 16]);
    data.extend_from_slice(&amount.to_be_bytes());
    data
}

/// Send-all value: `balance − gas_limit × effective_price`.
pub fn send_all_value(balance: u128, gas_limit: u64, price: u128) -> Result<u128, TxError> {
    let gas_cost = price.saturating_mul(gas_limit as u128);
    balance
        .checked_sub(gas_cost)
        .filter(|v| *v > 0)
        .ok_or(TxError::InsufficientFunds {
            have: balance,
            need: gas_cost,
        })
}

/// Minimal big-endian bytes of an integer (empty for zero), as RLP wants.
fn trimmed_be(value: u128) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    bytes[first..].to_vec()
}

fn append_quantity(stream: &mut RlpStream, value: u128) {
    stream.append(&trimmed_be(value));
}

/// Sign with the legacy encoding and EIP-155 replay protection.
///
/// `v = chain_id · 2 + 35 + recovery_id`.
pub fn build_legacy_raw(request: &EthTxRequest, secret: &PrivateKey) -> Result<Vec<u8>, TxError> {
    let mut unsigned = RlpStream::new_list(9);
    append_quantity(&mut unsigned, request.nonce as u128);
    append_quantity(&mut unsigned, request.gas_price);
    append_quantity(&mut unsigned, request.gas_limit as u128);
    unsigned.append(&request.to.to_vec());
    append_quantity(&mut unsigned, request.value);
    unsigned.append(&request.data);
    append_quantity(&mut unsigned, request.chain_id as u128);
    unsigned.append_empty_data();
    unsigned.append_empty_data();

    let digest = keccak256(&unsigned.out());
    let (signature, recovery_id) =
        ecdsa::sign_recoverable(&digest, secret).map_err(|e| TxError::Signing(e.to_string()))?;
    let v = request.chain_id * 2 + 35 + recovery_id as u64;

    let mut signed = RlpStream::new_list(9);
    append_quantity(&mut signed, request.nonce as u128);
    append_quantity(&mut signed, request.gas_price);
    append_quantity(&mut signed, request.gas_limit as u128);
    signed.append(&request.to.to_vec());
    append_quantity(&mut signed, request.value);
    signed.append(&request.data);
    append_quantity(&mut signed, v as u128);
    signed.append(&trim_leading_zeros(&signature[..32]));
    signed.append(&trim_leading_zeros(&signature[32..]));
    Ok(signed.out().to_vec())
}

/// Sign with the typed EIP-1559 encoding (type 2, empty access list).
///
/// The signature parity goes in directly as `y_parity`.
pub fn build_eip1559_raw(request: &EthTxRequest, secret: &PrivateKey) -> Result<Vec<u8>, TxError> {
    let payload = |signature: Option<(&[u8; 64], u8)>| {
        let mut stream = RlpStream::new_list(if signature.is_some() { 12 } else { 9 });
        append_quantity(&mut stream, request.chain_id as u128);
        append_quantity(&mut stream, request.nonce as u128);
        append_quantity(&mut stream, request.max_priority_fee_per_gas);
        append_quantity(&mut stream, request.max_fee_per_gas);
        append_quantity(&mut stream, request.gas_limit as u128);
        stream.append(&request.to.to_vec());
        append_quantity(&mut stream, request.value);
        stream.append(&request.data);
        stream.begin_list(0); // access list
        if let Some((sig, parity)) = signature {
            append_quantity(&mut stream, parity as u128);
            stream.append(&trim_leading_zeros(&sig[..32]));
            stream.append(&trim_leading_zeros(&sig[32..]));
        }
        stream.out().to_vec()
    };

    let mut preimage = vec![0x02];
    preimage.extend_from_slice(&payload(None));
    let digest = keccak256(&preimage);
    let (signature, recovery_id) =
        ecdsa::sign_recoverable(&digest, secret).map_err(|e| TxError::Signing(e.to_string()))?;

    let mut raw = vec![0x02];
    raw.extend_from_slice(&payload(Some((&signature, recovery_id))));
    Ok(raw)
}

fn trim_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    bytes[first..].to_vec()
}
