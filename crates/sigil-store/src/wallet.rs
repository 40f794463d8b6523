//! Wallet metadata model and naming rules.
//!
//! The metadata half of a wallet file: identity, enabled chains, derivation
//! settings, and the append-only receive/change address lists. Address
//! vectors are indexed by position, which equals the BIP-44 address index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use sigil_core::chain::Chain;
use sigil_core::constants::{ADDRESS_GAP, MAX_WALLET_NAME_LEN, WALLET_VERSION};
use sigil_keys::derivation::AddressRecord;

use crate::error::StoreError;

/// Derivation settings carried in wallet metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivationConfig {
    /// BIP-44 account index.
    pub account: u32,
    /// Gap limit used by discovery and refresh scans.
    pub address_gap: u32,
}

impl Default for DerivationConfig {
    fn default() -> Self {
        Self {
            account: 0,
            address_gap: ADDRESS_GAP,
        }
    }
}

/// Wallet metadata. The encrypted seed lives beside it in the wallet file,
/// never inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub version: u32,
    pub enabled_chains: Vec<Chain>,
    pub derivation: DerivationConfig,
    /// External-chain addresses per chain, append-only, position = index.
    #[serde(default)]
    pub receive_addresses: BTreeMap<Chain, Vec<AddressRecord>>,
    /// Internal-chain addresses per chain, append-only, position = index.
    #[serde(default)]
    pub change_addresses: BTreeMap<Chain, Vec<AddressRecord>>,
}

impl Wallet {
    /// Create metadata for a new wallet. The name is validated.
    pub fn new(name: &str, enabled_chains: Vec<Chain>) -> Result<Self, StoreError> {
        validate_name(name)?;
        Ok(Self {
            name: name.to_string(),
            created_at: Utc::now(),
            version: WALLET_VERSION,
            enabled_chains,
            derivation: DerivationConfig::default(),
            receive_addresses: BTreeMap::new(),
            change_addresses: BTreeMap::new(),
        })
    }

    /// Next unused receive index for a chain.
    pub fn next_receive_index(&self, chain: Chain) -> u32 {
        self.receive_addresses.get(&chain).map_or(0, |v| v.len() as u32)
    }

    /// Next unused change index for a chain.
    pub fn next_change_index(&self, chain: Chain) -> u32 {
        self.change_addresses.get(&chain).map_or(0, |v| v.len() as u32)
    }

    /// Append a receive address. The record's index must equal the current
    /// list length: the lists are append-only and gap-free.
    pub fn push_receive_address(
        &mut self,
        chain: Chain,
        record: AddressRecord,
    ) -> Result<(), StoreError> {
        let list = self.receive_addresses.entry(chain).or_default();
        if record.index as usize != list.len() {
            return Err(StoreError::Serialization(format!(
                "receive index {} does not extend list of {}",
                record.index,
                list.len()
            )));
        }
        list.push(record);
        Ok(())
    }

    /// Append a change address, same rules as [`push_receive_address`].
    pub fn push_change_address(
        &mut self,
        chain: Chain,
        record: AddressRecord,
    ) -> Result<(), StoreError> {
        let list = self.change_addresses.entry(chain).or_default();
        if record.index as usize != list.len() {
            return Err(StoreError::Serialization(format!(
                "change index {} does not extend list of {}",
                record.index,
                list.len()
            )));
        }
        list.push(record);
        Ok(())
    }

    /// All known addresses (receive then change) for a chain.
    pub fn all_addresses(&self, chain: Chain) -> impl Iterator<Item = &AddressRecord> {
        self.receive_addresses
            .get(&chain)
            .into_iter()
            .flatten()
            .chain(self.change_addresses.get(&chain).into_iter().flatten())
    }

    pub fn chain_enabled(&self, chain: Chain) -> bool {
        self.enabled_chains.contains(&chain)
    }
}

/// Validate a wallet name: 1–64 chars from `[A-Za-z0-9_-]`.
pub fn validate_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() || name.len() > MAX_WALLET_NAME_LEN {
        return Err(StoreError::InvalidName(format!(
            "length {} not in 1..={MAX_WALLET_NAME_LEN}",
            name.len()
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Sanitize arbitrary input into a valid wallet name.
///
/// Invalid characters become `-`, runs collapse, and the result is truncated
/// to the maximum length. Falls back to `wallet` for unusable input.
pub fn suggest_wallet_name(input: &str) -> String {
    let mut out = String::with_capacity(input.len().min(MAX_WALLET_NAME_LEN));
    let mut last_dash = false;
    for c in input.trim().chars() {
        if out.len() >= MAX_WALLET_NAME_LEN {
            break;
        }
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
            last_dash = false;
        } else if !last_dash && !out.is_empty() {
            out.push('-');
            last_dash = true;
        }
    }
    let trimmed = out.trim_end_matches('-').to_string();
    if trimmed.is_empty() {
        "wallet".to_string()
    } else {
        trimmed
    }
}
