//! BIP-32/BIP-44 derivation from seed to chain addresses.
//!
//! The standard path is `m/44'/coin'/account'/change/index`, hardened
//! through the account level. Discovery additionally walks the legacy
//! HandCash path `m/0'/index`. All derivation goes through
//! [`DerivationScheme`] so path construction lives in exactly one place.

use bip32::{ChildNumber, XPrv};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

use sigil_core::chain::Chain;
use sigil_core::ecdsa;
use sigil_core::secret::{PrivateKey, Seed};

use crate::address;
use crate::error::KeyError;

/// External (receive) chain index in BIP-44.
pub const CHANGE_EXTERNAL: u32 = 0;

/// Internal (change) chain index in BIP-44.
pub const CHANGE_INTERNAL: u32 = 1;

/// A derived address together with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    /// Full derivation path, e.g. `m/44'/236'/0'/0/5`.
    pub derivation_path: String,
    /// Address index (the final path component).
    pub index: u32,
    /// Chain-formatted address string.
    pub address: String,
    /// Hex of the compressed public key.
    pub public_key_hex: String,
    /// Whether this is an internal (change) address.
    pub is_change: bool,
}

/// How a key tree is walked. Covers the standard per-chain scheme plus the
/// legacy layouts probed during cross-wallet discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivationScheme {
    /// `m/44'/coin'/account'/change/index` for a chain.
    Bip44 { chain: Chain, account: u32 },
    /// HandCash-1 legacy: `m/0'/index` (no change chain).
    HandCashLegacy,
}

impl DerivationScheme {
    /// Standard scheme for a chain, account 0.
    pub fn standard(chain: Chain) -> Self {
        Self::Bip44 { chain, account: 0 }
    }

    /// Child numbers from the master key down to `(change, index)`.
    ///
    /// For [`DerivationScheme::HandCashLegacy`] the change level does not
    /// exist and is ignored.
    fn child_numbers(&self, change: u32, index: u32) -> Result<Vec<ChildNumber>, KeyError> {
        let harden = |i: u32| {
            ChildNumber::new(i, true).map_err(|e| KeyError::Derivation(e.to_string()))
        };
        let normal = |i: u32| {
            ChildNumber::new(i, false).map_err(|e| KeyError::Derivation(e.to_string()))
        };
        match self {
            DerivationScheme::Bip44 { chain, account } => Ok(vec![
                harden(44)?,
                harden(chain.coin_type())?,
                harden(*account)?,
                normal(change)?,
                normal(index)?,
            ]),
            DerivationScheme::HandCashLegacy => Ok(vec![harden(0)?, normal(index)?]),
        }
    }

    /// Render the path for an address record.
    pub fn path_string(&self, change: u32, index: u32) -> String {
        match self {
            DerivationScheme::Bip44 { chain, account } => {
                format!("m/44'/{}'/{account}'/{change}/{index}", chain.coin_type())
            }
            DerivationScheme::HandCashLegacy => format!("m/0'/{index}"),
        }
    }

    /// The chain whose address format applies.
    pub fn chain(&self) -> Chain {
        match self {
            DerivationScheme::Bip44 { chain, .. } => *chain,
            // HandCash wallets were BSV wallets.
            DerivationScheme::HandCashLegacy => Chain::Bsv,
        }
    }
}

impl fmt::Display for DerivationScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DerivationScheme::Bip44 { chain, account } => {
                write!(f, "bip44({chain}, account {account})")
            }
            DerivationScheme::HandCashLegacy => f.write_str("handcash-legacy"),
        }
    }
}

/// Compressed SEC1 public key bytes for an extended private key.
pub(crate) fn compressed_pubkey(xprv: &XPrv) -> [u8; 33] {
    use bip32::PublicKey as _;
    xprv.public_key().public_key().to_bytes()
}

/// Derive the extended private key at the scheme's `(change, index)` leaf.
fn derive_leaf(
    seed: &Seed,
    scheme: DerivationScheme,
    change: u32,
    index: u32,
) -> Result<XPrv, KeyError> {
    let mut xprv =
        XPrv::new(seed.as_bytes()).map_err(|e| KeyError::Derivation(e.to_string()))?;
    for child in scheme.child_numbers(change, index)? {
        xprv = xprv
            .derive_child(child)
            .map_err(|e| KeyError::Derivation(e.to_string()))?;
    }
    Ok(xprv)
}

/// Format an address for a chain from a compressed public key.
pub fn format_address(chain: Chain, compressed: &[u8; 33]) -> Result<String, KeyError> {
    match chain {
        Chain::Eth => {
            let uncompressed = ecdsa::decompress_pubkey(compressed)
                .map_err(|e| KeyError::Derivation(e.to_string()))?;
            Ok(address::eth_address_from_pubkey(&uncompressed))
        }
        Chain::Bsv | Chain::Btc | Chain::Bch => {
            Ok(address::p2pkh_address_from_pubkey(compressed))
        }
    }
}

/// Derive the receive address at `(chain, account, index)`.
pub fn derive_address(
    seed: &Seed,
    chain: Chain,
    account: u32,
    index: u32,
) -> Result<AddressRecord, KeyError> {
    derive_address_at(seed, DerivationScheme::Bip44 { chain, account }, CHANGE_EXTERNAL, index)
}

/// Derive the address at an explicit scheme/change/index position.
pub fn derive_address_at(
    seed: &Seed,
    scheme: DerivationScheme,
    change: u32,
    index: u32,
) -> Result<AddressRecord, KeyError> {
    let xprv = derive_leaf(seed, scheme, change, index)?;
    let compressed = compressed_pubkey(&xprv);
    let addr = format_address(scheme.chain(), &compressed)?;
    Ok(AddressRecord {
        derivation_path: scheme.path_string(change, index),
        index,
        address: addr,
        public_key_hex: hex::encode(compressed),
        is_change: change == CHANGE_INTERNAL,
    })
}

/// Derive the raw private key at a BIP-44 position. The caller owns
/// zeroization (the returned type zeros on drop).
pub fn derive_private_key(
    seed: &Seed,
    chain: Chain,
    account: u32,
    change: u32,
    index: u32,
) -> Result<PrivateKey, KeyError> {
    derive_private_key_at(seed, DerivationScheme::Bip44 { chain, account }, change, index)
}

/// Scheme-explicit variant of [`derive_private_key`].
pub fn derive_private_key_at(
    seed: &Seed,
    scheme: DerivationScheme,
    change: u32,
    index: u32,
) -> Result<PrivateKey, KeyError> {
    let xprv = derive_leaf(seed, scheme, change, index)?;
    let mut bytes: [u8; 32] = xprv.private_key().to_bytes().into();
    let key = PrivateKey::from_bytes(bytes);
    bytes.zeroize();
    Ok(key)
}

/// Derive the hardened account-level extended private key
/// (`m/44'/coin'/account'`). Used by xpub export.
pub(crate) fn derive_account_xprv(
    seed: &Seed,
    chain: Chain,
    account: u32,
) -> Result<XPrv, KeyError> {
    let harden =
        |i: u32| ChildNumber::new(i, true).map_err(|e| KeyError::Derivation(e.to_string()));
    let mut xprv =
        XPrv::new(seed.as_bytes()).map_err(|e| KeyError::Derivation(e.to_string()))?;
    for child in [harden(44)?, harden(chain.coin_type())?, harden(account)?] {
        xprv = xprv
            .derive_child(child)
            .map_err(|e| KeyError::Derivation(e.to_string()))?;
    }
    Ok(xprv)
}
