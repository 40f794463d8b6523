//! # sigil-keys — key-material lifecycle.
//!
//! BIP-39 mnemonic handling, BIP-32/BIP-44 derivation for the supported
//! chains, account-xpub export, and cross-wallet discovery scanning.
//!
//! - [`error`] — `KeyError` enum
//! - [`mnemonic`] — generate / normalize / validate, typo suggestion
//! - [`derivation`] — seed → xprv → per-chain addresses and private keys
//! - [`address`] — EIP-55 and P2PKH formatting and validation
//! - [`xpub`] — neutered account-key export and watch-only derivation
//! - [`discovery`] — multi-scheme gap scanning over a usage probe

pub mod address;
pub mod derivation;
pub mod discovery;
pub mod error;
pub mod mnemonic;
pub mod xpub;

pub use derivation::{AddressRecord, DerivationScheme};
pub use error::KeyError;
