//! # sigil-core
//! Foundation types and crypto primitives for the Sigil wallet.
//!
//! - [`chain`] — closed sum type for the supported chains
//! - [`constants`] — protocol and storage constants
//! - [`error`] — structured error surface with exit codes
//! - [`secret`] — zeroize-on-drop secret buffers
//! - [`hashes`] — keccak-256, SHA-256(d), HASH160
//! - [`base58`] — Base58 and Base58Check codecs
//! - [`kdf`] — scrypt password-to-key derivation
//! - [`seal`] — authenticated seed encryption (AES-256-GCM)
//! - [`ecdsa`] — secp256k1 key operations and signing
//! - [`shamir`] — GF(2⁸) secret sharing with textual shares
//! - [`fsutil`] — atomic writes, file modes, corruption quarantine
//! - [`config`] — home layout and layered configuration

pub mod base58;
pub mod chain;
pub mod config;
pub mod constants;
pub mod ecdsa;
pub mod error;
pub mod fsutil;
pub mod hashes;
pub mod kdf;
pub mod seal;
pub mod secret;
pub mod shamir;

pub use chain::Chain;
pub use error::{ErrorCode, SigilError};
pub use secret::{SecretBytes, Seed};
