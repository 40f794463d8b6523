//! End-to-end scenario tests for the Sigil wallet.
//!
//! This crate contains integration tests that exercise fixed interop
//! vectors (BIP-39, P2PKH, WIF, Shamir shares) and cross-crate flows
//! (vault + session + agent policy) against literal inputs.

/// The reference mnemonic used across scenario tests.
pub const VECTOR_PHRASE: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
