//! Key-material error types.

use sigil_core::error::{ErrorCode, SigilError};
use thiserror::Error;

/// Errors from mnemonic handling and key derivation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// Word count is not 12 or 24.
    #[error("invalid word count: {0} (expected 12 or 24)")]
    WordCount(usize),

    /// Phrase failed wordlist membership or checksum validation.
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// BIP-32 derivation failure.
    #[error("derivation failed: {0}")]
    Derivation(String),

    /// An extended *private* key was supplied where an xpub is required.
    #[error("extended key is private, expected xpub")]
    XpubIsPrivate,

    /// Unparseable or wrong-network extended public key.
    #[error("invalid xpub: {0}")]
    XpubInvalid(String),

    /// Discovery probe failure (network-side).
    #[error("discovery probe failed: {0}")]
    Probe(String),
}

impl From<KeyError> for SigilError {
    fn from(err: KeyError) -> Self {
        let code = match &err {
            KeyError::WordCount(_) | KeyError::InvalidMnemonic(_) => ErrorCode::InvalidInput,
            KeyError::Derivation(_) => ErrorCode::Internal,
            KeyError::XpubIsPrivate | KeyError::XpubInvalid(_) => ErrorCode::AgentXpubInvalid,
            KeyError::Probe(_) => ErrorCode::Network,
        };
        SigilError::new(code, err.to_string())
    }
}
