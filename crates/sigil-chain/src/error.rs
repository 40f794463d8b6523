//! Chain-side error types.

use sigil_core::error::{ErrorCode, SigilError};
use thiserror::Error;

/// Errors from providers and chain-side stores.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// Transport failure or timeout. Retryable.
    #[error("network error: {0}")]
    Network(String),

    /// Provider asked us to slow down. Retryable.
    #[error("rate limited by provider")]
    RateLimited,

    /// Bad or missing API key. Fatal to the call, never retried.
    #[error("provider authentication failed: {0}")]
    AuthFailed(String),

    /// Provider returned something unusable.
    #[error("provider error: {0}")]
    Provider(String),

    /// Broadcast failed, or timed out after bytes may have been sent.
    #[error("broadcast failed: {0}")]
    Broadcast(String),

    /// Cache file was corrupt and has been quarantined.
    #[error("balance cache was corrupt and has been reset")]
    CorruptCache,

    /// Serialization failure.
    #[error("serialization: {0}")]
    Serialization(String),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(String),
}

impl ChainError {
    /// Only idempotent-read failures are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChainError::Network(_) | ChainError::RateLimited)
    }
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::Io(err.to_string())
    }
}

impl From<ChainError> for SigilError {
    fn from(err: ChainError) -> Self {
        let code = match &err {
            ChainError::Network(_) | ChainError::RateLimited => ErrorCode::Network,
            ChainError::AuthFailed(_) => ErrorCode::Auth,
            ChainError::Broadcast(_) => ErrorCode::Broadcast,
            ChainError::CorruptCache => ErrorCode::CorruptCache,
            ChainError::Provider(_) | ChainError::Serialization(_) | ChainError::Io(_) => {
                ErrorCode::Internal
            }
        };
        let mut out = SigilError::new(code, err.to_string());
        if matches!(err, ChainError::Broadcast(_)) {
            out = out.with_suggestion(
                "the transaction may still confirm; check a chain explorer before retrying",
            );
        }
        out
    }
}
