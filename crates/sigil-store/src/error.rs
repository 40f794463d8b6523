//! Store-layer error types.

use sigil_core::error::{ErrorCode, SigilError};
use sigil_core::seal::SealError;
use thiserror::Error;

/// Errors from the vault, session, agent, and auth layers.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Wallet name fails the `[A-Za-z0-9_-]{1,64}` rule.
    #[error("invalid wallet name: {0}")]
    InvalidName(String),

    /// A wallet file with this name already exists.
    #[error("wallet already exists: {0}")]
    WalletExists(String),

    /// No wallet file with this name.
    #[error("wallet not found: {0}")]
    WalletNotFound(String),

    /// Wrong password or tampered data, deliberately conflated.
    #[error("decryption failed: wrong password or corrupted data")]
    DecryptionFailed,

    /// Wallet file exists but cannot be parsed.
    #[error("corrupted wallet file: {0}")]
    CorruptedFile(String),

    /// No session for this wallet.
    #[error("no active session for wallet: {0}")]
    SessionNotFound(String),

    /// Session exists but its TTL has elapsed.
    #[error("session expired for wallet: {0}")]
    SessionExpired(String),

    /// Session file exists but cannot be parsed.
    #[error("session corrupted for wallet: {0}")]
    SessionCorrupted(String),

    /// The OS keyring failed its availability probe.
    #[error("OS keyring unavailable")]
    KeyringUnavailable,

    /// Agent token does not match any stored credential.
    #[error("invalid agent token")]
    AgentTokenInvalid,

    /// Agent credential has expired.
    #[error("agent token expired")]
    AgentTokenExpired,

    /// Transaction exceeds the per-transaction policy limit.
    #[error("agent policy violation: {0}")]
    AgentPolicyViolation(String),

    /// Transaction would exceed the daily aggregate limit.
    #[error("agent daily limit exceeded: sent {sent}, limit {limit}")]
    AgentDailyLimit { sent: u128, limit: u128 },

    /// Chain is not in the credential's chain set.
    #[error("agent not authorized for chain: {0}")]
    AgentChainDenied(String),

    /// Destination is not in the credential's allowlist.
    #[error("agent not authorized for address: {0}")]
    AgentAddrDenied(String),

    /// Exported xpub is malformed.
    #[error("invalid agent xpub: {0}")]
    AgentXpubInvalid(String),

    /// Spend attempted in xpub-only (read-only) mode.
    #[error("xpub-only mode cannot sign or send")]
    AgentXpubWriteDenied,

    /// Backup bundle failed its integrity check.
    #[error("backup verification failed: {0}")]
    BackupInvalid(String),

    /// Interactive input required but no prompt capability was supplied.
    #[error("input required but no prompt available: {0}")]
    PromptUnavailable(String),

    /// Serialization failure.
    #[error("serialization: {0}")]
    Serialization(String),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SealError> for StoreError {
    fn from(err: SealError) -> Self {
        match err {
            SealError::DecryptionFailed => StoreError::DecryptionFailed,
            SealError::EncryptionFailed(msg) => StoreError::Serialization(msg),
        }
    }
}

impl From<StoreError> for SigilError {
    fn from(err: StoreError) -> Self {
        use StoreError::*;
        let code = match &err {
            InvalidName(_) | PromptUnavailable(_) => ErrorCode::InvalidInput,
            WalletExists(_) => ErrorCode::WalletExists,
            WalletNotFound(_) => ErrorCode::WalletNotFound,
            DecryptionFailed => ErrorCode::DecryptionFailed,
            CorruptedFile(_) | Serialization(_) | Io(_) | BackupInvalid(_) => ErrorCode::Internal,
            SessionNotFound(_) => ErrorCode::SessionNotFound,
            SessionExpired(_) => ErrorCode::SessionExpired,
            SessionCorrupted(_) => ErrorCode::SessionCorrupted,
            KeyringUnavailable => ErrorCode::KeyringUnavailable,
            AgentTokenInvalid => ErrorCode::AgentTokenInvalid,
            AgentTokenExpired => ErrorCode::AgentTokenExpired,
            AgentPolicyViolation(_) => ErrorCode::AgentPolicyViolation,
            AgentDailyLimit { .. } => ErrorCode::AgentDailyLimit,
            AgentChainDenied(_) => ErrorCode::AgentChainDenied,
            AgentAddrDenied(_) => ErrorCode::AgentAddrDenied,
            AgentXpubInvalid(_) => ErrorCode::AgentXpubInvalid,
            AgentXpubWriteDenied => ErrorCode::AgentXpubWriteDenied,
        };
        let mut out = SigilError::new(code, err.to_string());
        if let AgentDailyLimit { sent, limit } = &err {
            out = out
                .with_detail("sent_today", sent)
                .with_detail("daily_limit", limit);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_decryption_conflates() {
        let err: StoreError = SealError::DecryptionFailed.into();
        assert!(matches!(err, StoreError::DecryptionFailed));
    }

    #[test]
    fn exit_codes_flow_through() {
        let cases: [(StoreError, i32); 6] = [
            (StoreError::WalletNotFound("a".into()), 4),
            (StoreError::DecryptionFailed, 3),
            (StoreError::AgentChainDenied("eth".into()), 2),
            (StoreError::AgentDailyLimit { sent: 1, limit: 1 }, 5),
            (StoreError::AgentXpubWriteDenied, 3),
            (StoreError::InvalidName("!".into()), 2),
        ];
        for (err, expected) in cases {
            let sigil: SigilError = err.into();
            assert_eq!(sigil.exit_code(), expected, "{}", sigil.message());
        }
    }

    #[test]
    fn daily_limit_carries_details() {
        let sigil: SigilError = StoreError::AgentDailyLimit { sent: 600_000, limit: 500_000 }.into();
        assert_eq!(sigil.details()["sent_today"], "600000");
        assert_eq!(sigil.details()["daily_limit"], "500000");
    }
}
