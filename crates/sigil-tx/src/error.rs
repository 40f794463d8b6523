//! Transaction-pipeline error types.

use sigil_core::error::{ErrorCode, SigilError};
use thiserror::Error;

/// Errors from building and signing transactions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxError {
    /// Inputs cannot cover amount plus fee.
    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: u128, need: u128 },

    /// No spendable outputs at all.
    #[error("no UTXOs available")]
    NoUtxos,

    /// Zero or overflowing amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Destination failed validation for the chain.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Key derivation or signing failure.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Structural build failure.
    #[error("build error: {0}")]
    Build(String),
}

impl From<TxError> for SigilError {
    fn from(err: TxError) -> Self {
        let code = match &err {
            TxError::InsufficientFunds { .. } => ErrorCode::InsufficientFunds,
            TxError::NoUtxos => ErrorCode::InsufficientFunds,
            TxError::InvalidAmount(_) | TxError::InvalidAddress(_) => ErrorCode::InvalidInput,
            TxError::Signing(_) | TxError::Build(_) => ErrorCode::Internal,
        };
        let mut out = SigilError::new(code, err.to_string());
        if let TxError::InsufficientFunds { have, need } = &err {
            out = out.with_detail("have", have).with_detail("need", need);
        }
        out
    }
}
