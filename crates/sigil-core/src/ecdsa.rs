//! secp256k1 key operations and signing.
//!
//! All supported chains sign with secp256k1 ECDSA. BSV-family scripts carry
//! DER signatures; Ethereum carries compact 64-byte signatures plus a
//! recovery identifier. Nonces are deterministic (RFC 6979) and signatures
//! are low-S normalized, which Bitcoin consensus requires and Ethereum
//! mandates via EIP-2.

use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{RecoveryId, Signature, SigningKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use thiserror::Error;

use crate::secret::PrivateKey;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EcdsaError {
    /// Secret key out of curve order range (or zero).
    #[error("invalid private key")]
    InvalidPrivateKey,

    /// Public key bytes are not a valid curve point.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Signing failure from the underlying library.
    #[error("signing failed")]
    SigningFailed,
}

/// Derive the compressed (33-byte) public key for a private key.
pub fn derive_pubkey(secret: &PrivateKey) -> Result<[u8; 33], EcdsaError> {
    let signing_key = SigningKey::from_bytes(secret.as_bytes().into())
        .map_err(|_| EcdsaError::InvalidPrivateKey)?;
    let point = signing_key.verifying_key().to_encoded_point(true);
    let mut out = [0u8; 33];
    out.copy_from_slice(point.as_bytes());
    Ok(out)
}

/// Decompress a 33-byte public key to its 65-byte uncompressed form
/// (`0x04 || x || y`).
pub fn decompress_pubkey(compressed: &[u8; 33]) -> Result<[u8; 65], EcdsaError> {
    let pubkey = k256::PublicKey::from_sec1_bytes(compressed)
        .map_err(|_| EcdsaError::InvalidPublicKey)?;
    let point = pubkey.to_encoded_point(false);
    let mut out = [0u8; 65];
    out.copy_from_slice(point.as_bytes());
    Ok(out)
}

/// Sign a 32-byte digest, returning a low-S DER signature.
///
/// Used for BSV-family script signatures (the sighash flag byte is appended
/// by the transaction builder, not here).
pub fn sign_der(digest: &[u8; 32], secret: &PrivateKey) -> Result<Vec<u8>, EcdsaError> {
    let signing_key = SigningKey::from_bytes(secret.as_bytes().into())
        .map_err(|_| EcdsaError::InvalidPrivateKey)?;
    let signature: Signature = signing_key
        .sign_prehash(digest)
        .map_err(|_| EcdsaError::SigningFailed)?;
    let signature = signature.normalize_s().unwrap_or(signature);
    Ok(signature.to_der().as_bytes().to_vec())
}

/// Sign a 32-byte digest, returning the 64-byte `r || s` signature and the
/// recovery identifier. Used for Ethereum transactions.
pub fn sign_recoverable(
    digest: &[u8; 32],
    secret: &PrivateKey,
) -> Result<([u8; 64], u8), EcdsaError> {
    let signing_key = SigningKey::from_bytes(secret.as_bytes().into())
        .map_err(|_| EcdsaError::InvalidPrivateKey)?;
    let (signature, recovery_id): (Signature, RecoveryId) = signing_key
        .sign_prehash_recoverable(digest)
        .map_err(|_| EcdsaError::SigningFailed)?;
    let mut out = [0u8; 64];
    out.copy_from_slice(&signature.to_bytes());
    Ok((out, recovery_id.to_byte()))
}
