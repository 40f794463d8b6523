//! Authenticated password-based encryption for seeds and backups.
//!
//! AES-256-GCM under an scrypt-derived key. The blob is self-describing:
//!
//! ```text
//! magic "SGL1" (4) || version (1) || log_n (1) || r (1) || p (1)
//!   || salt (32) || nonce (12) || ciphertext + tag
//! ```
//!
//! Wrong password and tampering are deliberately indistinguishable: every
//! failure after the magic check surfaces as [`SealError::DecryptionFailed`].

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use thiserror::Error;

use crate::kdf::{self, KdfParams, SALT_LEN};

/// Magic prefix identifying a Sigil sealed blob.
pub const SEAL_MAGIC: &[u8; 4] = b"SGL1";

/// Current blob format version.
pub const SEAL_VERSION: u8 = 1;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Header length: magic + version + kdf params.
const HEADER_LEN: usize = 4 + 1 + 3;

/// Minimum blob size: header + salt + nonce + auth tag.
const MIN_BLOB_LEN: usize = HEADER_LEN + SALT_LEN + NONCE_LEN + 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SealError {
    /// Wrong password, tampered blob, truncated blob: all conflated.
    #[error("decryption failed: wrong password or corrupted data")]
    DecryptionFailed,

    /// Encryption-side failure (should not happen with valid parameters).
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
}

/// Encrypt plaintext under a password.
///
/// A fresh salt and nonce are drawn per call, so encrypting the same
/// plaintext twice yields different blobs.
pub fn encrypt(plaintext: &[u8], password: &[u8], params: KdfParams) -> Result<Vec<u8>, SealError> {
    use rand::RngCore;
    let salt = kdf::random_salt();
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let key = kdf::derive_key(password, &salt, params)
        .map_err(|e| SealError::EncryptionFailed(e.to_string()))?;
    let cipher = Aes256Gcm::new_from_slice(&key.0)
        .map_err(|e| SealError::EncryptionFailed(e.to_string()))?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| SealError::EncryptionFailed(e.to_string()))?;

    let mut blob = Vec::with_capacity(MIN_BLOB_LEN + plaintext.len());
    blob.extend_from_slice(SEAL_MAGIC);
    blob.push(SEAL_VERSION);
    blob.push(params.log_n);
    blob.push(params.r);
    blob.push(params.p);
    blob.extend_from_slice(&salt);
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Decrypt a blob produced by [`encrypt`].
pub fn decrypt(blob: &[u8], password: &[u8]) -> Result<Vec<u8>, SealError> {
    if blob.len() < MIN_BLOB_LEN
        || &blob[..4] != SEAL_MAGIC
        || blob[4] != SEAL_VERSION
    {
        return Err(SealError::DecryptionFailed);
    }

    let params = KdfParams {
        log_n: blob[5],
        r: blob[6],
        p: blob[7],
    };
    let salt = &blob[HEADER_LEN..HEADER_LEN + SALT_LEN];
    let nonce_bytes = &blob[HEADER_LEN + SALT_LEN..HEADER_LEN + SALT_LEN + NONCE_LEN];
    let ciphertext = &blob[HEADER_LEN + SALT_LEN + NONCE_LEN..];

    let key = kdf::derive_key(password, salt, params).map_err(|_| SealError::DecryptionFailed)?;
    let cipher =
        Aes256Gcm::new_from_slice(&key.0).map_err(|_| SealError::DecryptionFailed)?;
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| SealError::DecryptionFailed)
}
