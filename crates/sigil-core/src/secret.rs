//! Zeroize-on-drop containers for secret material.
//!
//! Every live copy of a seed, private key, password, or session key lives in
//! one of these types. They overwrite their memory on drop, refuse to print
//! their contents, and make duplication an explicit call rather than a
//! silent `Copy`.

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A 64-byte BIP-39 seed.
///
/// Derived from (mnemonic, passphrase) via PBKDF2-HMAC-SHA512 and stored on
/// disk only encrypted. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Seed {
    bytes: [u8; 64],
}

impl Seed {
    /// Create a seed from raw bytes.
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self { bytes }
    }

    /// Create a seed from a slice; fails unless it is exactly 64 bytes.
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() != 64 {
            return None;
        }
        let mut bytes = [0u8; 64];
        bytes.copy_from_slice(slice);
        Some(Self { bytes })
    }

    /// Get the raw seed bytes. Handle with care.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.bytes
    }
}

impl Clone for Seed {
    fn clone(&self) -> Self {
        Self { bytes: self.bytes }
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seed").field("bytes", &"[REDACTED]").finish()
    }
}

/// A variable-length secret byte buffer (passwords, session keys, tokens).
///
/// Zeroized on drop. Comparison against plain buffers is deliberately not
/// implemented; callers that need equality compare derived hashes instead.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes {
    bytes: Vec<u8>,
}

impl SecretBytes {
    /// Wrap an owned buffer. The caller must not retain another copy.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Wrap a string's bytes, consuming and zeroing the original.
    pub fn from_string(mut s: String) -> Self {
        let bytes = s.as_bytes().to_vec();
        // The String's own allocation is cleared before it drops.
        unsafe { s.as_mut_vec() }.zeroize();
        Self { bytes }
    }

    /// Draw `len` random bytes from the OS CSPRNG.
    pub fn random(len: usize) -> Self {
        use rand::RngCore;
        let mut bytes = vec![0u8; len];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Clone for SecretBytes {
    fn clone(&self) -> Self {
        Self {
            bytes: self.bytes.clone(),
        }
    }
}

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretBytes")
            .field("len", &self.bytes.len())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A 32-byte secp256k1 private key. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey {
    bytes: [u8; 32],
}

impl PrivateKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey").field("bytes", &"[REDACTED]").finish()
    }
}
