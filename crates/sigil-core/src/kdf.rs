//! scrypt password-to-key derivation.
//!
//! Parameters travel with every encrypted blob so old wallets keep opening
//! after the production work factor is raised.

use thiserror::Error;
use zeroize::Zeroize;

use crate::constants::{KDF_LOG_N, KDF_P, KDF_R};

/// Derived key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// Salt length in bytes.
pub const SALT_LEN: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KdfError {
    /// Parameter combination rejected by scrypt.
    #[error("invalid kdf parameters: log_n={log_n} r={r} p={p}")]
    InvalidParams { log_n: u8, r: u8, p: u8 },
}

/// scrypt cost parameters carried in blob headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// log2 of the CPU/memory cost N.
    pub log_n: u8,
    /// Block size.
    pub r: u8,
    /// Parallelism.
    pub p: u8,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            log_n: KDF_LOG_N,
            r: KDF_R,
            p: KDF_P,
        }
    }
}

impl KdfParams {
    /// Lowered-cost parameters for tests.
    pub fn for_tests() -> Self {
        Self {
            log_n: crate::constants::KDF_LOG_N_TEST,
            ..Self::default()
        }
    }
}

/// A derived 32-byte key, zeroized on drop.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct DerivedKey(pub [u8; KEY_LEN]);

/// Derive a key from a password and salt.
///
/// Deterministic for a fixed `(password, salt, params)` triple. CPU-bound
/// and not cancellable; callers treat it as a blocking suspension point.
pub fn derive_key(password: &[u8], salt: &[u8], params: KdfParams) -> Result<DerivedKey, KdfError> {
    let scrypt_params = scrypt::Params::new(params.log_n, params.r as u32, params.p as u32, KEY_LEN)
        .map_err(|_| KdfError::InvalidParams {
            log_n: params.log_n,
            r: params.r,
            p: params.p,
        })?;
    let mut key = [0u8; KEY_LEN];
    scrypt::scrypt(password, salt, &scrypt_params, &mut key)
        .map_err(|_| KdfError::InvalidParams {
            log_n: params.log_n,
            r: params.r,
            p: params.p,
        })?;
    Ok(DerivedKey(key))
}

/// Draw a random salt from the OS CSPRNG.
pub fn random_salt() -> [u8; SALT_LEN] {
    use rand::RngCore;
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_same_inputs() {
        let params = KdfParams::for_tests();
        let k1 = derive_key(b"password", &[7u8; SALT_LEN], params).unwrap();
        let k2 = derive_key(b"password", &[7u8; SALT_LEN], params).unwrap();
        assert_eq!(k1.0, k2.0);
    }

    #[test]
    fn different_passwords_differ() {
        let params = KdfParams::for_tests();
        let k1 = derive_key(b"password1", &[7u8; SALT_LEN], params).unwrap();
        let k2 = derive_key(b"password2", &[7u8; SALT_LEN], params).unwrap();
        assert_ne!(k1.0, k2.0);
    }

    #[test]
    fn different_salts_differ() {
        let params = KdfParams::for_tests();
        let k1 = derive_key(b"password", &[1u8; SALT_LEN], params).unwrap();
        let k2 = derive_key(b"password", &[2u8; SALT_LEN], params).unwrap();
        assert_ne!(k1.0, k2.0);
    }

    #[test]
    fn different_work_factors_differ() {
        let low = KdfParams { log_n: 10, r: 8, p: 1 };
        let high = KdfParams { log_n: 11, r: 8, p: 1 };
        let k1 = derive_key(b"password", &[7u8; SALT_LEN], low).unwrap();
        let k2 = derive_key(b"password", &[7u8; SALT_LEN], high).unwrap();
        assert_ne!(k1.0, k2.0);
    }

    #[test]
    fn zero_log_n_rejected() {
        let params = KdfParams { log_n: 0, r: 8, p: 1 };
        assert!(matches!(
            derive_key(b"password", &[7u8; SALT_LEN], params),
            Err(KdfError::InvalidParams { .. })
        ));
    }

    #[test]
    fn random_salts_distinct() {
        assert_ne!(random_salt(), random_salt());
    }
}
