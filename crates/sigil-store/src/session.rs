//! Short-lived unlock sessions backed by the OS keyring.
//!
//! A session splits trust between two places: the seed encrypted under a
//! random 32-byte session key in `<home>/sessions/<name>.session`, and the
//! session key itself in the OS keyring (service `sigil-session`, user
//! `wallet:<name>`). Either half alone is useless.
//!
//! Invariant: the session file exists iff its keyring entry exists. Every
//! path that observes a broken half runs the same idempotent cleanup.
//!
//! The keyring is probed once at construction with a set/get/delete round
//! trip bounded by a 3-second deadline, so a stuck keyring daemon degrades
//! Sigil to per-command password prompts instead of hanging startup.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use tracing::{debug, warn};
use zeroize::Zeroize;

use sigil_core::constants::{
    DIR_MODE, FILE_MODE_SECRET, KDF_LOG_N_TEST, KEYRING_PROBE_SERVICE, KEYRING_PROBE_TIMEOUT_SECS,
    KEYRING_SERVICE, SESSION_FILE_EXT, SESSION_TTL_MAX_SECS, SESSION_TTL_MIN_SECS,
};
use sigil_core::fsutil;
use sigil_core::kdf::KdfParams;
use sigil_core::seal;
use sigil_core::secret::{SecretBytes, Seed};

use crate::error::StoreError;
use crate::wallet::validate_name;

/// Session metadata (the non-secret half of the session file).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub wallet_name: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Remaining lifetime; zero once expired.
    pub fn remaining(&self) -> Duration {
        (self.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }
}

#[derive(Serialize, Deserialize)]
struct SessionFile {
    session: Session,
    encrypted_seed: String,
}

/// Where session keys live. The OS keyring in production; an in-memory map
/// in tests and on platforms with no usable keyring daemon.
pub trait SessionKeyStore: Send + Sync {
    fn set(&self, user: &str, value: &str) -> Result<(), StoreError>;
    fn get(&self, user: &str) -> Result<Option<String>, StoreError>;
    fn delete(&self, user: &str) -> Result<(), StoreError>;
    /// One set/get/delete round trip against a throwaway entry.
    fn probe(&self) -> bool;
}

/// The real OS keyring under service [`KEYRING_SERVICE`].
pub struct OsKeyring;

impl OsKeyring {
    fn entry(user: &str) -> Result<keyring::Entry, StoreError> {
        keyring::Entry::new(KEYRING_SERVICE, user)
            .map_err(|_| StoreError::KeyringUnavailable)
    }
}

impl SessionKeyStore for OsKeyring {
    fn set(&self, user: &str, value: &str) -> Result<(), StoreError> {
        Self::entry(user)?
            .set_password(value)
            .map_err(|_| StoreError::KeyringUnavailable)
    }

    fn get(&self, user: &str) -> Result<Option<String>, StoreError> {
        match Self::entry(user)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(_) => Err(StoreError::KeyringUnavailable),
        }
    }

    fn delete(&self, user: &str) -> Result<(), StoreError> {
        match Self::entry(user)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(_) => Err(StoreError::KeyringUnavailable),
        }
    }

    fn probe(&self) -> bool {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let ok = (|| -> Result<(), keyring::Error> {
                let entry = keyring::Entry::new(KEYRING_PROBE_SERVICE, "probe")?;
                entry.set_password("probe")?;
                entry.get_password()?;
                let _ = entry.delete_credential();
                Ok(())
            })()
            .is_ok();
            let _ = tx.send(ok);
        });
        // A stuck daemon leaves the probe thread detached; startup moves on.
        rx.recv_timeout(Duration::from_secs(KEYRING_PROBE_TIMEOUT_SECS))
            .unwrap_or(false)
    }
}

/// In-memory key store for tests.
#[derive(Default)]
pub struct MemoryKeyStore {
    entries: parking_lot::Mutex<HashMap<String, String>>,
}

impl SessionKeyStore for MemoryKeyStore {
    fn set(&self, user: &str, value: &str) -> Result<(), StoreError> {
        self.entries.lock().insert(user.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, user: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(user).cloned())
    }

    fn delete(&self, user: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(user);
        Ok(())
    }

    fn probe(&self) -> bool {
        true
    }
}

/// Per-wallet session lifecycle manager.
pub struct SessionManager {
    dir: PathBuf,
    store: Box<dyn SessionKeyStore>,
    available: bool,
    lock: RwLock<()>,
}

impl SessionManager {
    /// Manager over the OS keyring; runs the availability probe once.
    pub fn new(dir: PathBuf) -> Self {
        Self::with_store(dir, Box::new(OsKeyring))
    }

    /// Manager over an explicit key store (tests inject [`MemoryKeyStore`]).
    pub fn with_store(dir: PathBuf, store: Box<dyn SessionKeyStore>) -> Self {
        let available = store.probe();
        if !available {
            warn!("keyring unavailable; sessions disabled for this run");
        }
        Self {
            dir,
            store,
            available,
            lock: RwLock::new(()),
        }
    }

    /// Whether the keyring answered its probe. Cached for the manager's
    /// lifetime.
    pub fn keyring_available(&self) -> bool {
        self.available
    }

    /// Session keys are already uniformly random, so memory-hard stretching
    /// buys nothing; the low cost keeps unlock latency negligible.
    fn session_kdf() -> KdfParams {
        KdfParams {
            log_n: KDF_LOG_N_TEST,
            ..KdfParams::default()
        }
    }

    fn keyring_user(name: &str) -> String {
        format!("wallet:{name}")
    }

    fn session_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        validate_name(name)?;
        Ok(self.dir.join(format!("{name}.{SESSION_FILE_EXT}")))
    }

    /// Start (or replace) a session for a wallet.
    ///
    /// The TTL is clamped to `[1 min, 60 min]`. The file is written before
    /// the keyring entry; a keyring failure rolls the file back so no
    /// half-session survives.
    pub fn start_session(
        &self,
        name: &str,
        seed: &Seed,
        ttl: Duration,
    ) -> Result<Session, StoreError> {
        if !self.available {
            return Err(StoreError::KeyringUnavailable);
        }
        let _guard = self.lock.write();
        let path = self.session_path(name)?;
        fsutil::ensure_dir(&self.dir, DIR_MODE)?;

        let ttl_secs = ttl.as_secs().clamp(SESSION_TTL_MIN_SECS, SESSION_TTL_MAX_SECS);
        let now = Utc::now();
        let session = Session {
            wallet_name: name.to_string(),
            created_at: now,
            expires_at: now + ChronoDuration::seconds(ttl_secs as i64),
        };

        let session_key = SecretBytes::random(32);
        let blob = seal::encrypt(seed.as_bytes(), session_key.as_bytes(), Self::session_kdf())?;
        let file = SessionFile {
            session: session.clone(),
            encrypted_seed: hex::encode(blob),
        };
        let json = serde_json::to_vec_pretty(&file)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        fsutil::write_atomic(&path, &json, FILE_MODE_SECRET)?;

        let mut encoded = hex::encode(session_key.as_bytes());
        let stored = self.store.set(&Self::keyring_user(name), &encoded);
        encoded.zeroize();
        if let Err(err) = stored {
            // Roll back the file so no orphan half-session remains.
            let _ = fs::remove_file(&path);
            return Err(err);
        }

        debug!(wallet = %name, ttl_secs, "session started");
        Ok(session)
    }

    /// Retrieve the seed for an active session.
    ///
    /// Expired, corrupted, and half-deleted sessions are torn down before
    /// the error returns, so the caller never needs to clean up.
    pub fn get_session(&self, name: &str) -> Result<(Seed, Session), StoreError> {
        if !self.available {
            return Err(StoreError::KeyringUnavailable);
        }
        let _guard = self.lock.read();
        let path = self.session_path(name)?;

        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::SessionNotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let file: SessionFile = match serde_json::from_slice(&bytes) {
            Ok(f) => f,
            Err(_) => {
                self.cleanup(name);
                return Err(StoreError::SessionCorrupted(name.to_string()));
            }
        };

        if file.session.is_expired() {
            self.cleanup(name);
            return Err(StoreError::SessionExpired(name.to_string()));
        }

        let Some(mut encoded) = self.store.get(&Self::keyring_user(name))? else {
            // Orphaned file: the keyring half is gone.
            self.cleanup(name);
            return Err(StoreError::SessionNotFound(name.to_string()));
        };
        let key_bytes = hex::decode(&encoded).unwrap_or_default();
        encoded.zeroize();
        let session_key = SecretBytes::new(key_bytes);

        let blob = hex::decode(&file.encrypted_seed).unwrap_or_default();
        let mut plain = match seal::decrypt(&blob, session_key.as_bytes()) {
            Ok(p) => p,
            Err(_) => {
                self.cleanup(name);
                return Err(StoreError::SessionCorrupted(name.to_string()));
            }
        };
        let seed = Seed::from_slice(&plain);
        plain.zeroize();
        match seed {
            Some(seed) => Ok((seed, file.session)),
            None => {
                self.cleanup(name);
                Err(StoreError::SessionCorrupted(name.to_string()))
            }
        }
    }

    /// File-only check: is there an unexpired session file? Never touches
    /// the keyring.
    pub fn has_valid_session(&self, name: &str) -> bool {
        let Ok(path) = self.session_path(name) else {
            return false;
        };
        let Ok(bytes) = fs::read(&path) else {
            return false;
        };
        match serde_json::from_slice::<SessionFile>(&bytes) {
            Ok(file) => !file.session.is_expired(),
            Err(_) => false,
        }
    }

    /// End a session: keyring entry first (best effort), then the file.
    pub fn end_session(&self, name: &str) -> Result<(), StoreError> {
        validate_name(name)?;
        let _guard = self.lock.write();
        self.cleanup(name);
        debug!(wallet = %name, "session ended");
        Ok(())
    }

    /// End every session in the sessions directory.
    pub fn end_all_sessions(&self) -> Result<usize, StoreError> {
        if !self.dir.exists() {
            return Ok(0);
        }
        let suffix = format!(".{SESSION_FILE_EXT}");
        let mut ended = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(name) = entry
                .file_name()
                .to_str()
                .and_then(|f| f.strip_suffix(&suffix))
            {
                let name = name.to_string();
                let _guard = self.lock.write();
                self.cleanup(&name);
                ended += 1;
            }
        }
        Ok(ended)
    }

    /// Idempotent teardown of both session halves.
    fn cleanup(&self, name: &str) {
        if let Err(err) = self.store.delete(&Self::keyring_user(name)) {
            warn!(wallet = %name, %err, "keyring delete failed during session cleanup");
        }
        if let Ok(path) = self.session_path(name) {
            let _ = fs::remove_file(path);
        }
    }
}
