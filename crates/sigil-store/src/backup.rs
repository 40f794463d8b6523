//! Encrypted wallet export bundles.
//!
//! A backup is the wallet file (metadata + sealed seed, verbatim) wrapped
//! in a manifest with a `sha256d` digest, the whole thing sealed under a
//! backup password. Verification decrypts and checks the digest and name
//! consistency without writing anything; restore refuses to overwrite.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use sigil_core::constants::{DIR_MODE, FILE_MODE_SECRET};
use sigil_core::fsutil;
use sigil_core::hashes::sha256d;
use sigil_core::kdf::KdfParams;
use sigil_core::seal;

use crate::error::StoreError;
use crate::vault::WalletVault;

/// Bundle format version.
const BUNDLE_VERSION: u32 = 1;

/// Decrypted bundle contents.
#[derive(Serialize, Deserialize)]
struct Bundle {
    version: u32,
    wallet_name: String,
    exported_at: DateTime<Utc>,
    /// The wallet file bytes, hex-encoded, byte-for-byte.
    wallet_file: String,
    /// sha256d of the raw wallet file bytes.
    digest: String,
}

/// What a successful verification reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    pub wallet_name: String,
    pub exported_at: DateTime<Utc>,
}

/// Export a wallet into `<backups_dir>/<name>-<date>.sigil`.
pub fn export(
    vault: &WalletVault,
    name: &str,
    backup_password: &[u8],
    backups_dir: &Path,
    kdf: KdfParams,
) -> Result<PathBuf, StoreError> {
    let raw = vault.read_raw(name)?;
    let bundle = Bundle {
        version: BUNDLE_VERSION,
        wallet_name: name.to_string(),
        exported_at: Utc::now(),
        wallet_file: hex::encode(&raw),
        digest: hex::encode(sha256d(&raw)),
    };
    let plain =
        serde_json::to_vec(&bundle).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let sealed = seal::encrypt(&plain, backup_password, kdf)?;

    fsutil::ensure_dir(backups_dir, DIR_MODE)?;
    let date = bundle.exported_at.format("%Y-%m-%d");
    let path = backups_dir.join(format!("{name}-{date}.sigil"));
    fsutil::write_atomic(&path, &sealed, FILE_MODE_SECRET)?;
    debug!(wallet = %name, path = %path.display(), "backup exported");
    Ok(path)
}

/// Decrypt a bundle and check its integrity. Read-only.
pub fn verify(path: &Path, backup_password: &[u8]) -> Result<BackupInfo, StoreError> {
    let bundle = open(path, backup_password)?;
    Ok(BackupInfo {
        wallet_name: bundle.wallet_name,
        exported_at: bundle.exported_at,
    })
}

/// Restore a bundle into the vault. Refuses to overwrite an existing
/// wallet of the same name.
pub fn restore(
    path: &Path,
    backup_password: &[u8],
    vault: &WalletVault,
) -> Result<BackupInfo, StoreError> {
    let bundle = open(path, backup_password)?;
    let raw = hex::decode(&bundle.wallet_file)
        .map_err(|e| StoreError::BackupInvalid(format!("payload not hex: {e}")))?;
    vault.write_raw(&bundle.wallet_name, &raw)?;
    debug!(wallet = %bundle.wallet_name, "backup restored");
    Ok(BackupInfo {
        wallet_name: bundle.wallet_name,
        exported_at: bundle.exported_at,
    })
}

fn open(path: &Path, backup_password: &[u8]) -> Result<Bundle, StoreError> {
    let sealed = fs::read(path)?;
    let plain = seal::decrypt(&sealed, backup_password)?;
    let bundle: Bundle = serde_json::from_slice(&plain)
        .map_err(|e| StoreError::BackupInvalid(format!("bundle unreadable: {e}")))?;

    if bundle.version != BUNDLE_VERSION {
        return Err(StoreError::BackupInvalid(format!(
            "unsupported bundle version {}",
            bundle.version
        )));
    }
    let raw = hex::decode(&bundle.wallet_file)
        .map_err(|e| StoreError::BackupInvalid(format!("payload not hex: {e}")))?;
    if hex::encode(sha256d(&raw)) != bundle.digest {
        return Err(StoreError::BackupInvalid("digest mismatch".into()));
    }
    // The embedded metadata must agree with the manifest name.
    let file: serde_json::Value = serde_json::from_slice(&raw)
        .map_err(|e| StoreError::BackupInvalid(format!("wallet file unreadable: {e}")))?;
    if file["wallet"]["name"].as_str() != Some(bundle.wallet_name.as_str()) {
        return Err(StoreError::BackupInvalid("wallet name mismatch".into()));
    }
    Ok(bundle)
}
