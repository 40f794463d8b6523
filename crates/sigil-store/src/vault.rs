//! Encrypted wallet files under `<home>/wallets`.
//!
//! Each wallet is one JSON file: `{ "wallet": <metadata>, "encrypted_seed":
//! <hex of sealed blob> }`, mode 0600, written atomically. The plaintext
//! seed never touches disk and the password never appears in the file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use sigil_core::constants::{DIR_MODE, FILE_MODE_SECRET, WALLET_FILE_EXT};
use sigil_core::fsutil;
use sigil_core::kdf::KdfParams;
use sigil_core::seal;
use sigil_core::secret::Seed;

use crate::error::StoreError;
use crate::wallet::{validate_name, Wallet};

/// On-disk wallet file shape.
#[derive(Serialize, Deserialize)]
struct WalletFile {
    wallet: Wallet,
    encrypted_seed: String,
}

/// The at-rest wallet store.
pub struct WalletVault {
    dir: PathBuf,
    kdf: KdfParams,
}

impl WalletVault {
    /// Vault over a wallets directory with production KDF cost.
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            kdf: KdfParams::default(),
        }
    }

    /// Vault with explicit KDF parameters (tests lower the work factor).
    pub fn with_kdf(dir: PathBuf, kdf: KdfParams) -> Self {
        Self { dir, kdf }
    }

    /// Resolve and defend the path for a wallet name.
    ///
    /// The name is validated against the character rule first; the joined
    /// path is then re-checked to end in `<name>.wallet` directly under the
    /// vault directory, so a validation bug cannot become a traversal.
    pub fn wallet_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        validate_name(name)?;
        let path = self.dir.join(format!("{name}.{WALLET_FILE_EXT}"));
        let expected_file = format!("{name}.{WALLET_FILE_EXT}");
        let clean_parent = path.parent() == Some(self.dir.as_path());
        let clean_name = path.file_name().and_then(|f| f.to_str()) == Some(expected_file.as_str());
        if !clean_parent || !clean_name {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(path)
    }

    /// Save a new wallet. Rejects an existing name.
    pub fn save(&self, wallet: &Wallet, seed: &Seed, password: &[u8]) -> Result<(), StoreError> {
        let path = self.wallet_path(&wallet.name)?;
        if path.exists() {
            return Err(StoreError::WalletExists(wallet.name.clone()));
        }
        fsutil::ensure_dir(&self.dir, DIR_MODE)?;

        let blob = seal::encrypt(seed.as_bytes(), password, self.kdf)?;
        let file = WalletFile {
            wallet: wallet.clone(),
            encrypted_seed: hex::encode(blob),
        };
        let json = serde_json::to_vec_pretty(&file)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        fsutil::write_atomic(&path, &json, FILE_MODE_SECRET)?;
        debug!(wallet = %wallet.name, "wallet saved");
        Ok(())
    }

    /// Load metadata and decrypt the seed. The caller owns the seed's
    /// lifetime; it zeroes on drop.
    pub fn load(&self, name: &str, password: &[u8]) -> Result<(Wallet, Seed), StoreError> {
        let file = self.read_file(name)?;
        let blob = hex::decode(&file.encrypted_seed)
            .map_err(|_| StoreError::DecryptionFailed)?;
        let mut plain = seal::decrypt(&blob, password)?;
        let seed = Seed::from_slice(&plain).ok_or(StoreError::DecryptionFailed)?;
        use zeroize::Zeroize;
        plain.zeroize();
        Ok((file.wallet, seed))
    }

    /// Load only the metadata; the encrypted seed is not touched.
    pub fn load_metadata(&self, name: &str) -> Result<Wallet, StoreError> {
        Ok(self.read_file(name)?.wallet)
    }

    /// Replace the metadata subtree, preserving `encrypted_seed`
    /// byte-for-byte. Rejects names without an existing file.
    pub fn update_metadata(&self, wallet: &Wallet) -> Result<(), StoreError> {
        let path = self.wallet_path(&wallet.name)?;
        if !path.exists() {
            return Err(StoreError::WalletNotFound(wallet.name.clone()));
        }
        let existing = self.read_file(&wallet.name)?;
        let file = WalletFile {
            wallet: wallet.clone(),
            encrypted_seed: existing.encrypted_seed,
        };
        let json = serde_json::to_vec_pretty(&file)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        fsutil::write_atomic(&path, &json, FILE_MODE_SECRET)?;
        Ok(())
    }

    /// Names of all wallets in the vault, sorted.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let suffix = format!(".{WALLET_FILE_EXT}");
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(name) = entry
                .file_name()
                .to_str()
                .and_then(|f| f.strip_suffix(&suffix))
            {
                if validate_name(name).is_ok() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.wallet_path(name).map(|p| p.exists()).unwrap_or(false)
    }

    /// Delete a wallet file irreversibly.
    pub fn delete(&self, name: &str) -> Result<(), StoreError> {
        let path = self.wallet_path(name)?;
        if !path.exists() {
            return Err(StoreError::WalletNotFound(name.to_string()));
        }
        fs::remove_file(&path)?;
        debug!(wallet = %name, "wallet deleted");
        Ok(())
    }

    fn read_file(&self, name: &str) -> Result<WalletFile, StoreError> {
        let path = self.wallet_path(name)?;
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::WalletNotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::CorruptedFile(format!("{name}: {e}")))
    }

    /// Raw file bytes for backup export.
    pub(crate) fn read_raw(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.wallet_path(name)?;
        match fs::read(&path) {
            Ok(b) => Ok(b),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::WalletNotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write raw file bytes during restore. Rejects existing names.
    pub(crate) fn write_raw(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.wallet_path(name)?;
        if path.exists() {
            return Err(StoreError::WalletExists(name.to_string()));
        }
        fsutil::ensure_dir(&self.dir, DIR_MODE)?;
        fsutil::write_atomic(&path, bytes, FILE_MODE_SECRET)?;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
