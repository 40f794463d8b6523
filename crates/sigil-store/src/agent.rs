//! Scoped non-interactive agent credentials and the spend policy engine.
//!
//! An agent holds an opaque token. On disk sits a credential file keyed by
//! `id = hex(sha256(token))[..16]` whose seed blob is encrypted under a key
//! derived from the token itself: the token alone unlocks the wallet, and
//! the token is never persisted anywhere.
//!
//! Spends are bounded by per-transaction and daily-aggregate limits, a
//! chain set, an optional destination allowlist, and an expiry. The daily
//! aggregate lives in a sibling counter file authenticated with HMAC-SHA256
//! so a process that can edit the file cannot quietly raise its own limit.

use chrono::{DateTime, NaiveDate, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use tracing::debug;

use sigil_core::chain::Chain;
use sigil_core::constants::{AGENT_FILE_EXT, DIR_MODE, FILE_MODE_SECRET};
use sigil_core::fsutil;
use sigil_core::kdf::KdfParams;
use sigil_core::seal;
use sigil_core::secret::{SecretBytes, Seed};
use sigil_keys::xpub::derive_account_xpub;

use crate::error::StoreError;
use crate::wallet::validate_name;

type HmacSha256 = Hmac<Sha256>;

/// Domain-separation prefix for counter MAC keys.
const COUNTER_MAC_CONTEXT: &[u8] = b"sigil-agent-counter";

/// Spend limits for an agent. `None` means unlimited for that dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentPolicy {
    pub max_per_tx_sat: Option<u64>,
    pub max_daily_sat: Option<u64>,
    pub max_per_tx_wei: Option<u128>,
    pub max_daily_wei: Option<u128>,
    /// Empty means any destination.
    #[serde(default)]
    pub allowed_addresses: Vec<String>,
}

impl AgentPolicy {
    /// Per-transaction cap for a chain, in its minimal unit.
    fn max_per_tx(&self, chain: Chain) -> Option<u128> {
        match chain {
            Chain::Eth => self.max_per_tx_wei,
            Chain::Bsv | Chain::Btc | Chain::Bch => self.max_per_tx_sat.map(u128::from),
        }
    }

    /// Daily aggregate cap for a chain, in its minimal unit.
    fn max_daily(&self, chain: Chain) -> Option<u128> {
        match chain {
            Chain::Eth => self.max_daily_wei,
            Chain::Bsv | Chain::Btc | Chain::Bch => self.max_daily_sat.map(u128::from),
        }
    }
}

/// A stored agent credential. The token is not here and never will be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCredential {
    /// Deterministic ID: first 16 hex chars of sha256(token).
    pub id: String,
    pub label: String,
    pub wallet_name: String,
    pub chains: Vec<Chain>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub policy: AgentPolicy,
    /// Account xpubs per enabled chain, for read-only export.
    #[serde(default)]
    pub xpubs: BTreeMap<Chain, String>,
}

impl AgentCredential {
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }
}

/// Deterministic credential ID for a token.
pub fn agent_id_from_token(token: &SecretBytes) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..8])
}

#[derive(Serialize, Deserialize)]
struct AgentFile {
    credential: AgentCredential,
    encrypted_seed: String,
}

/// Daily spend counter persisted beside the credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DailyCounter {
    date_utc: NaiveDate,
    /// Cumulative amount sent per chain today, minimal units as strings
    /// (wei exceeds u64, and JSON numbers are not to be trusted with it).
    sent: BTreeMap<Chain, String>,
    hmac: String,
}

impl DailyCounter {
    fn fresh(date: NaiveDate) -> Self {
        Self {
            date_utc: date,
            sent: BTreeMap::new(),
            hmac: String::new(),
        }
    }

    fn sent_on(&self, chain: Chain) -> u128 {
        self.sent
            .get(&chain)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }

    /// MAC input: the canonical JSON of `(date, sent)` only.
    fn mac_payload(&self) -> Result<Vec<u8>, StoreError> {
        #[derive(Serialize)]
        struct Payload<'a> {
            date_utc: NaiveDate,
            sent: &'a BTreeMap<Chain, String>,
        }
        serde_json::to_vec(&Payload {
            date_utc: self.date_utc,
            sent: &self.sent,
        })
        .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn seal_with(&mut self, key: &[u8]) -> Result<(), StoreError> {
        let mut mac = HmacSha256::new_from_slice(key)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        mac.update(&self.mac_payload()?);
        self.hmac = hex::encode(mac.finalize().into_bytes());
        Ok(())
    }

    fn verify(&self, key: &[u8]) -> Result<(), StoreError> {
        let mut mac = HmacSha256::new_from_slice(key)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        mac.update(&self.mac_payload()?);
        let expected = hex::decode(&self.hmac).unwrap_or_default();
        mac.verify_slice(&expected).map_err(|_| {
            StoreError::AgentPolicyViolation("daily counter failed integrity check".into())
        })
    }
}

/// At-rest store for agent credentials and their daily counters.
pub struct AgentStore {
    dir: PathBuf,
    kdf: KdfParams,
}

impl AgentStore {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            kdf: KdfParams::default(),
        }
    }

    pub fn with_kdf(dir: PathBuf, kdf: KdfParams) -> Self {
        Self { dir, kdf }
    }

    fn wallet_dir(&self, wallet: &str) -> Result<PathBuf, StoreError> {
        validate_name(wallet)?;
        Ok(self.dir.join(wallet))
    }

    fn credential_path(&self, wallet: &str, id: &str) -> Result<PathBuf, StoreError> {
        Ok(self.wallet_dir(wallet)?.join(format!("{id}.{AGENT_FILE_EXT}")))
    }

    fn counter_path(&self, wallet: &str, id: &str) -> Result<PathBuf, StoreError> {
        validate_name(wallet)?;
        Ok(self.dir.join(format!("{wallet}-{id}.counter")))
    }

    /// Per-credential MAC key: sha256(context || agent id).
    fn counter_mac_key(id: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(COUNTER_MAC_CONTEXT);
        hasher.update(id.as_bytes());
        hasher.finalize().into()
    }

    /// Create and persist a credential.
    ///
    /// The ID and per-chain xpubs are computed here; the seed is sealed
    /// under the token. The caller displays the token once and forgets it.
    pub fn create_credential(
        &self,
        label: &str,
        wallet_name: &str,
        chains: Vec<Chain>,
        expires_at: Option<DateTime<Utc>>,
        policy: AgentPolicy,
        token: &SecretBytes,
        seed: &Seed,
    ) -> Result<AgentCredential, StoreError> {
        let id = agent_id_from_token(token);
        let dir = self.wallet_dir(wallet_name)?;
        fsutil::ensure_dir(&self.dir, DIR_MODE)?;
        fsutil::ensure_dir(&dir, DIR_MODE)?;

        let mut xpubs = BTreeMap::new();
        for &chain in &chains {
            let xpub = derive_account_xpub(seed, chain, 0)
                .map_err(|e| StoreError::AgentXpubInvalid(e.to_string()))?;
            xpubs.insert(chain, xpub);
        }

        let credential = AgentCredential {
            id: id.clone(),
            label: label.to_string(),
            wallet_name: wallet_name.to_string(),
            chains,
            created_at: Utc::now(),
            expires_at,
            policy,
            xpubs,
        };

        let blob = seal::encrypt(seed.as_bytes(), token.as_bytes(), self.kdf)?;
        let file = AgentFile {
            credential: credential.clone(),
            encrypted_seed: hex::encode(blob),
        };
        let json = serde_json::to_vec_pretty(&file)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        fsutil::write_atomic(&self.credential_path(wallet_name, &id)?, &json, FILE_MODE_SECRET)?;
        debug!(wallet = %wallet_name, agent = %id, "agent credential created");
        Ok(credential)
    }

    /// Resolve a token to its credential and decrypt the seed.
    ///
    /// A token with no matching file and a token that fails decryption are
    /// the same error: [`StoreError::AgentTokenInvalid`]. Expiry is the
    /// caller's check, after decryption.
    pub fn load_by_token(
        &self,
        wallet_name: &str,
        token: &SecretBytes,
    ) -> Result<(Seed, AgentCredential), StoreError> {
        let id = agent_id_from_token(token);
        let path = self.credential_path(wallet_name, &id)?;
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::AgentTokenInvalid);
            }
            Err(e) => return Err(e.into()),
        };
        let file: AgentFile = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::CorruptedFile(format!("agent {id}: {e}")))?;

        let blob = hex::decode(&file.encrypted_seed).map_err(|_| StoreError::AgentTokenInvalid)?;
        let mut plain =
            seal::decrypt(&blob, token.as_bytes()).map_err(|_| StoreError::AgentTokenInvalid)?;
        let seed = Seed::from_slice(&plain).ok_or(StoreError::AgentTokenInvalid);
        use zeroize::Zeroize;
        plain.zeroize();
        Ok((seed?, file.credential))
    }

    /// List credentials for a wallet (metadata only).
    pub fn list(&self, wallet_name: &str) -> Result<Vec<AgentCredential>, StoreError> {
        let dir = self.wallet_dir(wallet_name)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let suffix = format!(".{AGENT_FILE_EXT}");
        let mut credentials = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(String::from) else {
                continue;
            };
            if !name.ends_with(&suffix) {
                continue;
            }
            let bytes = fs::read(entry.path())?;
            let file: AgentFile = serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::CorruptedFile(format!("agent {name}: {e}")))?;
            credentials.push(file.credential);
        }
        credentials.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(credentials)
    }

    /// Irreversibly delete one credential and its counter.
    pub fn revoke(&self, wallet_name: &str, id: &str) -> Result<(), StoreError> {
        let path = self.credential_path(wallet_name, id)?;
        if !path.exists() {
            return Err(StoreError::AgentTokenInvalid);
        }
        fs::remove_file(&path)?;
        let _ = fs::remove_file(self.counter_path(wallet_name, id)?);
        debug!(wallet = %wallet_name, agent = %id, "agent revoked");
        Ok(())
    }

    /// Irreversibly delete every credential for a wallet.
    pub fn revoke_all(&self, wallet_name: &str) -> Result<usize, StoreError> {
        let credentials = self.list(wallet_name)?;
        let count = credentials.len();
        for credential in credentials {
            self.revoke(wallet_name, &credential.id)?;
        }
        Ok(count)
    }

    // --- Policy enforcement ---

    /// Evaluate the spend policy for `(chain, destination, amount)`.
    ///
    /// Checks run in fixed order: chain set, allowlist, per-transaction
    /// limit, daily aggregate. `today` is injected so the UTC midnight
    /// boundary is testable.
    pub fn check_policy(
        &self,
        credential: &AgentCredential,
        chain: Chain,
        destination: &str,
        amount: u128,
        today: NaiveDate,
    ) -> Result<(), StoreError> {
        if !credential.chains.contains(&chain) {
            return Err(StoreError::AgentChainDenied(chain.to_string()));
        }

        if !credential.policy.allowed_addresses.is_empty()
            && !credential
                .policy
                .allowed_addresses
                .iter()
                .any(|allowed| allowed == destination)
        {
            return Err(StoreError::AgentAddrDenied(destination.to_string()));
        }

        if let Some(max) = credential.policy.max_per_tx(chain) {
            if amount > max {
                return Err(StoreError::AgentPolicyViolation(format!(
                    "amount {amount} {} exceeds per-transaction limit {max}",
                    chain.minimal_unit()
                )));
            }
        }

        if let Some(max_daily) = credential.policy.max_daily(chain) {
            let counter = self.read_counter(credential, today)?;
            let sent = counter.sent_on(chain);
            let projected = sent.saturating_add(amount);
            if projected > max_daily {
                return Err(StoreError::AgentDailyLimit {
                    sent,
                    limit: max_daily,
                });
            }
        }

        Ok(())
    }

    /// Record a successful broadcast against the daily counter.
    pub fn record_send(
        &self,
        credential: &AgentCredential,
        chain: Chain,
        amount: u128,
        today: NaiveDate,
    ) -> Result<(), StoreError> {
        let mut counter = self.read_counter(credential, today)?;
        let total = counter.sent_on(chain).saturating_add(amount);
        counter.sent.insert(chain, total.to_string());
        counter.seal_with(&Self::counter_mac_key(&credential.id))?;

        fsutil::ensure_dir(&self.dir, DIR_MODE)?;
        let json = serde_json::to_vec_pretty(&counter)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        fsutil::write_atomic(
            &self.counter_path(&credential.wallet_name, &credential.id)?,
            &json,
            FILE_MODE_SECRET,
        )?;
        Ok(())
    }

    /// Read today's counter: verify the MAC, reset on date rollover.
    fn read_counter(
        &self,
        credential: &AgentCredential,
        today: NaiveDate,
    ) -> Result<DailyCounter, StoreError> {
        let path = self.counter_path(&credential.wallet_name, &credential.id)?;
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(DailyCounter::fresh(today));
            }
            Err(e) => return Err(e.into()),
        };
        let counter: DailyCounter = serde_json::from_slice(&bytes).map_err(|_| {
            StoreError::AgentPolicyViolation("daily counter unreadable".into())
        })?;
        counter.verify(&Self::counter_mac_key(&credential.id))?;

        if counter.date_utc != today {
            // UTC date rolled over: yesterday's spend no longer counts.
            return Ok(DailyCounter::fresh(today));
        }
        Ok(counter)
    }
}
