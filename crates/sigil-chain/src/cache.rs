//! Activity-tiered balance cache.
//!
//! One JSON file holds every cached balance, keyed by the full
//! `(chain, address, token)` triple. Freshness depends on how lively the
//! address is: active and recently-created addresses always refetch,
//! dormant ones keep for 30 minutes, never-used ones for 2 hours.
//!
//! A corrupt file is quarantined (renamed with a timestamp suffix) and
//! replaced by an empty cache: a warning, never a fatal error.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use tracing::warn;

use sigil_core::chain::Chain;
use sigil_core::constants::{
    CACHE_DORMANT_TTL_SECS, CACHE_NEVER_USED_TTL_SECS, CACHE_RECENT_AGE_SECS, DIR_MODE,
    FILE_MODE_CACHE,
};
use sigil_core::fsutil;

use crate::error::ChainError;

/// Refresh cadence bucket for an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityClass {
    /// Has recent on-chain activity: always refetch.
    Active,
    /// Has history but nothing recent: refetch after 30 minutes.
    Dormant,
    /// No history at all: refetch after 2 hours.
    NeverUsed,
    /// Address created less than 24 h ago: always refetch.
    Recent,
}

impl ActivityClass {
    /// Staleness threshold, or `None` for always-stale classes.
    fn ttl(&self) -> Option<ChronoDuration> {
        match self {
            ActivityClass::Active | ActivityClass::Recent => None,
            ActivityClass::Dormant => Some(ChronoDuration::seconds(CACHE_DORMANT_TTL_SECS)),
            ActivityClass::NeverUsed => Some(ChronoDuration::seconds(CACHE_NEVER_USED_TTL_SECS)),
        }
    }

    /// Classify from history and address age.
    pub fn classify(has_history: bool, recently_active: bool, address_age_secs: i64) -> Self {
        if address_age_secs < CACHE_RECENT_AGE_SECS {
            ActivityClass::Recent
        } else if !has_history {
            ActivityClass::NeverUsed
        } else if recently_active {
            ActivityClass::Active
        } else {
            ActivityClass::Dormant
        }
    }
}

/// One cached balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub chain: Chain,
    pub address: String,
    /// Token contract identifier; empty for the native asset.
    #[serde(default)]
    pub token: String,
    /// Balance in minimal units, as a string (wei exceeds u64).
    pub balance: String,
    pub symbol: String,
    pub decimals: u32,
    pub updated_at: DateTime<Utc>,
    pub activity_class: ActivityClass,
}

impl CacheEntry {
    pub fn balance_value(&self) -> u128 {
        self.balance.parse().unwrap_or(0)
    }

    pub fn age(&self) -> ChronoDuration {
        Utc::now() - self.updated_at
    }
}

/// The key type: entries with distinct components can never collide, no
/// matter what characters the components contain.
type Key = (Chain, String, String);

#[derive(Default, Serialize, Deserialize)]
struct CacheFile {
    entries: Vec<CacheEntry>,
}

/// Concurrent-safe, file-backed balance cache.
pub struct BalanceCache {
    path: PathBuf,
    entries: Mutex<BTreeMap<Key, CacheEntry>>,
}

impl BalanceCache {
    /// Load the cache from `<cache_dir>/balances.json`.
    ///
    /// Returns the cache plus a flag that is `true` when a corrupt file was
    /// quarantined; callers log it and move on.
    pub fn load(cache_dir: PathBuf) -> Result<(Self, bool), ChainError> {
        let path = cache_dir.join("balances.json");
        let mut quarantined = false;
        let mut entries = BTreeMap::new();

        match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<CacheFile>(&bytes) {
                Ok(file) => {
                    for entry in file.entries {
                        entries.insert(Self::key_of(&entry), entry);
                    }
                }
                Err(err) => {
                    warn!(%err, "balance cache corrupt; quarantining");
                    if let Err(rename_err) = fsutil::quarantine(&path) {
                        warn!(%rename_err, "quarantine failed; dropping cache file");
                        let _ = fs::remove_file(&path);
                    }
                    quarantined = true;
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        Ok((
            Self {
                path,
                entries: Mutex::new(entries),
            },
            quarantined,
        ))
    }

    fn key_of(entry: &CacheEntry) -> Key {
        (entry.chain, entry.address.clone(), entry.token.clone())
    }

    /// Canonical display key `chain|address|token`.
    pub fn canonical_key(chain: Chain, address: &str, token: &str) -> String {
        format!("{chain}|{address}|{token}")
    }

    /// Entry and its age, if present.
    pub fn get(
        &self,
        chain: Chain,
        address: &str,
        token: &str,
    ) -> Option<(CacheEntry, ChronoDuration)> {
        let entries = self.entries.lock();
        let entry = entries.get(&(chain, address.to_string(), token.to_string()))?;
        Some((entry.clone(), entry.age()))
    }

    /// Whether an entry needs refetching under its activity tier.
    pub fn is_stale(&self, chain: Chain, address: &str, token: &str) -> bool {
        match self.get(chain, address, token) {
            None => true,
            Some((entry, age)) => match entry.activity_class.ttl() {
                None => true,
                Some(ttl) => age >= ttl,
            },
        }
    }

    /// Insert or replace an entry and persist.
    pub fn put(&self, entry: CacheEntry) -> Result<(), ChainError> {
        let mut entries = self.entries.lock();
        entries.insert(Self::key_of(&entry), entry);
        self.persist(&entries)
    }

    /// Drop every entry for `(chain, address)` across all tokens. Used
    /// after a broadcast touches the address.
    pub fn invalidate(&self, chain: Chain, address: &str) -> Result<usize, ChainError> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(c, a, _), _| !(*c == chain && a == address));
        let removed = before - entries.len();
        if removed > 0 {
            self.persist(&entries)?;
        }
        Ok(removed)
    }

    /// Remove entries older than the given age. Returns how many went.
    pub fn prune(&self, older_than: ChronoDuration) -> Result<usize, ChainError> {
        let cutoff = Utc::now() - older_than;
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.updated_at >= cutoff);
        let removed = before - entries.len();
        if removed > 0 {
            self.persist(&entries)?;
        }
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Write-to-temp + fsync + rename; concurrent writers last-write-win,
    /// which is fine because entries are idempotently refreshable.
    fn persist(&self, entries: &BTreeMap<Key, CacheEntry>) -> Result<(), ChainError> {
        if let Some(dir) = self.path.parent() {
            fsutil::ensure_dir(dir, DIR_MODE)?;
        }
        let file = CacheFile {
            entries: entries.values().cloned().collect(),
        };
        let json = serde_json::to_vec_pretty(&file)
            .map_err(|e| ChainError::Serialization(e.to_string()))?;
        fsutil::write_atomic(&self.path, &json, FILE_MODE_CACHE)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(chain: Chain, address: &str, token: &str, class: ActivityClass) -> CacheEntry {
        CacheEntry {
            chain,
            address: address.to_string(),
            token: token.to_string(),
            balance: "1000".to_string(),
            symbol: chain.symbol().to_string(),
            decimals: chain.decimals(),
            updated_at: Utc::now(),
            activity_class: class,
        }
    }

    fn cache() -> (tempfile::TempDir, BalanceCache) {
        let dir = tempfile::tempdir().unwrap();
        let (cache, corrupt) = BalanceCache::load(dir.path().join("cache")).unwrap();
        assert!(!corrupt);
        (dir, cache)
    }

    // --- Basic operations ---

    #[test]
    fn put_get_roundtrip() {
        let (_dir, cache) = cache();
        cache
            .put(entry(Chain::Bsv, "1Addr", "", ActivityClass::Dormant))
            .unwrap();
        let (got, age) = cache.get(Chain::Bsv, "1Addr", "").unwrap();
        assert_eq!(got.balance_value(), 1000);
        assert!(age < ChronoDuration::seconds(5));
    }

    #[test]
    fn persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (cache, _) = BalanceCache::load(dir.path().join("cache")).unwrap();
            cache
                .put(entry(Chain::Eth, "0xabc", "", ActivityClass::Dormant))
                .unwrap();
        }
        let (cache, corrupt) = BalanceCache::load(dir.path().join("cache")).unwrap();
        assert!(!corrupt);
        assert!(cache.get(Chain::Eth, "0xabc", "").is_some());
    }

    #[test]
    fn ambiguous_keys_do_not_collide() {
        let (_dir, cache) = cache();
        // These four triples concatenate ambiguously around the separator.
        cache.put(entry(Chain::Eth, "a|b", "", ActivityClass::Dormant)).unwrap();
        cache.put(entry(Chain::Eth, "a", "b|", ActivityClass::Dormant)).unwrap();
        cache.put(entry(Chain::Eth, "a", "b", ActivityClass::Dormant)).unwrap();
        cache.put(entry(Chain::Eth, "a|", "b", ActivityClass::Dormant)).unwrap();
        assert_eq!(cache.len(), 4);
        assert!(cache.get(Chain::Eth, "a|b", "").is_some());
        assert!(cache.get(Chain::Eth, "a", "b|").is_some());
    }

    #[test]
    fn token_entries_are_separate() {
        let (_dir, cache) = cache();
        cache.put(entry(Chain::Eth, "0xabc", "", ActivityClass::Dormant)).unwrap();
        let mut usdc = entry(Chain::Eth, "0xabc", "0xToken", ActivityClass::Dormant);
        usdc.balance = "5".to_string();
        cache.put(usdc).unwrap();

        assert_eq!(cache.get(Chain::Eth, "0xabc", "").unwrap().0.balance_value(), 1000);
        assert_eq!(cache.get(Chain::Eth, "0xabc", "0xToken").unwrap().0.balance_value(), 5);
    }

    // --- Staleness tiers ---

    #[test]
    fn missing_entry_is_stale() {
        let (_dir, cache) = cache();
        assert!(cache.is_stale(Chain::Bsv, "1Never", ""));
    }

    #[test]
    fn active_and_recent_always_stale() {
        let (_dir, cache) = cache();
        cache.put(entry(Chain::Bsv, "1Active", "", ActivityClass::Active)).unwrap();
        cache.put(entry(Chain::Bsv, "1Recent", "", ActivityClass::Recent)).unwrap();
        assert!(cache.is_stale(Chain::Bsv, "1Active", ""));
        assert!(cache.is_stale(Chain::Bsv, "1Recent", ""));
    }

    #[test]
    fn dormant_fresh_within_ttl() {
        let (_dir, cache) = cache();
        cache.put(entry(Chain::Bsv, "1Dormant", "", ActivityClass::Dormant)).unwrap();
        assert!(!cache.is_stale(Chain::Bsv, "1Dormant", ""));
    }

    #[test]
    fn dormant_stale_after_ttl() {
        let (_dir, cache) = cache();
        let mut old = entry(Chain::Bsv, "1Dormant", "", ActivityClass::Dormant);
        old.updated_at = Utc::now() - ChronoDuration::seconds(CACHE_DORMANT_TTL_SECS + 60);
        cache.put(old).unwrap();
        assert!(cache.is_stale(Chain::Bsv, "1Dormant", ""));
    }

    #[test]
    fn never_used_has_longest_ttl() {
        let (_dir, cache) = cache();
        let mut entry_nu = entry(Chain::Bsv, "1Empty", "", ActivityClass::NeverUsed);
        entry_nu.updated_at = Utc::now() - ChronoDuration::seconds(CACHE_DORMANT_TTL_SECS + 60);
        cache.put(entry_nu).unwrap();
        // Older than the dormant TTL but younger than the never-used TTL.
        assert!(!cache.is_stale(Chain::Bsv, "1Empty", ""));
    }

    #[test]
    fn classify_tiers() {
        assert_eq!(ActivityClass::classify(true, true, 1_000_000), ActivityClass::Active);
        assert_eq!(ActivityClass::classify(true, false, 1_000_000), ActivityClass::Dormant);
        assert_eq!(ActivityClass::classify(false, false, 1_000_000), ActivityClass::NeverUsed);
        assert_eq!(ActivityClass::classify(false, false, 60), ActivityClass::Recent);
    }

    // --- Invalidate / prune ---

    #[test]
    fn invalidate_clears_all_tokens_for_address() {
        let (_dir, cache) = cache();
        cache.put(entry(Chain::Eth, "0xabc", "", ActivityClass::Dormant)).unwrap();
        cache.put(entry(Chain::Eth, "0xabc", "0xT", ActivityClass::Dormant)).unwrap();
        cache.put(entry(Chain::Eth, "0xother", "", ActivityClass::Dormant)).unwrap();

        assert_eq!(cache.invalidate(Chain::Eth, "0xabc").unwrap(), 2);
        assert!(cache.get(Chain::Eth, "0xabc", "").is_none());
        assert!(cache.get(Chain::Eth, "0xother", "").is_some());
    }

    #[test]
    fn prune_removes_exactly_older_entries() {
        let (_dir, cache) = cache();
        let mut old = entry(Chain::Bsv, "1Old", "", ActivityClass::Dormant);
        old.updated_at = Utc::now() - ChronoDuration::hours(48);
        cache.put(old).unwrap();
        cache.put(entry(Chain::Bsv, "1New", "", ActivityClass::Dormant)).unwrap();

        assert_eq!(cache.prune(ChronoDuration::hours(24)).unwrap(), 1);
        assert!(cache.get(Chain::Bsv, "1Old", "").is_none());
        assert!(cache.get(Chain::Bsv, "1New", "").is_some());
    }

    // --- Corruption ---

    #[test]
    fn corrupt_file_quarantined_and_reset() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        fs::create_dir_all(&cache_dir).unwrap();
        fs::write(cache_dir.join("balances.json"), b"{{{ not json").unwrap();

        let (cache, quarantined) = BalanceCache::load(cache_dir.clone()).unwrap();
        assert!(quarantined);
        assert!(cache.is_empty());

        // The corrupt bytes survive under a timestamped name.
        let corrupt_files: Vec<_> = fs::read_dir(&cache_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".corrupt."))
            .collect();
        assert_eq!(corrupt_files.len(), 1);

        // The cache is usable immediately.
        cache.put(entry(Chain::Bsv, "1Addr", "", ActivityClass::Dormant)).unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn canonical_key_format() {
        assert_eq!(
            BalanceCache::canonical_key(Chain::Eth, "0xabc", "0xT"),
            "eth|0xabc|0xT"
        );
        assert_eq!(BalanceCache::canonical_key(Chain::Bsv, "1A", ""), "bsv|1A|");
    }
}
