//! Cross-wallet discovery: scan the known derivation layouts for funds.
//!
//! A restored mnemonic may have been used by another wallet with a different
//! path convention. Discovery walks a closed set of schemes, probing
//! addresses through a caller-supplied [`UsageProbe`] until `gap`
//! consecutive unused indexes are seen on each (external, internal) chain.
//!
//! BSV probes see mempool-unconfirmed activity (WhatsOnChain reports it
//! natively); ETH probes backed by Etherscan do not. Callers surfacing
//! discovery results should repeat that caveat.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::debug;

use sigil_core::chain::Chain;
use sigil_core::constants::{ADDRESS_GAP, MAX_CONCURRENT_REQUESTS};
use sigil_core::secret::Seed;

use crate::derivation::{
    derive_address_at, AddressRecord, DerivationScheme, CHANGE_EXTERNAL, CHANGE_INTERNAL,
};
use crate::error::KeyError;

/// Activity observed at one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AddressActivity {
    /// Whether the address has ever appeared on-chain (or in the mempool,
    /// for BSV).
    pub used: bool,
    /// Current balance in the chain's minimal unit.
    pub balance: u128,
}

/// Network-side capability discovery needs: has an address been used, and
/// what does it hold now.
#[async_trait]
pub trait UsageProbe: Send + Sync {
    async fn probe(&self, chain: Chain, address: &str) -> Result<AddressActivity, KeyError>;
}

/// One scheme in the discovery scan set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryScheme {
    /// `m/44'/236'/0'/…` — the standard BSV layout.
    BsvStandard,
    /// `m/44'/0'/0'/…` — legacy Bitcoin coin type.
    BitcoinLegacy,
    /// `m/44'/145'/0'/…` — Bitcoin Cash coin type.
    BitcoinCash,
    /// `m/0'/…` — HandCash-1 layout.
    HandCashLegacy,
    /// `m/44'/236'/account'/…` for accounts 1..=4.
    MultiAccount { account: u32 },
}

impl DiscoveryScheme {
    /// The full, closed scan set, in scan order.
    pub fn scan_set() -> Vec<DiscoveryScheme> {
        let mut set = vec![
            DiscoveryScheme::BsvStandard,
            DiscoveryScheme::BitcoinLegacy,
            DiscoveryScheme::BitcoinCash,
            DiscoveryScheme::HandCashLegacy,
        ];
        set.extend((1..=4).map(|account| DiscoveryScheme::MultiAccount { account }));
        set
    }

    /// Human-readable label for reports.
    pub fn label(&self) -> String {
        match self {
            DiscoveryScheme::BsvStandard => "BSV Standard (m/44'/236'/0')".into(),
            DiscoveryScheme::BitcoinLegacy => "Bitcoin Legacy (m/44'/0'/0')".into(),
            DiscoveryScheme::BitcoinCash => "Bitcoin Cash (m/44'/145'/0')".into(),
            DiscoveryScheme::HandCashLegacy => "HandCash Legacy (m/0')".into(),
            DiscoveryScheme::MultiAccount { account } => {
                format!("Multi-Account (m/44'/236'/{account}')")
            }
        }
    }

    fn derivation(&self) -> DerivationScheme {
        match self {
            DiscoveryScheme::BsvStandard => DerivationScheme::Bip44 {
                chain: Chain::Bsv,
                account: 0,
            },
            DiscoveryScheme::BitcoinLegacy => DerivationScheme::Bip44 {
                chain: Chain::Btc,
                account: 0,
            },
            DiscoveryScheme::BitcoinCash => DerivationScheme::Bip44 {
                chain: Chain::Bch,
                account: 0,
            },
            DiscoveryScheme::HandCashLegacy => DerivationScheme::HandCashLegacy,
            DiscoveryScheme::MultiAccount { account } => DerivationScheme::Bip44 {
                chain: Chain::Bsv,
                account: *account,
            },
        }
    }

    /// HandCash has no internal chain; everything else scans both.
    fn change_levels(&self) -> &'static [u32] {
        match self {
            DiscoveryScheme::HandCashLegacy => &[CHANGE_EXTERNAL],
            _ => &[CHANGE_EXTERNAL, CHANGE_INTERNAL],
        }
    }
}

/// A used address found during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredAddress {
    pub record: AddressRecord,
    pub balance: u128,
}

/// Scan result for one scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemeReport {
    pub scheme: DiscoveryScheme,
    pub addresses: Vec<DiscoveredAddress>,
    pub total_balance: u128,
}

impl SchemeReport {
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

/// Scan every scheme in the closed set, scheme by scheme.
pub async fn discover(
    seed: &Seed,
    gap: u32,
    probe: Arc<dyn UsageProbe>,
) -> Result<Vec<SchemeReport>, KeyError> {
    let mut reports = Vec::new();
    for scheme in DiscoveryScheme::scan_set() {
        let report = scan_scheme(seed, scheme, gap, Arc::clone(&probe)).await?;
        debug!(
            scheme = %scheme.label(),
            found = report.addresses.len(),
            balance = report.total_balance,
            "discovery scheme scanned"
        );
        reports.push(report);
    }
    Ok(reports)
}

/// Scan one scheme until `gap` consecutive unused indexes per change level.
pub async fn scan_scheme(
    seed: &Seed,
    scheme: DiscoveryScheme,
    gap: u32,
    probe: Arc<dyn UsageProbe>,
) -> Result<SchemeReport, KeyError> {
    let gap = if gap == 0 { ADDRESS_GAP } else { gap };
    let derivation = scheme.derivation();
    let chain = derivation.chain();

    let mut addresses = Vec::new();
    let mut total_balance: u128 = 0;

    for &change in scheme.change_levels() {
        let mut index = 0u32;
        let mut consecutive_unused = 0u32;

        while consecutive_unused < gap {
            // Derive the next window and probe it with bounded concurrency.
            let batch: Vec<AddressRecord> = (0..gap)
                .map(|offset| derive_address_at(seed, derivation, change, index + offset))
                .collect::<Result<_, _>>()?;

            let activities = probe_batch(&batch, chain, Arc::clone(&probe)).await?;

            for (record, activity) in batch.into_iter().zip(activities) {
                if consecutive_unused >= gap {
                    break;
                }
                if activity.used {
                    consecutive_unused = 0;
                    total_balance += activity.balance;
                    addresses.push(DiscoveredAddress {
                        record,
                        balance: activity.balance,
                    });
                } else {
                    consecutive_unused += 1;
                }
            }
            index += gap;
        }
    }

    Ok(SchemeReport {
        scheme,
        addresses,
        total_balance,
    })
}

/// Probe a window of addresses, at most [`MAX_CONCURRENT_REQUESTS`] in
/// flight, preserving input order in the result.
async fn probe_batch(
    batch: &[AddressRecord],
    chain: Chain,
    probe: Arc<dyn UsageProbe>,
) -> Result<Vec<AddressActivity>, KeyError> {
    let mut results = vec![AddressActivity::default(); batch.len()];
    for chunk_start in (0..batch.len()).step_by(MAX_CONCURRENT_REQUESTS) {
        let chunk_end = (chunk_start + MAX_CONCURRENT_REQUESTS).min(batch.len());
        let mut join_set = JoinSet::new();
        for pos in chunk_start..chunk_end {
            let probe = Arc::clone(&probe);
            let address = batch[pos].address.clone();
            join_set.spawn(async move { (pos, probe.probe(chain, &address).await) });
        }
        while let Some(joined) = join_set.join_next().await {
            let (pos, result) =
                joined.map_err(|e| KeyError::Probe(format!("probe task failed: {e}")))?;
            results[pos] = result?;
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::mnemonic;

    const VECTOR_PHRASE: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn vector_seed() -> Seed {
        mnemonic::to_seed(VECTOR_PHRASE, "").unwrap()
    }

    /// Probe backed by a fixed map of used addresses.
    struct MapProbe {
        used: HashMap<String, u128>,
        calls: AtomicUsize,
    }

    impl MapProbe {
        fn new(used: HashMap<String, u128>) -> Self {
            Self {
                used,
                calls: AtomicUsize::new(0),
            }
        }

        fn empty() -> Self {
            Self::new(HashMap::new())
        }
    }

    #[async_trait]
    impl UsageProbe for MapProbe {
        async fn probe(&self, _chain: Chain, address: &str) -> Result<AddressActivity, KeyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.used.get(address) {
                Some(&balance) => Ok(AddressActivity { used: true, balance }),
                None => Ok(AddressActivity::default()),
            }
        }
    }

    #[tokio::test]
    async fn empty_chain_scans_one_gap_window() {
        let seed = vector_seed();
        let probe = Arc::new(MapProbe::empty());
        let report = scan_scheme(&seed, DiscoveryScheme::BsvStandard, 5, Arc::clone(&probe) as Arc<dyn UsageProbe>)
            .await
            .unwrap();
        assert!(report.is_empty());
        assert_eq!(report.total_balance, 0);
        // One window of 5 per change level, external + internal.
        assert_eq!(probe.calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn finds_used_addresses_and_sums_balance() {
        let seed = vector_seed();
        let a0 = derive_address_at(
            &seed,
            DerivationScheme::standard(Chain::Bsv),
            CHANGE_EXTERNAL,
            0,
        )
        .unwrap();
        let a3 = derive_address_at(
            &seed,
            DerivationScheme::standard(Chain::Bsv),
            CHANGE_EXTERNAL,
            3,
        )
        .unwrap();

        let mut used = HashMap::new();
        used.insert(a0.address.clone(), 1_000u128);
        used.insert(a3.address.clone(), 250u128);

        let report = scan_scheme(
            &seed,
            DiscoveryScheme::BsvStandard,
            5,
            Arc::new(MapProbe::new(used)),
        )
        .await
        .unwrap();

        assert_eq!(report.addresses.len(), 2);
        assert_eq!(report.total_balance, 1_250);
        assert_eq!(report.addresses[0].record.index, 0);
        assert_eq!(report.addresses[1].record.index, 3);
    }

    #[tokio::test]
    async fn gap_resets_after_use() {
        let seed = vector_seed();
        // Index 2 keeps the run alive so the scan reaches index 6 in the
        // second window.
        let mut used = HashMap::new();
        for index in [2u32, 6] {
            let record = derive_address_at(
                &seed,
                DerivationScheme::standard(Chain::Bsv),
                CHANGE_EXTERNAL,
                index,
            )
            .unwrap();
            used.insert(record.address, 10u128);
        }

        let report = scan_scheme(
            &seed,
            DiscoveryScheme::BsvStandard,
            5,
            Arc::new(MapProbe::new(used)),
        )
        .await
        .unwrap();
        assert_eq!(report.addresses.len(), 2);
        assert_eq!(report.addresses[1].record.index, 6);
    }

    #[tokio::test]
    async fn use_beyond_gap_is_not_found() {
        let seed = vector_seed();
        // First use sits past a full unused window; the scan must stop
        // before it, per the gap rule.
        let record = derive_address_at(
            &seed,
            DerivationScheme::standard(Chain::Bsv),
            CHANGE_EXTERNAL,
            6,
        )
        .unwrap();
        let mut used = HashMap::new();
        used.insert(record.address, 10u128);

        let report = scan_scheme(
            &seed,
            DiscoveryScheme::BsvStandard,
            5,
            Arc::new(MapProbe::new(used)),
        )
        .await
        .unwrap();
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn handcash_scans_only_external() {
        let seed = vector_seed();
        let probe = Arc::new(MapProbe::empty());
        scan_scheme(&seed, DiscoveryScheme::HandCashLegacy, 4, Arc::clone(&probe) as Arc<dyn UsageProbe>)
            .await
            .unwrap();
        // No internal chain: one window only.
        assert_eq!(probe.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn discover_covers_full_scan_set() {
        let seed = vector_seed();
        let reports = discover(&seed, 2, Arc::new(MapProbe::empty())).await.unwrap();
        assert_eq!(reports.len(), DiscoveryScheme::scan_set().len());
        assert!(reports.iter().all(|r| r.is_empty()));
    }

    #[test]
    fn scan_set_shape() {
        let set = DiscoveryScheme::scan_set();
        assert_eq!(set.len(), 8);
        assert_eq!(set[0], DiscoveryScheme::BsvStandard);
        assert!(set.contains(&DiscoveryScheme::MultiAccount { account: 4 }));
        assert!(!set.contains(&DiscoveryScheme::MultiAccount { account: 0 }));
    }
}
