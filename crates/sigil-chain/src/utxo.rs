//! Persistent per-wallet BSV UTXO set.
//!
//! Lives at `<home>/utxo/<wallet>.json`. The live set is keyed by
//! `(tx_id, output_index)`; no two live entries may share that pair.
//! Refresh reconciles against what the chain adapter reports: unknown
//! outputs are added, known outputs missing from the response are marked
//! spent. Writers serialize through an in-process lock; disk writes are
//! atomic.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use tracing::debug;

use sigil_core::constants::{DIR_MODE, FILE_MODE_SECRET};
use sigil_core::fsutil;

use crate::adapter::Utxo;
use crate::error::ChainError;

/// A tracked output with its spend state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredUtxo {
    pub tx_id: String,
    pub output_index: u32,
    pub address: String,
    pub amount_sat: u64,
    pub script_pubkey: String,
    pub spent: bool,
}

impl From<Utxo> for StoredUtxo {
    fn from(utxo: Utxo) -> Self {
        Self {
            tx_id: utxo.tx_id,
            output_index: utxo.output_index,
            address: utxo.address,
            amount_sat: utxo.amount_sat,
            script_pubkey: utxo.script_pubkey,
            spent: false,
        }
    }
}

type OutPoint = (String, u32);

#[derive(Default, Serialize, Deserialize)]
struct UtxoFile {
    utxos: Vec<StoredUtxo>,
}

/// File-backed UTXO set for one wallet.
pub struct UtxoStore {
    path: PathBuf,
    state: Mutex<BTreeMap<OutPoint, StoredUtxo>>,
}

impl UtxoStore {
    /// Open (or create empty) the store for a wallet.
    pub fn open(utxo_dir: PathBuf, wallet_name: &str) -> Result<Self, ChainError> {
        let path = utxo_dir.join(format!("{wallet_name}.json"));
        let mut state = BTreeMap::new();
        match fs::read(&path) {
            Ok(bytes) => {
                let file: UtxoFile = serde_json::from_slice(&bytes)
                    .map_err(|e| ChainError::Serialization(format!("utxo store: {e}")))?;
                for utxo in file.utxos {
                    state.insert((utxo.tx_id.clone(), utxo.output_index), utxo);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Reconcile one address against the adapter's current view.
    ///
    /// Returns `(added, newly_spent)` counts.
    pub fn reconcile(
        &self,
        address: &str,
        observed: &[Utxo],
    ) -> Result<(usize, usize), ChainError> {
        let mut state = self.state.lock();
        let mut added = 0;
        let mut newly_spent = 0;

        for utxo in observed {
            let key = (utxo.tx_id.clone(), utxo.output_index);
            match state.get_mut(&key) {
                // An output we marked spent can resurface if the spending
                // transaction was dropped from the mempool.
                Some(existing) => {
                    if existing.spent {
                        existing.spent = false;
                        added += 1;
                    }
                }
                None => {
                    state.insert(key, utxo.clone().into());
                    added += 1;
                }
            }
        }

        let observed_keys: std::collections::BTreeSet<OutPoint> = observed
            .iter()
            .map(|u| (u.tx_id.clone(), u.output_index))
            .collect();
        for (key, utxo) in state.iter_mut() {
            if utxo.address == address && !utxo.spent && !observed_keys.contains(key) {
                utxo.spent = true;
                newly_spent += 1;
            }
        }

        self.persist(&state)?;
        debug!(address, added, newly_spent, "utxo set reconciled");
        Ok((added, newly_spent))
    }

    /// Mark outputs spent after a broadcast.
    pub fn mark_spent(&self, outpoints: &[(String, u32)]) -> Result<usize, ChainError> {
        let mut state = self.state.lock();
        let mut marked = 0;
        for key in outpoints {
            if let Some(utxo) = state.get_mut(key) {
                if !utxo.spent {
                    utxo.spent = true;
                    marked += 1;
                }
            }
        }
        if marked > 0 {
            self.persist(&state)?;
        }
        Ok(marked)
    }

    /// All unspent outputs, sorted by `(tx_id, output_index)`.
    pub fn unspent(&self) -> Vec<StoredUtxo> {
        self.state
            .lock()
            .values()
            .filter(|u| !u.spent)
            .cloned()
            .collect()
    }

    /// Sum of unspent amounts in satoshis.
    pub fn balance(&self) -> u64 {
        self.state
            .lock()
            .values()
            .filter(|u| !u.spent)
            .map(|u| u.amount_sat)
            .sum()
    }

    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().is_empty()
    }

    fn persist(&self, state: &BTreeMap<OutPoint, StoredUtxo>) -> Result<(), ChainError> {
        if let Some(dir) = self.path.parent() {
            fsutil::ensure_dir(dir, DIR_MODE)?;
        }
        let file = UtxoFile {
            utxos: state.values().cloned().collect(),
        };
        let json = serde_json::to_vec_pretty(&file)
            .map_err(|e| ChainError::Serialization(e.to_string()))?;
        fsutil::write_atomic(&self.path, &json, FILE_MODE_SECRET)?;
        Ok(())
    }
}
