//! Greedy coin selection with a P2PKH size-model fee.
//!
//! UTXOs are sorted descending by amount and accumulated until they cover
//! the target plus the fee for the transaction they would produce. The fee
//! model is the standard P2PKH estimate: `10 + 148·inputs + 34·outputs`
//! bytes at the quoted sat/byte rate.

use sigil_chain::utxo::StoredUtxo;

use crate::error::TxError;

/// Transaction overhead bytes (version, counts, locktime).
pub const TX_OVERHEAD_BYTES: u64 = 10;

/// Upper-bound size of one signed P2PKH input.
pub const INPUT_BYTES: u64 = 148;

/// Size of one P2PKH output.
pub const OUTPUT_BYTES: u64 = 34;

/// Outputs below this are folded into the fee instead of creating change.
pub const DUST_LIMIT_SAT: u64 = 546;

/// Estimated serialized size in bytes.
pub fn estimate_vbytes(inputs: usize, outputs: usize) -> u64 {
    TX_OVERHEAD_BYTES + INPUT_BYTES * inputs as u64 + OUTPUT_BYTES * outputs as u64
}

/// Fee for a transaction shape at a sat/byte rate.
pub fn estimate_fee(inputs: usize, outputs: usize, fee_rate: u64) -> u64 {
    estimate_vbytes(inputs, outputs) * fee_rate
}

/// Result of coin selection.
#[derive(Debug, Clone)]
pub struct CoinSelection {
    /// Inputs to spend, in selection order.
    pub selected: Vec<StoredUtxo>,
    /// Sum of selected input amounts.
    pub total_input: u64,
    /// Fee in satoshis.
    pub fee: u64,
    /// Change in satoshis; zero means no change output.
    pub change: u64,
}

/// Select inputs to cover `target` at `fee_rate`, assuming one recipient
/// output plus a change output while change is above dust.
pub fn select_coins(
    utxos: &[StoredUtxo],
    target: u64,
    fee_rate: u64,
) -> Result<CoinSelection, TxError> {
    if target == 0 {
        return Err(TxError::InvalidAmount("amount must be non-zero".into()));
    }
    let mut spendable: Vec<StoredUtxo> = utxos.iter().filter(|u| !u.spent).cloned().collect();
    if spendable.is_empty() {
        return Err(TxError::NoUtxos);
    }
    spendable.sort_by(|a, b| b.amount_sat.cmp(&a.amount_sat));

    let mut selected = Vec::new();
    let mut total_input: u64 = 0;

    for utxo in spendable {
        total_input = total_input.saturating_add(utxo.amount_sat);
        selected.push(utxo);

        // Two outputs while we expect change.
        let fee_with_change = estimate_fee(selected.len(), 2, fee_rate);
        let needed = target.saturating_add(fee_with_change);
        if total_input < needed {
            continue;
        }

        let change = total_input - needed;
        if change <= DUST_LIMIT_SAT {
            // Fold dust into the fee and drop the change output.
            let fee_no_change = estimate_fee(selected.len(), 1, fee_rate);
            let fee = total_input.saturating_sub(target).max(fee_no_change);
            if total_input < target.saturating_add(fee_no_change) {
                continue;
            }
            return Ok(CoinSelection {
                selected,
                total_input,
                fee,
                change: 0,
            });
        }
        return Ok(CoinSelection {
            selected,
            total_input,
            fee: fee_with_change,
            change,
        });
    }

    let fee = estimate_fee(selected.len(), 2, fee_rate);
    Err(TxError::InsufficientFunds {
        have: total_input as u128,
        need: (target as u128) + (fee as u128),
    })
}

/// Send-all selection: every unspent input, one output, amount = sum − fee.
pub fn select_all(utxos: &[StoredUtxo], fee_rate: u64) -> Result<(CoinSelection, u64), TxError> {
    let selected: Vec<StoredUtxo> = utxos.iter().filter(|u| !u.spent).cloned().collect();
    if selected.is_empty() {
        return Err(TxError::NoUtxos);
    }
    let total_input: u64 = selected.iter().map(|u| u.amount_sat).sum();
    let fee = estimate_fee(selected.len(), 1, fee_rate);
    let amount = total_input.checked_sub(fee).filter(|a| *a > 0).ok_or(
        TxError::InsufficientFunds {
            have: total_input as u128,
            need: fee as u128,
        },
    )?;
    Ok((
        CoinSelection {
            selected,
            total_input,
            fee,
            change: 0,
        },
        amount,
    ))
}
