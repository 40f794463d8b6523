//! BSV P2PKH transaction building, signing, and serialization.
//!
//! Wire format is Bitcoin-standard; signatures use the BIP-143 digest with
//! `SIGHASH_ALL | SIGHASH_FORKID` (0x41) as BSV consensus requires. Inputs
//! are signed with per-address private keys supplied by a lookup capability;
//! each key is dropped (and zeroed) as soon as its input is signed.

use sigil_core::base58::base58check_decode;
use sigil_core::ecdsa;
use sigil_core::hashes::sha256d;
use sigil_core::secret::PrivateKey;
use sigil_chain::utxo::StoredUtxo;

use crate::error::TxError;
use crate::selection::CoinSelection;

/// `SIGHASH_ALL | SIGHASH_FORKID`.
pub const SIGHASH_ALL_FORKID: u32 = 0x41;

/// Default sequence: final, no relative locktime.
const SEQUENCE_FINAL: u32 = 0xFFFF_FFFF;

/// Transaction version.
const TX_VERSION: u32 = 1;

/// One planned output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub address: String,
    pub amount_sat: u64,
}

/// A fully signed transaction ready for broadcast.
#[derive(Debug, Clone)]
pub struct SignedTx {
    /// Serialized transaction bytes.
    pub raw: Vec<u8>,
    /// Display txid: reversed sha256d of the raw bytes, hex.
    pub tx_id: String,
    /// Outpoints consumed, for marking spent after broadcast.
    pub spent_outpoints: Vec<(String, u32)>,
    pub fee: u64,
    pub change: u64,
}

/// Build and sign a P2PKH transaction from a coin selection.
///
/// `outputs` is the recipient list; a change output to `change_address` is
/// appended when the selection carries change. `key_for_address` resolves
/// the signing key for each input's address.
pub fn build_signed(
    selection: &CoinSelection,
    outputs: &[TxOutput],
    change_address: Option<&str>,
    key_for_address: impl Fn(&str) -> Result<PrivateKey, TxError>,
) -> Result<SignedTx, TxError> {
    if selection.selected.is_empty() {
        return Err(TxError::NoUtxos);
    }
    if outputs.is_empty() {
        return Err(TxError::Build("no outputs".into()));
    }

    let mut all_outputs: Vec<(Vec<u8>, u64)> = Vec::with_capacity(outputs.len() + 1);
    for output in outputs {
        if output.amount_sat == 0 {
            return Err(TxError::InvalidAmount(format!(
                "zero-value output to {}",
                output.address
            )));
        }
        all_outputs.push((p2pkh_script(&output.address)?, output.amount_sat));
    }
    if selection.change > 0 {
        let change_address = change_address
            .ok_or_else(|| TxError::Build("selection has change but no change address".into()))?;
        all_outputs.push((p2pkh_script(change_address)?, selection.change));
    }

    // BIP-143 midstate hashes, shared across all inputs.
    let hash_prevouts = sha256d(&concat_outpoints(&selection.selected)?);
    let hash_sequence = sha256d(&concat_sequences(selection.selected.len()));
    let hash_outputs = sha256d(&serialize_outputs(&all_outputs));

    let mut script_sigs: Vec<Vec<u8>> = Vec::with_capacity(selection.selected.len());
    for utxo in &selection.selected {
        let digest = sighash_forkid(
            utxo,
            &hash_prevouts,
            &hash_sequence,
            &hash_outputs,
        )?;
        let key = key_for_address(&utxo.address)?;
        let pubkey = ecdsa::derive_pubkey(&key).map_err(|e| TxError::Signing(e.to_string()))?;
        let mut signature =
            ecdsa::sign_der(&digest, &key).map_err(|e| TxError::Signing(e.to_string()))?;
        signature.push(SIGHASH_ALL_FORKID as u8);

        let mut script_sig = Vec::with_capacity(2 + signature.len() + pubkey.len());
        script_sig.push(signature.len() as u8);
        script_sig.extend_from_slice(&signature);
        script_sig.push(pubkey.len() as u8);
        script_sig.extend_from_slice(&pubkey);
        script_sigs.push(script_sig);
        // `key` drops here and zeroes itself.
    }

    let raw = serialize_tx(&selection.selected, &script_sigs, &all_outputs)?;
    let mut txid_bytes = sha256d(&raw);
    txid_bytes.reverse();

    Ok(SignedTx {
        tx_id: hex::encode(txid_bytes),
        spent_outpoints: selection
            .selected
            .iter()
            .map(|u| (u.tx_id.clone(), u.output_index))
            .collect(),
        raw,
        fee: selection.fee,
        change: selection.change,
    })
}

/// BIP-143 digest for one input, with the BSV fork id.
fn sighash_forkid(
    utxo: &StoredUtxo,
    hash_prevouts: &[u8; 32],
    hash_sequence: &[u8; 32],
    hash_outputs: &[u8; 32],
) -> Result<[u8; 32], TxError> {
    let script_code = hex::decode(&utxo.script_pubkey)
        .map_err(|e| TxError::Build(format!("bad script for {}: {e}", utxo.tx_id)))?;

    let mut preimage = Vec::with_capacity(160 + script_code.len());
    preimage.extend_from_slice(&TX_VERSION.to_le_bytes());
    preimage.extend_from_slice(hash_prevouts);
    preimage.extend_from_slice(hash_sequence);
    preimage.extend_from_slice(&outpoint_bytes(utxo)?);
    write_varint(&mut preimage, script_code.len() as u64);
    preimage.extend_from_slice(&script_code);
    preimage.extend_from_slice(&utxo.amount_sat.to_le_bytes());
    preimage.extend_from_slice(&SEQUENCE_FINAL.to_le_bytes());
    preimage.extend_from_slice(hash_outputs);
    preimage.extend_from_slice(&0u32.to_le_bytes()); // locktime
    preimage.extend_from_slice(&SIGHASH_ALL_FORKID.to_le_bytes());

    Ok(sha256d(&preimage))
}

fn serialize_tx(
    inputs: &[StoredUtxo],
    script_sigs: &[Vec<u8>],
    outputs: &[(Vec<u8>, u64)],
) -> Result<Vec<u8>, TxError> {
    let mut tx = Vec::new();
    tx.extend_from_slice(&TX_VERSION.to_le_bytes());

    write_varint(&mut tx, inputs.len() as u64);
    for (utxo, script_sig) in inputs.iter().zip(script_sigs) {
        tx.extend_from_slice(&outpoint_bytes(utxo)?);
        write_varint(&mut tx, script_sig.len() as u64);
        tx.extend_from_slice(script_sig);
        tx.extend_from_slice(&SEQUENCE_FINAL.to_le_bytes());
    }

    tx.extend_from_slice(&serialize_outputs(outputs));
    tx.extend_from_slice(&0u32.to_le_bytes()); // locktime
    Ok(tx)
}

/// Outputs section: count then `value || script` records.
fn serialize_outputs(outputs: &[(Vec<u8>, u64)]) -> Vec<u8> {
    let mut out = Vec::new();
    write_varint(&mut out, outputs.len() as u64);
    for (script, amount) in outputs {
        out.extend_from_slice(&amount.to_le_bytes());
        write_varint(&mut out, script.len() as u64);
        out.extend_from_slice(script);
    }
    out
}

/// `txid (reversed) || vout` for one input.
fn outpoint_bytes(utxo: &StoredUtxo) -> Result<[u8; 36], TxError> {
    let mut txid = hex::decode(&utxo.tx_id)
        .map_err(|e| TxError::Build(format!("bad txid {}: {e}", utxo.tx_id)))?;
    if txid.len() != 32 {
        return Err(TxError::Build(format!("txid {} not 32 bytes", utxo.tx_id)));
    }
    txid.reverse();
    let mut out = [0u8; 36];
    out[..32].copy_from_slice(&txid);
    out[32..].copy_from_slice(&utxo.output_index.to_le_bytes());
    Ok(out)
}

fn concat_outpoints(inputs: &[StoredUtxo]) -> Result<Vec<u8>, TxError> {
    let mut out = Vec::with_capacity(inputs.len() * 36);
    for utxo in inputs {
        out.extend_from_slice(&outpoint_bytes(utxo)?);
    }
    Ok(out)
}

fn concat_sequences(count: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(count * 4);
    for _ in 0..count {
        out.extend_from_slice(&SEQUENCE_FINAL.to_le_bytes());
    }
    out
}

/// P2PKH locking script for a legacy address.
fn p2pkh_script(address: &str) -> Result<Vec<u8>, TxError> {
    let payload =
        base58check_decode(address).map_err(|e| TxError::InvalidAddress(format!("{address}: {e}")))?;
    if payload.len() != 21 || payload[0] != 0x00 {
        return Err(TxError::InvalidAddress(address.to_string()));
    }
    let mut script = Vec::with_capacity(25);
    script.extend_from_slice(&[0x76, 0xA9, 0x14]);
    script.extend_from_slice(&payload[1..]);
    script.extend_from_slice(&[0x88, 0xAC]);
    Ok(script)
}

/// Bitcoin variable-length integer.
fn write_varint(out: &mut Vec<u8>, value: u64) {
    match value {
        0..=0xFC => out.push(value as u8),
        0xFD..=0xFFFF => {
            out.push(0xFD);
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xFFFF_FFFF => {
            out.push(0xFE);
            out.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            out.push(0xFF);
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigil_core::chain::Chain;
    use sigil_core::secret::Seed;
    use sigil_keys::derivation;

    use crate::selection::select_coins;

    fn seed() -> Seed {
        Seed::from_bytes([0x42u8; 64])
    }

    /// A wallet address at index `i` plus a UTXO paying it.
    fn funded_utxo(index: u32, amount: u64) -> (StoredUtxo, String) {
        let record = derivation::derive_address(&seed(), Chain::Bsv, 0, index).unwrap();
        let script = hex::encode(p2pkh_script(&record.address).unwrap());
        let utxo = StoredUtxo {
            tx_id: hex::encode([index as u8 + 1; 32]),
            output_index: index,
            address: record.address.clone(),
            amount_sat: amount,
            script_pubkey: script,
            spent: false,
        };
        (utxo, record.address)
    }

    fn key_lookup(address: &str) -> Result<PrivateKey, TxError> {
        // Scan a few indexes for the matching derivation.
        for index in 0..4 {
            let record = derivation::derive_address(&seed(), Chain::Bsv, 0, index).unwrap();
            if record.address == address {
                return derivation::derive_private_key(&seed(), Chain::Bsv, 0, 0, index)
                    .map_err(|e| TxError::Signing(e.to_string()));
            }
        }
        Err(TxError::Signing(format!("no key for {address}")))
    }

    fn recipient() -> String {
        derivation::derive_address(&seed(), Chain::Bsv, 1, 0).unwrap().address
    }

    // --- Varint ---

    #[test]
    fn varint_encoding() {
        let mut out = Vec::new();
        write_varint(&mut out, 0);
        write_varint(&mut out, 0xFC);
        write_varint(&mut out, 0xFD);
        write_varint(&mut out, 0xFFFF);
        write_varint(&mut out, 0x1_0000);
        assert_eq!(
            out,
            vec![
                0x00, 0xFC, 0xFD, 0xFD, 0x00, 0xFD, 0xFF, 0xFF, 0xFE, 0x00, 0x00, 0x01, 0x00
            ]
        );
    }

    // --- Script ---

    #[test]
    fn p2pkh_script_known() {
        let script = p2pkh_script("1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH").unwrap();
        assert_eq!(
            hex::encode(script),
            "76a914751e76e8199196d454941c45d1b3a323f1433bd688ac"
        );
    }

    #[test]
    fn p2pkh_script_rejects_eth() {
        assert!(matches!(
            p2pkh_script("0x9858EfFD232B4033E47d90003D41EC34EcaEda94").unwrap_err(),
            TxError::InvalidAddress(_)
        ));
    }

    // --- Build + sign ---

    #[test]
    fn builds_wire_exact_structure() {
        let (utxo, _) = funded_utxo(0, 100_000);
        let selection = select_coins(&[utxo], 40_000, 1).unwrap();
        let change = derivation::derive_address_at(
            &seed(),
            derivation::DerivationScheme::standard(Chain::Bsv),
            derivation::CHANGE_INTERNAL,
            0,
        )
        .unwrap();

        let signed = build_signed(
            &selection,
            &[TxOutput { address: recipient(), amount_sat: 40_000 }],
            Some(&change.address),
            key_lookup,
        )
        .unwrap();

        let raw = &signed.raw;
        // version 1
        assert_eq!(&raw[..4], &1u32.to_le_bytes());
        // one input
        assert_eq!(raw[4], 1);
        // outpoint txid is reversed
        let mut expected_txid = hex::decode(&selection.selected[0].tx_id).unwrap();
        expected_txid.reverse();
        assert_eq!(&raw[5..37], expected_txid.as_slice());
        // trailing locktime is zero
        assert_eq!(&raw[raw.len() - 4..], &[0, 0, 0, 0]);
        // txid is 64 hex chars
        assert_eq!(signed.tx_id.len(), 64);
        assert_eq!(signed.spent_outpoints.len(), 1);
    }

    #[test]
    fn signature_verifies_against_sighash() {
        use k256::ecdsa::signature::hazmat::PrehashVerifier;
        use k256::ecdsa::{Signature, VerifyingKey};

        let (utxo, address) = funded_utxo(0, 100_000);
        let selection = select_coins(&[utxo.clone()], 40_000, 1).unwrap();
        let change = derivation::derive_address_at(
            &seed(),
            derivation::DerivationScheme::standard(Chain::Bsv),
            derivation::CHANGE_INTERNAL,
            0,
        )
        .unwrap();
        let outputs = [TxOutput { address: recipient(), amount_sat: 40_000 }];
        let signed =
            build_signed(&selection, &outputs, Some(&change.address), key_lookup).unwrap();

        // Reconstruct the digest the builder must have signed.
        let mut all_outputs = vec![(
            p2pkh_script(&outputs[0].address).unwrap(),
            outputs[0].amount_sat,
        )];
        all_outputs.push((p2pkh_script(&change.address).unwrap(), selection.change));
        let digest = sighash_forkid(
            &utxo,
            &sha256d(&concat_outpoints(&selection.selected).unwrap()),
            &sha256d(&concat_sequences(1)),
            &sha256d(&serialize_outputs(&all_outputs)),
        )
        .unwrap();

        // Parse scriptSig out of the serialized input.
        let script_len = signed.raw[41] as usize;
        let script_sig = &signed.raw[42..42 + script_len];
        let sig_len = script_sig[0] as usize;
        let der = &script_sig[1..sig_len]; // strip trailing sighash byte
        assert_eq!(script_sig[sig_len], 0x41);
        let pubkey_len = script_sig[sig_len + 1] as usize;
        let pubkey = &script_sig[sig_len + 2..sig_len + 2 + pubkey_len];
        assert_eq!(pubkey_len, 33);

        let key = key_lookup(&address).unwrap();
        let expected_pubkey = ecdsa::derive_pubkey(&key).unwrap();
        assert_eq!(pubkey, expected_pubkey);

        let verifying_key = VerifyingKey::from_sec1_bytes(pubkey).unwrap();
        let signature = Signature::from_der(der).unwrap();
        verifying_key.verify_prehash(&digest, &signature).unwrap();
    }

    #[test]
    fn multi_input_signs_each_with_its_key() {
        let (u0, _) = funded_utxo(0, 30_000);
        let (u1, _) = funded_utxo(1, 30_000);
        let selection = select_coins(&[u0, u1], 50_000, 1).unwrap();
        let change = derivation::derive_address_at(
            &seed(),
            derivation::DerivationScheme::standard(Chain::Bsv),
            derivation::CHANGE_INTERNAL,
            0,
        )
        .unwrap();
        let signed = build_signed(
            &selection,
            &[TxOutput { address: recipient(), amount_sat: 50_000 }],
            Some(&change.address),
            key_lookup,
        )
        .unwrap();
        assert_eq!(signed.spent_outpoints.len(), 2);
    }

    #[test]
    fn deterministic_signing() {
        let (utxo, _) = funded_utxo(0, 100_000);
        let selection = select_coins(&[utxo], 40_000, 1).unwrap();
        let change = derivation::derive_address_at(
            &seed(),
            derivation::DerivationScheme::standard(Chain::Bsv),
            derivation::CHANGE_INTERNAL,
            0,
        )
        .unwrap();
        let outputs = [TxOutput { address: recipient(), amount_sat: 40_000 }];
        let a = build_signed(&selection, &outputs, Some(&change.address), key_lookup).unwrap();
        let b = build_signed(&selection, &outputs, Some(&change.address), key_lookup).unwrap();
        assert_eq!(a.raw, b.raw, "RFC 6979 makes builds reproducible");
        assert_eq!(a.tx_id, b.tx_id);
    }

    #[test]
    fn missing_key_fails() {
        let (utxo, _) = funded_utxo(0, 100_000);
        let selection = select_coins(&[utxo], 40_000, 1).unwrap();
        let err = build_signed(
            &selection,
            &[TxOutput { address: recipient(), amount_sat: 40_000 }],
            Some(&recipient()),
            |_| Err(TxError::Signing("no key".into())),
        )
        .unwrap_err();
        assert!(matches!(err, TxError::Signing(_)));
    }

    #[test]
    fn zero_output_rejected() {
        let (utxo, _) = funded_utxo(0, 100_000);
        let selection = select_coins(&[utxo], 40_000, 1).unwrap();
        assert!(matches!(
            build_signed(
                &selection,
                &[TxOutput { address: recipient(), amount_sat: 0 }],
                Some(&recipient()),
                key_lookup,
            )
            .unwrap_err(),
            TxError::InvalidAmount(_)
        ));
    }

    #[test]
    fn change_without_address_rejected() {
        let (utxo, _) = funded_utxo(0, 100_000);
        let selection = select_coins(&[utxo], 40_000, 1).unwrap();
        assert!(selection.change > 0);
        assert!(matches!(
            build_signed(
                &selection,
                &[TxOutput { address: recipient(), amount_sat: 40_000 }],
                None,
                key_lookup,
            )
            .unwrap_err(),
            TxError::Build(_)
        ));
    }
}
