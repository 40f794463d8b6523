//! Account-level extended public key export and watch-only derivation.
//!
//! The exported key is neutered at `m/44'/coin'/account'`: it can derive the
//! two unhardened levels below it (change, index) but carries no private
//! material. This backs read-only agent mode and external watch tooling.

use bip32::{ChildNumber, Prefix, XPub};
use std::str::FromStr;

use sigil_core::chain::Chain;
use sigil_core::secret::Seed;

use crate::derivation::{self, AddressRecord, CHANGE_INTERNAL};
use crate::error::KeyError;

/// Export the Base58Check account xpub for `(chain, account)`.
pub fn derive_account_xpub(seed: &Seed, chain: Chain, account: u32) -> Result<String, KeyError> {
    let xprv = derivation::derive_account_xprv(seed, chain, account)?;
    Ok(xprv.public_key().to_string(Prefix::XPUB))
}

/// Check that a string parses as an extended *public* key.
pub fn validate_xpub(xpub: &str) -> Result<(), KeyError> {
    let trimmed = xpub.trim();
    if trimmed.starts_with("xprv") {
        return Err(KeyError::XpubIsPrivate);
    }
    XPub::from_str(trimmed)
        .map(|_| ())
        .map_err(|e| KeyError::XpubInvalid(e.to_string()))
}

/// Derive the address at `(change, index)` under an exported account xpub.
///
/// Only the two unhardened child steps are walked; a private extended key is
/// rejected with [`KeyError::XpubIsPrivate`] before any parsing.
pub fn derive_address_from_xpub(
    xpub: &str,
    chain: Chain,
    change: u32,
    index: u32,
) -> Result<AddressRecord, KeyError> {
    let trimmed = xpub.trim();
    if trimmed.starts_with("xprv") {
        return Err(KeyError::XpubIsPrivate);
    }
    let account_key =
        XPub::from_str(trimmed).map_err(|e| KeyError::XpubInvalid(e.to_string()))?;

    let change_child =
        ChildNumber::new(change, false).map_err(|e| KeyError::XpubInvalid(e.to_string()))?;
    let index_child =
        ChildNumber::new(index, false).map_err(|e| KeyError::XpubInvalid(e.to_string()))?;
    let leaf = account_key
        .derive_child(change_child)
        .and_then(|k| k.derive_child(index_child))
        .map_err(|e| KeyError::XpubInvalid(e.to_string()))?;

    use bip32::PublicKey as _;
    let compressed: [u8; 33] = leaf.public_key().to_bytes();
    let address = derivation::format_address(chain, &compressed)?;
    Ok(AddressRecord {
        derivation_path: format!("{change}/{index}"),
        index,
        address,
        public_key_hex: hex::encode(compressed),
        is_change: change == CHANGE_INTERNAL,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivation::{derive_address, derive_address_at, DerivationScheme, CHANGE_EXTERNAL};
    use crate::mnemonic;

    const VECTOR_PHRASE: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn vector_seed() -> Seed {
        mnemonic::to_seed(VECTOR_PHRASE, "").unwrap()
    }

    #[test]
    fn xpub_is_base58check_and_neutered() {
        let seed = vector_seed();
        let xpub = derive_account_xpub(&seed, Chain::Bsv, 0).unwrap();
        assert!(xpub.starts_with("xpub"), "unexpected prefix: {xpub}");
        assert!(!xpub.contains("xprv"));
    }

    #[test]
    fn xpub_deterministic_per_account() {
        let seed = vector_seed();
        let a = derive_account_xpub(&seed, Chain::Bsv, 0).unwrap();
        let b = derive_account_xpub(&seed, Chain::Bsv, 0).unwrap();
        let other = derive_account_xpub(&seed, Chain::Bsv, 1).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, other);
    }

    #[test]
    fn xpub_derives_same_addresses_as_seed() {
        let seed = vector_seed();
        for chain in [Chain::Bsv, Chain::Eth] {
            let xpub = derive_account_xpub(&seed, chain, 0).unwrap();
            for index in [0u32, 1, 7] {
                let from_seed = derive_address(&seed, chain, 0, index).unwrap();
                let from_xpub =
                    derive_address_from_xpub(&xpub, chain, CHANGE_EXTERNAL, index).unwrap();
                assert_eq!(from_seed.address, from_xpub.address);
                assert_eq!(from_seed.public_key_hex, from_xpub.public_key_hex);
            }
        }
    }

    #[test]
    fn xpub_derives_change_addresses() {
        let seed = vector_seed();
        let xpub = derive_account_xpub(&seed, Chain::Bsv, 0).unwrap();
        let from_seed = derive_address_at(
            &seed,
            DerivationScheme::standard(Chain::Bsv),
            CHANGE_INTERNAL,
            0,
        )
        .unwrap();
        let from_xpub = derive_address_from_xpub(&xpub, Chain::Bsv, CHANGE_INTERNAL, 0).unwrap();
        assert_eq!(from_seed.address, from_xpub.address);
        assert!(from_xpub.is_change);
    }

    #[test]
    fn private_key_rejected() {
        let err = derive_address_from_xpub("xprv9s21ZrQH143K3QTDL4LXw2F7HEK3wJUD2nW2nRk4stbPy6cq3jPPqjiChkVvvNKmPGJxWUtg6LnF5kejMRNNU3TGtRBeJgk33yuGBxrMPHi", Chain::Bsv, 0, 0)
            .unwrap_err();
        assert_eq!(err, KeyError::XpubIsPrivate);
    }

    #[test]
    fn validate_accepts_own_export() {
        let xpub = derive_account_xpub(&vector_seed(), Chain::Bsv, 0).unwrap();
        validate_xpub(&xpub).unwrap();
        assert!(validate_xpub("garbage").is_err());
    }

    #[test]
    fn garbage_rejected() {
        assert!(matches!(
            derive_address_from_xpub("not-an-xpub", Chain::Bsv, 0, 0).unwrap_err(),
            KeyError::XpubInvalid(_)
        ));
    }
}
