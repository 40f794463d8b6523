//! Base58 and Base58Check codecs.
//!
//! Base58Check is `payload || first-4-bytes-of-sha256d(payload)` run through
//! plain Base58. Used for P2PKH addresses, WIF keys, and extended public
//! keys.

use thiserror::Error;

use crate::hashes::sha256d;

/// Length of the Base58Check checksum suffix.
const CHECKSUM_LEN: usize = 4;

/// Base58 decoding failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Base58Error {
    /// Input contains a character outside the Base58 alphabet.
    #[error("invalid base58 character")]
    InvalidCharacter,

    /// Decoded payload is too short to carry a checksum.
    #[error("base58check payload too short: {0} bytes")]
    TooShort(usize),

    /// Checksum mismatch.
    #[error("base58check checksum mismatch")]
    BadChecksum,
}

/// Encode bytes as plain Base58.
pub fn base58_encode(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

/// Decode plain Base58.
pub fn base58_decode(s: &str) -> Result<Vec<u8>, Base58Error> {
    bs58::decode(s)
        .into_vec()
        .map_err(|_| Base58Error::InvalidCharacter)
}

/// Encode `version || payload` with a 4-byte sha256d checksum.
pub fn base58check_encode(version: u8, payload: &[u8]) -> String {
    let mut data = Vec::with_capacity(1 + payload.len() + CHECKSUM_LEN);
    data.push(version);
    data.extend_from_slice(payload);
    let checksum = sha256d(&data);
    data.extend_from_slice(&checksum[..CHECKSUM_LEN]);
    base58_encode(&data)
}

/// Decode a Base58Check string, verifying the checksum.
///
/// Returns the full versioned payload (version byte included, checksum
/// stripped) so callers can dispatch on the version themselves.
pub fn base58check_decode(s: &str) -> Result<Vec<u8>, Base58Error> {
    let data = base58_decode(s)?;
    if data.len() < 1 + CHECKSUM_LEN {
        return Err(Base58Error::TooShort(data.len()));
    }
    let (payload, checksum) = data.split_at(data.len() - CHECKSUM_LEN);
    let expected = sha256d(payload);
    if checksum != &expected[..CHECKSUM_LEN] {
        return Err(Base58Error::BadChecksum);
    }
    Ok(payload.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base58_roundtrip() {
        let data = b"hello sigil";
        let encoded = base58_encode(data);
        assert_eq!(base58_decode(&encoded).unwrap(), data);
    }

    #[test]
    fn base58_rejects_invalid_characters() {
        // '0', 'O', 'I', 'l' are not in the alphabet
        assert_eq!(base58_decode("0OIl").unwrap_err(), Base58Error::InvalidCharacter);
    }

    #[test]
    fn check_roundtrip() {
        let payload = [0xABu8; 20];
        let encoded = base58check_encode(0x00, &payload);
        let decoded = base58check_decode(&encoded).unwrap();
        assert_eq!(decoded[0], 0x00);
        assert_eq!(&decoded[1..], &payload);
        assert_eq!(decoded.len(), 21);
    }

    #[test]
    fn check_known_p2pkh_address() {
        let payload = hex::decode("751e76e8199196d454941c45d1b3a323f1433bd6").unwrap();
        let encoded = base58check_encode(0x00, &payload);
        assert_eq!(encoded, "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH");
    }

    #[test]
    fn check_known_wif_decodes() {
        let decoded =
            base58check_decode("5HueCGU8rMjxEXxiPuD5BDku4MkFqeZyd4dZ1jvhTVqvbTLvyTJ").unwrap();
        assert_eq!(decoded[0], 0x80);
        assert_eq!(
            hex::encode(&decoded[1..33]),
            "0c28fca386c7a227600b2fe50b7cae11ec86d3bf1fbe471be89827e19d72aa1d"
        );
    }

    #[test]
    fn check_detects_tamper() {
        let encoded = base58check_encode(0x00, &[0x11u8; 20]);
        // Swap one character for a different alphabet member
        let mut chars: Vec<char> = encoded.chars().collect();
        let pos = chars.len() / 2;
        chars[pos] = if chars[pos] == '2' { '3' } else { '2' };
        let tampered: String = chars.into_iter().collect();
        assert!(matches!(
            base58check_decode(&tampered),
            Err(Base58Error::BadChecksum) | Err(Base58Error::InvalidCharacter)
        ));
    }

    #[test]
    fn check_too_short() {
        let encoded = base58_encode(&[1, 2, 3]);
        assert!(matches!(
            base58check_decode(&encoded),
            Err(Base58Error::TooShort(_))
        ));
    }

    #[test]
    fn leading_zeros_preserved() {
        let data = [0u8, 0, 0, 1, 2];
        let encoded = base58_encode(&data);
        assert!(encoded.starts_with("111"));
        assert_eq!(base58_decode(&encoded).unwrap(), data);
    }
}
