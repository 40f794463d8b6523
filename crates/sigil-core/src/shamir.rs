//! Shamir secret sharing over GF(2⁸).
//!
//! The field is GF(2⁸) with the primitive polynomial 0x11B and generator 3.
//! A secret of any length splits byte-wise: for each byte, a random
//! polynomial of degree `k-1` has the secret byte as its constant term and
//! is evaluated at `x = 1..n`. Any `k` distinct shares reconstruct the
//! secret by Lagrange interpolation at `x = 0`.
//!
//! # Share format
//!
//! ```text
//! sigil-v1-<k>-<index>-<hex of y-vector>
//! ```
//!
//! The format is Sigil-specific and stable across versions; interop with
//! external Shamir tools is not promised.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use thiserror::Error;

/// Share format prefix.
const SHARE_PREFIX: &str = "sigil-v1";

/// Highest share index / share count.
const MAX_SHARES: usize = 255;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShamirError {
    /// Threshold outside `2 ≤ k ≤ n`.
    #[error("invalid threshold: k={k}, n={n}")]
    InvalidThreshold { k: usize, n: usize },

    /// Share count outside `k ≤ n ≤ 255`.
    #[error("invalid share count: {0}")]
    InvalidShareCount(usize),

    /// Secrets must be non-empty.
    #[error("secret is empty")]
    EmptySecret,

    /// Text share failed to parse.
    #[error("malformed share: {0}")]
    MalformedShare(String),

    /// Shares disagree on threshold or secret length.
    #[error("mismatched shares: {0}")]
    MismatchedShares(String),

    /// Fewer than `k` distinct shares supplied.
    #[error("not enough shares: have {have}, need {need}")]
    NotEnoughShares { have: usize, need: usize },
}

// --- GF(2^8) arithmetic ---

struct GfTables {
    exp: [u8; 510],
    log: [u8; 256],
}

/// Exp/log tables for generator 3, computed once per process.
fn gf_tables() -> &'static GfTables {
    static TABLES: OnceLock<GfTables> = OnceLock::new();
    TABLES.get_or_init(|| {
        let mut exp = [0u8; 510];
        let mut log = [0u8; 256];
        let mut x: u16 = 1;
        for i in 0..255 {
            exp[i] = x as u8;
            log[x as usize] = i as u8;
            // Multiply by the generator 3 = x ⊕ (x·2), reducing by 0x11B.
            let mut next = (x << 1) ^ x;
            if next & 0x100 != 0 {
                next ^= 0x11B;
            }
            x = next;
        }
        // Duplicate the cycle so exp lookups never need a modulo.
        for i in 255..510 {
            exp[i] = exp[i - 255];
        }
        GfTables { exp, log }
    })
}

fn gf_mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    let t = gf_tables();
    t.exp[t.log[a as usize] as usize + t.log[b as usize] as usize]
}

fn gf_div(a: u8, b: u8) -> u8 {
    debug_assert_ne!(b, 0, "division by zero in GF(2^8)");
    if a == 0 {
        return 0;
    }
    let t = gf_tables();
    t.exp[t.log[a as usize] as usize + 255 - t.log[b as usize] as usize]
}

/// Evaluate a polynomial (coefficients low-to-high) at `x` via Horner.
fn gf_eval(coeffs: &[u8], x: u8) -> u8 {
    let mut acc = 0u8;
    for &c in coeffs.iter().rev() {
        acc = gf_mul(acc, x) ^ c;
    }
    acc
}

// --- Shares ---

/// One share of a split secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share {
    /// Threshold required to reconstruct.
    pub threshold: u8,
    /// Evaluation point, `1..=255`.
    pub index: u8,
    /// One y-value per secret byte.
    pub data: Vec<u8>,
}

impl fmt::Display for Share {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{SHARE_PREFIX}-{}-{}-{}",
            self.threshold,
            self.index,
            hex::encode(&self.data)
        )
    }
}

impl FromStr for Share {
    type Err = ShamirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let rest = s
            .strip_prefix(SHARE_PREFIX)
            .and_then(|r| r.strip_prefix('-'))
            .ok_or_else(|| ShamirError::MalformedShare(format!("missing {SHARE_PREFIX} prefix")))?;

        let mut parts = rest.splitn(3, '-');
        let threshold: u8 = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| ShamirError::MalformedShare("unreadable threshold".into()))?;
        let index: u8 = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| ShamirError::MalformedShare("unreadable index".into()))?;
        let data = parts
            .next()
            .and_then(|p| hex::decode(p).ok())
            .ok_or_else(|| ShamirError::MalformedShare("unreadable share data".into()))?;

        if threshold < 2 {
            return Err(ShamirError::MalformedShare(format!(
                "threshold {threshold} below 2"
            )));
        }
        if index == 0 {
            return Err(ShamirError::MalformedShare("share index 0 is reserved".into()));
        }
        if data.is_empty() {
            return Err(ShamirError::MalformedShare("empty share data".into()));
        }
        Ok(Share { threshold, index, data })
    }
}

/// Split a secret into `n` shares, any `k` of which reconstruct it.
pub fn split(secret: &[u8], n: usize, k: usize) -> Result<Vec<Share>, ShamirError> {
    if secret.is_empty() {
        return Err(ShamirError::EmptySecret);
    }
    if k < 2 || k > n {
        return Err(ShamirError::InvalidThreshold { k, n });
    }
    if n > MAX_SHARES {
        return Err(ShamirError::InvalidShareCount(n));
    }

    use rand::RngCore;
    let mut rng = rand::rngs::OsRng;

    // One polynomial per secret byte; coefficient 0 is the secret byte.
    let mut polys: Vec<Vec<u8>> = Vec::with_capacity(secret.len());
    for &byte in secret {
        let mut coeffs = vec![0u8; k];
        coeffs[0] = byte;
        rng.fill_bytes(&mut coeffs[1..]);
        polys.push(coeffs);
    }

    let shares = (1..=n as u8)
        .map(|x| Share {
            threshold: k as u8,
            index: x,
            data: polys.iter().map(|coeffs| gf_eval(coeffs, x)).collect(),
        })
        .collect();
    Ok(shares)
}

/// Reconstruct a secret from shares.
///
/// Duplicate indexes are skipped. All used shares must agree on threshold
/// and length; at least `threshold` distinct shares are required.
pub fn combine(shares: &[Share]) -> Result<Vec<u8>, ShamirError> {
    let first = shares
        .first()
        .ok_or(ShamirError::NotEnoughShares { have: 0, need: 2 })?;
    let threshold = first.threshold as usize;
    let len = first.data.len();

    let mut unique: Vec<&Share> = Vec::with_capacity(threshold);
    for share in shares {
        if share.threshold as usize != threshold {
            return Err(ShamirError::MismatchedShares(format!(
                "threshold {} != {}",
                share.threshold, threshold
            )));
        }
        if share.data.len() != len {
            return Err(ShamirError::MismatchedShares(format!(
                "length {} != {}",
                share.data.len(),
                len
            )));
        }
        if unique.iter().any(|s| s.index == share.index) {
            continue;
        }
        unique.push(share);
    }

    if unique.len() < threshold {
        return Err(ShamirError::NotEnoughShares {
            have: unique.len(),
            need: threshold,
        });
    }
    let used = &unique[..threshold];

    // Lagrange basis weights at x = 0: w_i = Π_{j≠i} x_j / (x_j ⊕ x_i).
    let mut weights = Vec::with_capacity(threshold);
    for (i, si) in used.iter().enumerate() {
        let mut weight = 1u8;
        for (j, sj) in used.iter().enumerate() {
            if i == j {
                continue;
            }
            weight = gf_mul(weight, gf_div(sj.index, sj.index ^ si.index));
        }
        weights.push(weight);
    }

    let mut secret = vec![0u8; len];
    for (byte_idx, out) in secret.iter_mut().enumerate() {
        let mut acc = 0u8;
        for (share, &weight) in used.iter().zip(&weights) {
            acc ^= gf_mul(weight, share.data[byte_idx]);
        }
        *out = acc;
    }
    Ok(secret)
}

/// Parse textual shares and reconstruct the secret.
pub fn combine_strings(shares: &[String]) -> Result<Vec<u8>, ShamirError> {
    let parsed: Result<Vec<Share>, ShamirError> =
        shares.iter().map(|s| s.parse()).collect();
    combine(&parsed?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // --- Field arithmetic ---

    #[test]
    fn mul_identity_and_zero() {
        for a in 0..=255u8 {
            assert_eq!(gf_mul(a, 1), a);
            assert_eq!(gf_mul(a, 0), 0);
            assert_eq!(gf_mul(0, a), 0);
        }
    }

    #[test]
    fn mul_commutative() {
        for a in [3u8, 7, 0x53, 0xCA, 0xFF] {
            for b in [2u8, 9, 0x11, 0x80, 0xFE] {
                assert_eq!(gf_mul(a, b), gf_mul(b, a));
            }
        }
    }

    #[test]
    fn div_inverts_mul() {
        for a in 1..=255u8 {
            for b in [1u8, 3, 0x1B, 0x80, 0xFF] {
                assert_eq!(gf_div(gf_mul(a, b), b), a);
            }
        }
    }

    #[test]
    fn known_products() {
        // 0x53 · 0xCA = 0x01 (AES S-box inverse pair).
        assert_eq!(gf_mul(0x53, 0xCA), 0x01);
        assert_eq!(gf_mul(2, 0x80), 0x1B);
    }

    // --- Split / combine ---

    #[test]
    fn split_and_combine_exact_threshold() {
        let secret = b"the quick brown fox";
        let shares = split(secret, 5, 3).unwrap();
        assert_eq!(shares.len(), 5);
        let recovered = combine(&shares[..3]).unwrap();
        assert_eq!(recovered, secret);
    }

    #[test]
    fn any_subset_of_k_reconstructs() {
        let secret = b"subset test";
        let shares = split(secret, 5, 2).unwrap();
        for i in 0..5 {
            for j in (i + 1)..5 {
                let pair = vec![shares[i].clone(), shares[j].clone()];
                assert_eq!(combine(&pair).unwrap(), secret);
            }
        }
    }

    #[test]
    fn too_few_shares_fails() {
        let shares = split(b"secret", 5, 3).unwrap();
        let err = combine(&shares[..2]).unwrap_err();
        assert_eq!(err, ShamirError::NotEnoughShares { have: 2, need: 3 });
    }

    #[test]
    fn duplicate_indexes_skipped() {
        let shares = split(b"secret", 4, 2).unwrap();
        let dup = vec![shares[0].clone(), shares[0].clone(), shares[1].clone()];
        assert_eq!(combine(&dup).unwrap(), b"secret");
    }

    #[test]
    fn duplicates_alone_are_not_enough() {
        let shares = split(b"secret", 4, 2).unwrap();
        let dup = vec![shares[0].clone(), shares[0].clone()];
        assert_eq!(
            combine(&dup).unwrap_err(),
            ShamirError::NotEnoughShares { have: 1, need: 2 }
        );
    }

    #[test]
    fn mutated_share_changes_output_without_panicking() {
        let secret = b"integrity";
        let shares = split(secret, 3, 2).unwrap();
        let mut bad = shares[0].clone();
        bad.data[0] ^= 0xFF;
        let recovered = combine(&[bad, shares[1].clone()]).unwrap();
        assert_ne!(recovered, secret);
    }

    #[test]
    fn mismatched_threshold_rejected() {
        let a = split(b"one", 3, 2).unwrap();
        let b = split(b"one", 3, 3).unwrap();
        let mixed = vec![a[0].clone(), b[1].clone()];
        assert!(matches!(
            combine(&mixed).unwrap_err(),
            ShamirError::MismatchedShares(_)
        ));
    }

    #[test]
    fn mismatched_length_rejected() {
        let a = split(b"one", 3, 2).unwrap();
        let b = split(b"longer secret", 3, 2).unwrap();
        let mixed = vec![a[0].clone(), b[1].clone()];
        assert!(matches!(
            combine(&mixed).unwrap_err(),
            ShamirError::MismatchedShares(_)
        ));
    }

    #[test]
    fn invalid_parameters_rejected() {
        assert!(matches!(
            split(b"", 3, 2).unwrap_err(),
            ShamirError::EmptySecret
        ));
        assert!(matches!(
            split(b"x", 3, 1).unwrap_err(),
            ShamirError::InvalidThreshold { .. }
        ));
        assert!(matches!(
            split(b"x", 2, 3).unwrap_err(),
            ShamirError::InvalidThreshold { .. }
        ));
        assert!(matches!(
            split(b"x", 256, 2).unwrap_err(),
            ShamirError::InvalidShareCount(256)
        ));
    }

    // --- Text format ---

    #[test]
    fn display_parse_roundtrip() {
        let shares = split(b"roundtrip", 3, 2).unwrap();
        for share in &shares {
            let text = share.to_string();
            assert!(text.starts_with("sigil-v1-2-"));
            let parsed: Share = text.parse().unwrap();
            assert_eq!(&parsed, share);
        }
    }

    #[test]
    fn parse_tolerates_surrounding_whitespace() {
        let share = split(b"ws", 2, 2).unwrap().remove(0);
        let text = format!("  {share}\n");
        assert_eq!(text.parse::<Share>().unwrap(), share);
    }

    #[test]
    fn parse_rejects_garbage() {
        for bad in [
            "not-a-share",
            "sigil-v1-2-1-zz",
            "sigil-v1-1-1-aa",
            "sigil-v1-2-0-aa",
            "sigil-v1-2-1-",
            "sigil-v2-2-1-aa",
        ] {
            assert!(bad.parse::<Share>().is_err(), "accepted: {bad}");
        }
    }

    #[test]
    fn fixed_vector_reconstructs() {
        // Published interop vector: any two of these reconstruct "secret".
        let s1: Share = "sigil-v1-2-1-449abc1b970d".parse().unwrap();
        let s2: Share = "sigil-v1-2-2-1d80c6a09a86".parse().unwrap();
        let s3: Share = "sigil-v1-2-3-2a7f19c968ff".parse().unwrap();
        for pair in [
            [s1.clone(), s2.clone()],
            [s1.clone(), s3.clone()],
            [s2, s3],
        ] {
            assert_eq!(combine(&pair).unwrap(), b"secret");
        }
    }

    // --- Properties ---

    proptest! {
        #[test]
        fn prop_roundtrip(secret in proptest::collection::vec(any::<u8>(), 1..64),
                          k in 2usize..6, extra in 0usize..4) {
            let n = k + extra;
            let shares = split(&secret, n, k).unwrap();
            let recovered = combine(&shares[extra..]).unwrap();
            prop_assert_eq!(recovered, secret);
        }
    }
}
