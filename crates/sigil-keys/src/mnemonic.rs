//! BIP-39 mnemonic generation, normalization, and validation.
//!
//! Users paste mnemonics from password managers, printouts, and notes apps,
//! so [`normalize`] accepts numbered lists, bullets, commas, mixed case, and
//! ragged whitespace. Validation is strict after normalization: word count,
//! wordlist membership, checksum.

use bip39::{Language, Mnemonic};
use std::collections::HashSet;
use std::sync::OnceLock;
use zeroize::Zeroize;

use sigil_core::secret::Seed;

use crate::error::KeyError;

/// Accepted mnemonic lengths.
pub const WORD_COUNTS: [usize; 2] = [12, 24];

fn wordlist() -> &'static HashSet<&'static str> {
    static WORDS: OnceLock<HashSet<&'static str>> = OnceLock::new();
    WORDS.get_or_init(|| Language::English.word_list().iter().copied().collect())
}

/// Generate a fresh mnemonic of 12 or 24 words from the OS CSPRNG.
pub fn generate(words: usize) -> Result<String, KeyError> {
    let entropy_len = match words {
        12 => 16,
        24 => 32,
        other => return Err(KeyError::WordCount(other)),
    };
    use rand::RngCore;
    let mut entropy = vec![0u8; entropy_len];
    rand::rngs::OsRng.fill_bytes(&mut entropy);
    let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy)
        .map_err(|e| KeyError::InvalidMnemonic(e.to_string()))?;
    entropy.zeroize();
    Ok(mnemonic.to_string())
}

/// Normalize a pasted phrase into canonical space-separated lowercase words.
///
/// Strips numbered-list prefixes (`1.`, `2)`, `3:`), bullet characters,
/// replaces commas with spaces, and collapses whitespace.
pub fn normalize(phrase: &str) -> String {
    let replaced = phrase.replace(',', " ");
    let mut words = Vec::new();
    for raw in replaced.split_whitespace() {
        let token = raw.trim_start_matches(['-', '*', '•']);
        let token = strip_list_number(token);
        if token.is_empty() {
            continue;
        }
        words.push(token.to_lowercase());
    }
    words.join(" ")
}

/// Strip a leading `<digits>` optionally followed by `.`, `)`, or `:`.
/// `"1.abandon"` → `"abandon"`, `"7)"` → `""`, `"zoo"` → `"zoo"`.
fn strip_list_number(token: &str) -> &str {
    let digits = token.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return token;
    }
    let rest = &token[digits..];
    rest.strip_prefix(['.', ')', ':']).unwrap_or(rest)
}

/// Validate a phrase: word count first, then membership, then checksum.
pub fn validate(phrase: &str) -> Result<(), KeyError> {
    let normalized = normalize(phrase);
    let words: Vec<&str> = normalized.split_whitespace().collect();
    if !WORD_COUNTS.contains(&words.len()) {
        return Err(KeyError::WordCount(words.len()));
    }
    for word in &words {
        if !wordlist().contains(word) {
            return Err(KeyError::InvalidMnemonic(format!("unknown word: {word}")));
        }
    }
    Mnemonic::parse_in(Language::English, &normalized)
        .map_err(|e| KeyError::InvalidMnemonic(e.to_string()))?;
    Ok(())
}

/// Derive the 64-byte seed from a phrase and optional passphrase.
///
/// Normalizes and validates first; delegates PBKDF2-HMAC-SHA512 to the
/// `bip39` crate. The intermediate array is zeroed after the [`Seed`] takes
/// ownership.
pub fn to_seed(phrase: &str, passphrase: &str) -> Result<Seed, KeyError> {
    let normalized = normalize(phrase);
    validate(&normalized)?;
    let mnemonic = Mnemonic::parse_in(Language::English, &normalized)
        .map_err(|e| KeyError::InvalidMnemonic(e.to_string()))?;
    let mut bytes = mnemonic.to_seed(passphrase);
    let seed = Seed::from_bytes(bytes);
    bytes.zeroize();
    Ok(seed)
}

/// A typo report for one token of a pasted phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypoSuggestion {
    /// The token as the user typed it (post-normalization).
    pub token: String,
    /// Closest wordlist word within Levenshtein distance 2, if any.
    pub suggestion: Option<String>,
}

/// For each non-wordlist token, suggest the closest wordlist word within
/// edit distance 2.
pub fn detect_typos(phrase: &str) -> Vec<TypoSuggestion> {
    let normalized = normalize(phrase);
    let mut reports = Vec::new();
    for token in normalized.split_whitespace() {
        if wordlist().contains(token) {
            continue;
        }
        let mut best: Option<(&str, usize)> = None;
        for candidate in Language::English.word_list() {
            let dist = levenshtein(token, candidate);
            if dist <= 2 && best.map_or(true, |(_, d)| dist < d) {
                best = Some((candidate, dist));
                if dist == 1 {
                    break;
                }
            }
        }
        reports.push(TypoSuggestion {
            token: token.to_string(),
            suggestion: best.map(|(w, _)| w.to_string()),
        });
    }
    reports
}

/// Classic two-row Levenshtein distance.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    const VECTOR_PHRASE: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    // --- Generation ---

    #[test]
    fn generate_12_and_24() {
        for words in WORD_COUNTS {
            let phrase = generate(words).unwrap();
            assert_eq!(phrase.split_whitespace().count(), words);
            validate(&phrase).unwrap();
        }
    }

    #[test]
    fn generate_rejects_other_counts() {
        for words in [0, 15, 18, 21, 23] {
            assert_eq!(generate(words).unwrap_err(), KeyError::WordCount(words));
        }
    }

    #[test]
    fn generated_phrases_distinct() {
        assert_ne!(generate(12).unwrap(), generate(12).unwrap());
    }

    // --- Normalization ---

    #[test]
    fn normalize_collapses_whitespace_and_case() {
        assert_eq!(normalize("  Abandon\tABILITY \n able "), "abandon ability able");
    }

    #[test]
    fn normalize_strips_numbered_lists() {
        assert_eq!(
            normalize("1. abandon 2. ability 3. able"),
            "abandon ability able"
        );
        assert_eq!(normalize("1) abandon 2) ability"), "abandon ability");
        assert_eq!(normalize("1.abandon 2.ability"), "abandon ability");
    }

    #[test]
    fn normalize_strips_bullets_and_commas() {
        assert_eq!(normalize("- abandon, * ability, • able"), "abandon ability able");
        assert_eq!(normalize("abandon,ability,able"), "abandon ability able");
    }

    // --- Validation ---

    #[test]
    fn validate_known_vector() {
        validate(VECTOR_PHRASE).unwrap();
    }

    #[test]
    fn validate_rejects_wrong_count_before_checksum() {
        let err = validate("abandon abandon").unwrap_err();
        assert_eq!(err, KeyError::WordCount(2));
    }

    #[test]
    fn validate_rejects_unknown_word() {
        let phrase = VECTOR_PHRASE.replace("about", "aboot");
        match validate(&phrase).unwrap_err() {
            KeyError::InvalidMnemonic(msg) => assert!(msg.contains("aboot")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_bad_checksum() {
        // 12x "abandon" fails the checksum (valid last word is "about").
        let phrase = "abandon ".repeat(12);
        assert!(matches!(
            validate(phrase.trim()).unwrap_err(),
            KeyError::InvalidMnemonic(_)
        ));
    }

    // --- Seed derivation ---

    #[test]
    fn trezor_vector_seed() {
        let seed = to_seed(VECTOR_PHRASE, "TREZOR").unwrap();
        assert_eq!(
            hex::encode(seed.as_bytes()),
            "c55257c360c07c72029aebc1b53c05ed0362ada38ead3e3e9efa3708e53495531f\
             09a6987599d18264c1e1c92f2cf141630c7a3c4ab7c81b2f001698e7463b04"
        );
    }

    #[test]
    fn seed_is_64_bytes_for_both_lengths() {
        for words in WORD_COUNTS {
            let phrase = generate(words).unwrap();
            let seed = to_seed(&phrase, "").unwrap();
            assert_eq!(seed.as_bytes().len(), 64);
        }
    }

    #[test]
    fn passphrase_changes_seed() {
        let a = to_seed(VECTOR_PHRASE, "").unwrap();
        let b = to_seed(VECTOR_PHRASE, "passphrase").unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn messy_input_derives_same_seed() {
        let clean = to_seed(VECTOR_PHRASE, "").unwrap();
        let messy = to_seed(
            "1. Abandon 2. abandon 3. ABANDON 4. abandon, 5. abandon 6. abandon \
             7. abandon 8. abandon 9. abandon 10. abandon 11. abandon 12. about",
            "",
        )
        .unwrap();
        assert_eq!(clean.as_bytes(), messy.as_bytes());
    }

    // --- Typos ---

    #[test]
    fn detect_typos_suggests_close_words() {
        // "abandon" and "zebra" are wordlist words; only "abilty" is reported.
        let reports = detect_typos("abandon abilty zebra");
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].token, "abilty");
        assert_eq!(reports[0].suggestion.as_deref(), Some("ability"));
    }

    #[test]
    fn detect_typos_none_for_distant_tokens() {
        let reports = detect_typos("abandon qqqqqqqqqq");
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].suggestion, None);
    }

    #[test]
    fn detect_typos_empty_for_valid_phrase() {
        assert!(detect_typos(VECTOR_PHRASE).is_empty());
    }

    // --- Levenshtein ---

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", "abc"), 0);
        assert_eq!(levenshtein("abc", "abd"), 1);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }
}
