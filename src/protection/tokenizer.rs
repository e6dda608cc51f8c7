//! Format-preserving tokenizer
//!
//! Converts a plaintext field into a token of the same length drawn from the
//! same alphabet. The plaintext is normalized first (non-alphabet characters
//! dropped, letters upper-cased), a keystream is derived from
//! `(key, normalized plaintext)`, and each character is shifted by the
//! corresponding keystream byte modulo the alphabet size.
//!
//! This is a keyed per-character substitution, not a provably secure FPE
//! scheme. Its observable behavior (length and alphabet preservation,
//! determinism under a fixed key) is what stored tokens depend on, so it must
//! not be swapped for a different construction without a migration.
//!
//! The keystream depends on the plaintext itself, so tokens cannot be mapped
//! back without already knowing the plaintext. Recovery of a value goes
//! through the field ciphertext instead.

use crate::protection::key::KeyHandle;
use crate::protection::prf::PrfBackend;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Upper-case letters followed by decimal digits
pub const ALNUM: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Decimal digits
pub const DIGITS: &str = "0123456789";

/// Marker emitted for fields configured for irreversible redaction
pub const REDACTED: &str = "REDACTED";

/// How a sensitive field is tokenized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Upper-case alphanumeric token
    #[serde(alias = "alphanumeric")]
    Alnum,
    /// Decimal digit token
    Digits,
    /// Literal [`REDACTED`] marker
    #[serde(alias = "redact")]
    None,
}

impl FieldKind {
    /// Kind used for a tabular value: digit strings of length 4 or more use
    /// the digit alphabet, everything else the alphanumeric one
    pub fn infer_for_text(value: &str) -> Self {
        if value.len() >= 4 && value.chars().all(|c| c.is_ascii_digit()) {
            FieldKind::Digits
        } else {
            FieldKind::Alnum
        }
    }
}

/// Keyed format-preserving tokenizer
#[derive(Debug, Clone)]
pub struct Tokenizer {
    key: Arc<KeyHandle>,
    prf: PrfBackend,
}

impl Tokenizer {
    /// Create a tokenizer bound to a key and PRF backend
    pub fn new(key: Arc<KeyHandle>, prf: PrfBackend) -> Self {
        Self { key, prf }
    }

    /// Tokenize a value according to its field kind
    pub fn tokenize(&self, kind: FieldKind, plaintext: &str) -> String {
        match kind {
            FieldKind::Alnum => self.tokenize_alphabet(ALNUM, &normalize_alnum(plaintext)),
            FieldKind::Digits => self.tokenize_alphabet(DIGITS, &normalize_digits(plaintext)),
            FieldKind::None => REDACTED.to_string(),
        }
    }

    fn tokenize_alphabet(&self, alphabet: &str, normalized: &str) -> String {
        if normalized.is_empty() {
            return String::new();
        }
        let symbols = alphabet.as_bytes();
        let n = symbols.len();
        let stream = self
            .prf
            .keystream(&self.key, normalized.as_bytes(), normalized.len());

        normalized
            .bytes()
            .zip(stream)
            .map(|(ch, k)| {
                let idx = symbols.iter().position(|&s| s == ch).unwrap_or(ch as usize % n);
                symbols[(idx + k as usize) % n] as char
            })
            .collect()
    }
}

/// Keep ASCII letters and digits, upper-cased
pub fn normalize_alnum(plaintext: &str) -> String {
    plaintext
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Keep ASCII digits only
pub fn normalize_digits(plaintext: &str) -> String {
    plaintext.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn tokenizer(prf: PrfBackend) -> Tokenizer {
        Tokenizer::new(Arc::new(KeyHandle::from_bytes([42u8; 32])), prf)
    }

    #[test_case("patient00826" ; "mixed case id")]
    #[test_case("ACC-2024/0001" ; "punctuation is dropped")]
    #[test_case("General Hospital" ; "spaces are dropped")]
    #[test_case("x" ; "single char")]
    fn test_alnum_preserves_length_and_alphabet(input: &str) {
        for prf in [PrfBackend::Blake3Keyed, PrfBackend::Sha256Concat] {
            let token = tokenizer(prf).tokenize(FieldKind::Alnum, input);
            assert_eq!(token.len(), normalize_alnum(input).len());
            assert!(token.chars().all(|c| ALNUM.contains(c)), "{token}");
        }
    }

    #[test_case("20240115" ; "date")]
    #[test_case("45" ; "short")]
    #[test_case("555-0100" ; "with dash")]
    fn test_digits_preserves_length_and_alphabet(input: &str) {
        let token = tokenizer(PrfBackend::Blake3Keyed).tokenize(FieldKind::Digits, input);
        assert_eq!(token.len(), normalize_digits(input).len());
        assert!(token.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_tokenize_deterministic() {
        let t = tokenizer(PrfBackend::Blake3Keyed);
        assert_eq!(
            t.tokenize(FieldKind::Alnum, "patient00826"),
            t.tokenize(FieldKind::Alnum, "patient00826")
        );
    }

    #[test]
    fn test_tokenize_case_insensitive_input() {
        let t = tokenizer(PrfBackend::Blake3Keyed);
        assert_eq!(
            t.tokenize(FieldKind::Alnum, "patient00826"),
            t.tokenize(FieldKind::Alnum, "PATIENT-00826")
        );
    }

    #[test]
    fn test_tokenize_depends_on_key() {
        let a = tokenizer(PrfBackend::Blake3Keyed);
        let b = Tokenizer::new(
            Arc::new(KeyHandle::from_bytes([43u8; 32])),
            PrfBackend::Blake3Keyed,
        );
        assert_ne!(
            a.tokenize(FieldKind::Alnum, "patient00826"),
            b.tokenize(FieldKind::Alnum, "patient00826")
        );
    }

    #[test]
    fn test_empty_after_normalization() {
        let t = tokenizer(PrfBackend::Blake3Keyed);
        assert_eq!(t.tokenize(FieldKind::Alnum, "--- ///"), "");
        assert_eq!(t.tokenize(FieldKind::Digits, "abc"), "");
    }

    #[test]
    fn test_redaction_marker() {
        let t = tokenizer(PrfBackend::Blake3Keyed);
        assert_eq!(t.tokenize(FieldKind::None, "anything"), REDACTED);
    }

    #[test_case("20240115", FieldKind::Digits)]
    #[test_case("123", FieldKind::Alnum)]
    #[test_case("F", FieldKind::Alnum)]
    #[test_case("12a4", FieldKind::Alnum)]
    fn test_infer_for_text(value: &str, expected: FieldKind) {
        assert_eq!(FieldKind::infer_for_text(value), expected);
    }

    #[test]
    fn test_field_kind_serde_names() {
        assert_eq!(serde_json::to_string(&FieldKind::Alnum).unwrap(), "\"alnum\"");
        assert_eq!(serde_json::to_string(&FieldKind::None).unwrap(), "\"none\"");
        let kind: FieldKind = serde_json::from_str("\"digits\"").unwrap();
        assert_eq!(kind, FieldKind::Digits);
    }
}
