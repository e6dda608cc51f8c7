//! Keyed pseudorandom function
//!
//! Derives deterministic keystream bytes from `(key, message)`. Two backends
//! are available and one is selected at startup:
//!
//! - [`PrfBackend::Blake3Keyed`]: BLAKE3 in keyed mode with extendable output,
//!   producing exactly as many bytes as requested.
//! - [`PrfBackend::Sha256Concat`]: `SHA-256(key || message)`, repeated
//!   cyclically to the requested length.
//!
//! Neither backend can fail, and both are pure functions of their inputs.

use crate::protection::checksum::sha256;
use crate::protection::key::KeyHandle;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Keystream derivation backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PrfBackend {
    /// BLAKE3 keyed hash, XOF output
    #[default]
    #[serde(alias = "blake3")]
    Blake3Keyed,
    /// SHA-256 over key || message
    #[serde(alias = "sha256")]
    Sha256Concat,
}

impl PrfBackend {
    /// Derive `len` pseudorandom bytes for `message` under `key`
    pub fn keystream(&self, key: &KeyHandle, message: &[u8], len: usize) -> Vec<u8> {
        match self {
            PrfBackend::Blake3Keyed => {
                let mut hasher = blake3::Hasher::new_keyed(key.bytes());
                hasher.update(message);
                let mut out = vec![0u8; len];
                hasher.finalize_xof().fill(&mut out);
                out
            }
            PrfBackend::Sha256Concat => {
                let mut input = Vec::with_capacity(key.bytes().len() + message.len());
                input.extend_from_slice(key.bytes());
                input.extend_from_slice(message);
                let digest = sha256(&input);
                digest.iter().copied().cycle().take(len).collect()
            }
        }
    }

    /// Configuration name of this backend
    pub fn as_str(&self) -> &'static str {
        match self {
            PrfBackend::Blake3Keyed => "blake3-keyed",
            PrfBackend::Sha256Concat => "sha256-concat",
        }
    }
}

impl FromStr for PrfBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "blake3" | "blake3-keyed" => Ok(PrfBackend::Blake3Keyed),
            "sha256" | "sha256-concat" => Ok(PrfBackend::Sha256Concat),
            other => Err(format!(
                "Invalid PRF backend '{other}'. Must be one of: blake3-keyed, sha256-concat"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> KeyHandle {
        KeyHandle::from_bytes([7u8; 32])
    }

    #[test]
    fn test_blake3_deterministic_and_sized() {
        let a = PrfBackend::Blake3Keyed.keystream(&key(), b"PATIENT00826", 100);
        let b = PrfBackend::Blake3Keyed.keystream(&key(), b"PATIENT00826", 100);
        assert_eq!(a.len(), 100);
        assert_eq!(a, b);
    }

    #[test]
    fn test_blake3_prefix_stable() {
        let short = PrfBackend::Blake3Keyed.keystream(&key(), b"msg", 8);
        let long = PrfBackend::Blake3Keyed.keystream(&key(), b"msg", 64);
        assert_eq!(short[..], long[..8]);
    }

    #[test]
    fn test_sha256_cycles_past_digest_length() {
        let out = PrfBackend::Sha256Concat.keystream(&key(), b"msg", 70);
        assert_eq!(out.len(), 70);
        assert_eq!(out[..32], out[32..64]);
        assert_eq!(out[..6], out[64..70]);
    }

    #[test]
    fn test_backends_depend_on_key_and_message() {
        for backend in [PrfBackend::Blake3Keyed, PrfBackend::Sha256Concat] {
            let other_key = KeyHandle::from_bytes([8u8; 32]);
            let base = backend.keystream(&key(), b"a", 32);
            assert_ne!(base, backend.keystream(&other_key, b"a", 32));
            assert_ne!(base, backend.keystream(&key(), b"b", 32));
        }
    }

    #[test]
    fn test_from_str() {
        assert_eq!("blake3".parse::<PrfBackend>().unwrap(), PrfBackend::Blake3Keyed);
        assert_eq!("SHA256".parse::<PrfBackend>().unwrap(), PrfBackend::Sha256Concat);
        assert!("md5".parse::<PrfBackend>().is_err());
    }
}
