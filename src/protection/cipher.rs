//! Authenticated field encryption
//!
//! Every sensitive value is sealed with associated data
//! `{"tag":..,"sop":..,"ctx":..}` binding it to its field name, owning
//! imaging object and batch context. Nonces are derived deterministically:
//!
//! - ordinary fields: `SHA-256(imaging_id | field_name)[..16]`
//! - linkage keys: `SHA-256("LINKAGE_KEY" | value | linkage_domain)[..16]`
//!
//! Linkage keys deliberately reuse the nonce for the same value across
//! sources, so the same patient identifier seals to bit-identical ciphertext
//! whether it came from the tabular record or the imaging header. That lets
//! two independently protected records be matched without decrypting either.
//! It also means equal linkage values are visibly equal in the archive; this
//! is an accepted exception to unique-nonce-per-message and is covered by
//! tests.

use crate::domain::{Result, VaultError};
use crate::protection::checksum::sha256;
use crate::protection::key::KeyHandle;
use crate::protection::prf::PrfBackend;
use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

/// Nonce length in bytes
pub const NONCE_LEN: usize = 16;

/// Prefix marking ciphertexts produced by the unauthenticated fallback
pub const FALLBACK_PREFIX: &str = "FALLBACK-";

/// Salt shared by every source when deriving linkage-key nonces
const LINKAGE_SALT: &str = "LINKAGE_KEY";

/// AES-256-GCM with a 128-bit nonce
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Field nonce
pub type FieldNonce = [u8; NONCE_LEN];

/// Field encryption strategy, chosen once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CipherSuite {
    /// AES-256-GCM, authenticated with associated data
    #[default]
    #[serde(rename = "aes-256-gcm", alias = "authenticated-aead")]
    AuthenticatedAead,
    /// PRF keystream XOR, prefixed with [`FALLBACK_PREFIX`]; confidentiality
    /// by obscurity only, never authenticated
    FallbackXor,
}

impl CipherSuite {
    /// Configuration name of this suite
    pub fn as_str(&self) -> &'static str {
        match self {
            CipherSuite::AuthenticatedAead => "aes-256-gcm",
            CipherSuite::FallbackXor => "fallback-xor",
        }
    }
}

impl FromStr for CipherSuite {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aes-256-gcm" | "aead" | "authenticated-aead" => Ok(CipherSuite::AuthenticatedAead),
            "fallback-xor" | "fallback" => Ok(CipherSuite::FallbackXor),
            other => Err(format!(
                "Invalid cipher '{other}'. Must be one of: aes-256-gcm, fallback-xor"
            )),
        }
    }
}

/// Compact associated-data document, serialized in field order tag, sop, ctx
#[derive(Debug, Serialize)]
struct AssociatedData<'a> {
    tag: &'a str,
    sop: &'a str,
    ctx: &'a str,
}

/// Build the associated-data string for a field
pub fn associated_data(tag: &str, sop: &str, ctx: &str) -> String {
    // Serializing three borrowed strings cannot fail.
    serde_json::to_string(&AssociatedData { tag, sop, ctx }).unwrap_or_default()
}

/// Nonce for an ordinary field: unique per (imaging object, field)
pub fn field_nonce(imaging_id: &str, field_name: &str) -> FieldNonce {
    truncate_nonce(&sha256(format!("{imaging_id}|{field_name}").as_bytes()))
}

/// Nonce for a linkage key: identical for equal values in the same domain
pub fn linkage_nonce(value: &str, linkage_domain: &str) -> FieldNonce {
    truncate_nonce(&sha256(
        format!("{LINKAGE_SALT}|{value}|{linkage_domain}").as_bytes(),
    ))
}

fn truncate_nonce(digest: &[u8; 32]) -> FieldNonce {
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&digest[..NONCE_LEN]);
    nonce
}

/// Whether a stored ciphertext came from the fallback path
pub fn is_fallback(ciphertext: &str) -> bool {
    ciphertext.starts_with(FALLBACK_PREFIX)
}

/// Field encryptor bound to the process key
#[derive(Debug, Clone)]
pub struct FieldCipher {
    key: Arc<KeyHandle>,
    suite: CipherSuite,
    prf: PrfBackend,
}

impl FieldCipher {
    /// Create a cipher for the given suite; `prf` drives the fallback keystream
    pub fn new(key: Arc<KeyHandle>, suite: CipherSuite, prf: PrfBackend) -> Self {
        Self { key, suite, prf }
    }

    /// Active suite
    pub fn suite(&self) -> CipherSuite {
        self.suite
    }

    /// Encrypt `plaintext`, returning base64 (fallback output carries its prefix)
    pub fn seal(&self, nonce: &FieldNonce, plaintext: &[u8], aad: &str) -> Result<String> {
        match self.suite {
            CipherSuite::AuthenticatedAead => {
                let cipher = Aes256Gcm16::new_from_slice(self.key.bytes())
                    .map_err(|e| VaultError::Key(format!("invalid AEAD key: {e}")))?;
                let ct = cipher
                    .encrypt(
                        Nonce::<U16>::from_slice(nonce),
                        Payload {
                            msg: plaintext,
                            aad: aad.as_bytes(),
                        },
                    )
                    .map_err(|_| VaultError::Protection("AEAD encryption failed".to_string()))?;
                Ok(BASE64.encode(ct))
            }
            CipherSuite::FallbackXor => {
                let x = self.xor_keystream(nonce, aad, plaintext);
                Ok(format!("{FALLBACK_PREFIX}{}", BASE64.encode(x)))
            }
        }
    }

    /// Decrypt a stored ciphertext
    ///
    /// Authenticated ciphertexts fail on any key, nonce or associated-data
    /// mismatch. Fallback ciphertexts always "decrypt"; callers must treat
    /// the result as unauthenticated.
    pub fn open(&self, nonce: &FieldNonce, ciphertext: &str, aad: &str) -> Result<Vec<u8>> {
        if let Some(body) = ciphertext.strip_prefix(FALLBACK_PREFIX) {
            let x = BASE64
                .decode(body)
                .map_err(|e| VaultError::Protection(format!("invalid base64: {e}")))?;
            return Ok(self.xor_keystream(nonce, aad, &x));
        }

        let ct = BASE64
            .decode(ciphertext)
            .map_err(|e| VaultError::Protection(format!("invalid base64: {e}")))?;
        let cipher = Aes256Gcm16::new_from_slice(self.key.bytes())
            .map_err(|e| VaultError::Key(format!("invalid AEAD key: {e}")))?;
        cipher
            .decrypt(
                Nonce::<U16>::from_slice(nonce),
                Payload {
                    msg: &ct,
                    aad: aad.as_bytes(),
                },
            )
            .map_err(|_| VaultError::Protection("AEAD authentication failed".to_string()))
    }

    fn xor_keystream(&self, nonce: &FieldNonce, aad: &str, data: &[u8]) -> Vec<u8> {
        let mut message = Vec::with_capacity(NONCE_LEN + aad.len());
        message.extend_from_slice(nonce);
        message.extend_from_slice(aad.as_bytes());
        let stream = self.prf.keystream(&self.key, &message, data.len());
        data.iter().zip(stream).map(|(a, b)| a ^ b).collect()
    }
}

/// Decode a hex nonce as stored in a protected field record
pub fn parse_nonce(nonce_hex: &str) -> Result<FieldNonce> {
    let bytes = hex::decode(nonce_hex)
        .map_err(|e| VaultError::Validation(format!("nonce is not hex: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| VaultError::Validation(format!("nonce must be {NONCE_LEN} bytes")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher(suite: CipherSuite) -> FieldCipher {
        FieldCipher::new(
            Arc::new(KeyHandle::from_bytes([9u8; 32])),
            suite,
            PrfBackend::Blake3Keyed,
        )
    }

    #[test]
    fn test_associated_data_layout() {
        assert_eq!(
            associated_data("PatientID", "1.2.3", "batch_1"),
            r#"{"tag":"PatientID","sop":"1.2.3","ctx":"batch_1"}"#
        );
    }

    #[test]
    fn test_field_nonce_differs_per_imaging_object() {
        assert_ne!(
            field_nonce("1.2.3.4", "StudyDate"),
            field_nonce("1.2.3.5", "StudyDate")
        );
        assert_eq!(
            field_nonce("1.2.3.4", "StudyDate"),
            field_nonce("1.2.3.4", "StudyDate")
        );
    }

    #[test]
    fn test_linkage_nonce_depends_on_value_only() {
        assert_eq!(
            linkage_nonce("patient00826", "patient_id"),
            linkage_nonce("patient00826", "patient_id")
        );
        assert_ne!(
            linkage_nonce("patient00826", "patient_id"),
            linkage_nonce("patient00827", "patient_id")
        );
    }

    #[test]
    fn test_aead_seal_open() {
        let c = cipher(CipherSuite::AuthenticatedAead);
        let nonce = field_nonce("1.2.3", "PatientID");
        let aad = associated_data("PatientID", "1.2.3", "b");
        let ct = c.seal(&nonce, b"secret value", &aad).unwrap();
        assert!(!is_fallback(&ct));
        assert_eq!(c.open(&nonce, &ct, &aad).unwrap(), b"secret value");
    }

    #[test]
    fn test_aead_rejects_wrong_associated_data() {
        let c = cipher(CipherSuite::AuthenticatedAead);
        let nonce = field_nonce("1.2.3", "PatientID");
        let ct = c
            .seal(&nonce, b"secret", &associated_data("PatientID", "1.2.3", "b1"))
            .unwrap();
        let err = c.open(&nonce, &ct, &associated_data("PatientID", "1.2.3", "b2"));
        assert!(err.is_err());
    }

    #[test]
    fn test_aead_rejects_wrong_key() {
        let nonce = field_nonce("1.2.3", "PatientID");
        let ct = cipher(CipherSuite::AuthenticatedAead)
            .seal(&nonce, b"secret", "ad")
            .unwrap();
        let other = FieldCipher::new(
            Arc::new(KeyHandle::from_bytes([10u8; 32])),
            CipherSuite::AuthenticatedAead,
            PrfBackend::Blake3Keyed,
        );
        assert!(other.open(&nonce, &ct, "ad").is_err());
    }

    #[test]
    fn test_fallback_is_marked_and_reversible() {
        let c = cipher(CipherSuite::FallbackXor);
        let nonce = field_nonce("1.2.3", "AccessionNumber");
        let ct = c.seal(&nonce, b"ACC-0001-LONGER-THAN-32-BYTES-OF-TEXT", "ad").unwrap();
        assert!(is_fallback(&ct));
        assert_eq!(
            c.open(&nonce, &ct, "ad").unwrap(),
            b"ACC-0001-LONGER-THAN-32-BYTES-OF-TEXT"
        );
    }

    #[test]
    fn test_parse_nonce() {
        let nonce = field_nonce("a", "b");
        assert_eq!(parse_nonce(&hex::encode(nonce)).unwrap(), nonce);
        assert!(parse_nonce("abcd").is_err());
        assert!(parse_nonce("zz").is_err());
    }

    #[test]
    fn test_cipher_suite_from_str() {
        assert_eq!(
            "aes-256-gcm".parse::<CipherSuite>().unwrap(),
            CipherSuite::AuthenticatedAead
        );
        assert_eq!("fallback".parse::<CipherSuite>().unwrap(), CipherSuite::FallbackXor);
        assert!("rot13".parse::<CipherSuite>().is_err());
    }
}
