//! Audit manifest signing
//!
//! The post-quantum signer generates a fresh ML-DSA-65 key pair per batch,
//! signs the exact manifest bytes and hands back both the signature and the
//! public key so they can be persisted next to the manifest. Verification
//! only needs those three files.

use fips204::ml_dsa_65;
use fips204::traits::{SerDes, Signer, Verifier};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Signature scheme, chosen once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ManifestSigner {
    /// ML-DSA-65 (FIPS 204)
    #[default]
    #[serde(rename = "ml-dsa-65")]
    PostQuantum,
    /// Signing disabled; manifests are written unsigned
    #[serde(rename = "none")]
    NoSigner,
}

/// Detached signature over a manifest plus the key that verifies it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestSignature {
    pub signature: Vec<u8>,
    pub public_key: Vec<u8>,
}

/// Signing could not produce a signature
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SigningUnavailable {
    #[error("manifest signing is disabled")]
    Disabled,

    #[error("signing failed: {0}")]
    Failed(String),
}

impl ManifestSigner {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManifestSigner::PostQuantum => "ml-dsa-65",
            ManifestSigner::NoSigner => "none",
        }
    }

    /// Sign `manifest` with a freshly generated key pair
    pub fn sign(&self, manifest: &[u8]) -> Result<ManifestSignature, SigningUnavailable> {
        match self {
            ManifestSigner::NoSigner => Err(SigningUnavailable::Disabled),
            ManifestSigner::PostQuantum => {
                let (pk, sk) = ml_dsa_65::try_keygen()
                    .map_err(|e| SigningUnavailable::Failed(e.to_string()))?;
                let signature = sk
                    .try_sign(manifest, &[])
                    .map_err(|e| SigningUnavailable::Failed(e.to_string()))?;
                Ok(ManifestSignature {
                    signature: signature.to_vec(),
                    public_key: pk.into_bytes().to_vec(),
                })
            }
        }
    }
}

impl FromStr for ManifestSigner {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ml-dsa-65" | "mldsa65" | "post-quantum" => Ok(ManifestSigner::PostQuantum),
            "none" | "disabled" => Ok(ManifestSigner::NoSigner),
            other => Err(format!(
                "Invalid signature scheme '{other}'. Must be one of: ml-dsa-65, none"
            )),
        }
    }
}

/// Check an ML-DSA-65 signature; any malformed input yields `false`
pub fn verify_signature(manifest: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
    let Ok(pk_bytes) = <[u8; ml_dsa_65::PK_LEN]>::try_from(public_key) else {
        return false;
    };
    let Ok(sig_bytes) = <[u8; ml_dsa_65::SIG_LEN]>::try_from(signature) else {
        return false;
    };
    match ml_dsa_65::PublicKey::try_from_bytes(pk_bytes) {
        Ok(pk) => pk.verify(manifest, &sig_bytes, &[]),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let manifest = br#"{"assoc":"batch_1","count":1}"#;
        let sig = ManifestSigner::PostQuantum.sign(manifest).unwrap();
        assert_eq!(sig.public_key.len(), ml_dsa_65::PK_LEN);
        assert!(verify_signature(manifest, &sig.signature, &sig.public_key));
    }

    #[test]
    fn test_verify_rejects_modified_manifest() {
        let sig = ManifestSigner::PostQuantum.sign(b"original").unwrap();
        assert!(!verify_signature(b"tampered", &sig.signature, &sig.public_key));
    }

    #[test]
    fn test_verify_rejects_malformed_inputs() {
        let sig = ManifestSigner::PostQuantum.sign(b"m").unwrap();
        assert!(!verify_signature(b"m", &sig.signature[1..], &sig.public_key));
        assert!(!verify_signature(b"m", &sig.signature, b"short"));
        assert!(!verify_signature(b"m", b"", b""));
    }

    #[test]
    fn test_no_signer() {
        assert_eq!(
            ManifestSigner::NoSigner.sign(b"m").unwrap_err(),
            SigningUnavailable::Disabled
        );
    }

    #[test]
    fn test_from_str_and_serde() {
        assert_eq!(
            "ml-dsa-65".parse::<ManifestSigner>().unwrap(),
            ManifestSigner::PostQuantum
        );
        assert_eq!("none".parse::<ManifestSigner>().unwrap(), ManifestSigner::NoSigner);
        assert_eq!(
            serde_json::to_string(&ManifestSigner::PostQuantum).unwrap(),
            "\"ml-dsa-65\""
        );
    }
}
