//! Batch audit manifest
//!
//! One manifest per batch lists every processed pair in input order. Items
//! are hash-chained so that removing, reordering or editing any item breaks
//! every later link:
//!
//! ```text
//! item 0: chain_0 = SHA-256(canonical(item_0))
//! item n: chain_n = SHA-256(chain_{n-1} || canonical(item_n))
//! ```
//!
//! The manifest is written as compact JSON; those exact bytes are what gets
//! hashed and signed.

use crate::domain::{Result, VaultError};
use crate::protection::checksum::{canonical_json, sha256};
use crate::protection::models::ImagingOutcome;
use crate::protection::signer::ManifestSignature;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "audit_manifest.json";
pub const SIGNATURE_FILE: &str = "audit_manifest.sig";
pub const PUBLIC_KEY_FILE: &str = "audit_manifest.pk";

/// Record bundle reference inside a manifest item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRef {
    pub path: String,
}

/// One processed pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestItem {
    pub dicom: ImagingOutcome,
    pub text: TextRef,
    pub chain_hash: String,
}

#[derive(Serialize)]
struct ChainedBody<'a> {
    dicom: &'a ImagingOutcome,
    text: &'a TextRef,
}

/// Per-batch audit manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAuditManifest {
    pub assoc: String,
    pub key_hint: String,
    pub count: usize,
    pub created_ms: i64,
    pub items: Vec<ManifestItem>,
    /// Chain hash of the last item; absent for empty batches
    #[serde(default)]
    pub head_hash: Option<String>,
}

/// Next chain link over `prev || canonical(dicom, text)`
pub fn chain_link(prev: Option<&str>, dicom: &ImagingOutcome, text: &TextRef) -> Result<String> {
    let body = serde_json::to_value(ChainedBody { dicom, text })?;
    let mut data = match prev {
        Some(hex_hash) => hex::decode(hex_hash)
            .map_err(|e| VaultError::Validation(format!("invalid chain hash: {e}")))?,
        None => Vec::new(),
    };
    data.extend_from_slice(canonical_json(&body)?.as_bytes());
    Ok(hex::encode(sha256(&data)))
}

impl BatchAuditManifest {
    /// Assemble a manifest from `(imaging outcome, record bundle path)` pairs
    pub fn build(
        assoc: &str,
        key_hint: &str,
        entries: Vec<(ImagingOutcome, String)>,
    ) -> Result<Self> {
        let mut items = Vec::with_capacity(entries.len());
        let mut prev: Option<String> = None;
        for (dicom, path) in entries {
            let text = TextRef { path };
            let chain_hash = chain_link(prev.as_deref(), &dicom, &text)?;
            prev = Some(chain_hash.clone());
            items.push(ManifestItem {
                dicom,
                text,
                chain_hash,
            });
        }

        Ok(Self {
            assoc: assoc.to_string(),
            key_hint: key_hint.to_string(),
            count: items.len(),
            created_ms: chrono::Utc::now().timestamp_millis(),
            items,
            head_hash: prev,
        })
    }

    /// Items whose imaging object was protected
    pub fn protected_count(&self) -> usize {
        self.items.iter().filter(|i| i.dicom.is_protected()).count()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Recompute the chain; returns one message per broken link
    pub fn verify_chain(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.count != self.items.len() {
            issues.push(format!(
                "manifest count {} does not match {} items",
                self.count,
                self.items.len()
            ));
        }

        let mut prev: Option<String> = None;
        for (idx, item) in self.items.iter().enumerate() {
            match chain_link(prev.as_deref(), &item.dicom, &item.text) {
                Ok(expected) if expected == item.chain_hash => {}
                Ok(_) => issues.push(format!("manifest chain broken at item {idx}")),
                Err(e) => issues.push(format!("manifest chain error at item {idx}: {e}")),
            }
            prev = Some(item.chain_hash.clone());
        }

        if self.head_hash != prev {
            issues.push("manifest head hash does not match last item".to_string());
        }
        issues
    }
}

/// Write manifest bytes and, when present, the signature and public key
///
/// Stale signature files from an earlier run are removed when the batch is
/// written unsigned.
pub fn persist(
    dir: &Path,
    manifest_bytes: &[u8],
    signature: Option<&ManifestSignature>,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let manifest_path = dir.join(MANIFEST_FILE);
    std::fs::write(&manifest_path, manifest_bytes)?;

    let sig_path = dir.join(SIGNATURE_FILE);
    let pk_path = dir.join(PUBLIC_KEY_FILE);
    match signature {
        Some(sig) => {
            std::fs::write(&sig_path, &sig.signature)?;
            std::fs::write(&pk_path, &sig.public_key)?;
        }
        None => {
            for stale in [&sig_path, &pk_path] {
                if stale.exists() {
                    std::fs::remove_file(stale)?;
                }
            }
        }
    }
    Ok(manifest_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(msg: &str) -> ImagingOutcome {
        ImagingOutcome::Failed {
            dicom_path: None,
            error: msg.to_string(),
        }
    }

    fn sample() -> BatchAuditManifest {
        BatchAuditManifest::build(
            "batch_1",
            "0123456789abcdef",
            vec![
                (failed("a"), "a.json".to_string()),
                (failed("b"), "b.json".to_string()),
                (failed("c"), "c.json".to_string()),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_build_chains_items() {
        let m = sample();
        assert_eq!(m.count, 3);
        assert_eq!(m.head_hash.as_deref(), Some(m.items[2].chain_hash.as_str()));
        assert_ne!(m.items[0].chain_hash, m.items[1].chain_hash);
        assert!(m.verify_chain().is_empty());
        assert_eq!(m.protected_count(), 0);
    }

    #[test]
    fn test_chain_detects_edit() {
        let mut m = sample();
        m.items[1].text.path = "evil.json".to_string();
        let issues = m.verify_chain();
        assert_eq!(issues, vec!["manifest chain broken at item 1".to_string()]);
    }

    #[test]
    fn test_chain_detects_removal() {
        let mut m = sample();
        m.items.remove(0);
        let issues = m.verify_chain();
        assert!(issues.iter().any(|i| i.contains("count")));
        assert!(issues.iter().any(|i| i.contains("item 0")));
    }

    #[test]
    fn test_empty_manifest() {
        let m = BatchAuditManifest::build("b", "h", vec![]).unwrap();
        assert_eq!(m.count, 0);
        assert!(m.head_hash.is_none());
        assert!(m.verify_chain().is_empty());
    }

    #[test]
    fn test_bytes_round_trip_is_stable() {
        let m = sample();
        let bytes = m.to_bytes().unwrap();
        let back = BatchAuditManifest::from_bytes(&bytes).unwrap();
        assert_eq!(back, m);
        assert_eq!(back.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_persist_removes_stale_signature() {
        let dir = tempfile::tempdir().unwrap();
        let sig = ManifestSignature {
            signature: vec![1, 2, 3],
            public_key: vec![4, 5, 6],
        };
        persist(dir.path(), b"{}", Some(&sig)).unwrap();
        assert!(dir.path().join(SIGNATURE_FILE).exists());

        let path = persist(dir.path(), b"{}", None).unwrap();
        assert_eq!(path, dir.path().join(MANIFEST_FILE));
        assert!(!dir.path().join(SIGNATURE_FILE).exists());
        assert!(!dir.path().join(PUBLIC_KEY_FILE).exists());
    }
}
