//! Data structures exchanged by the protection pipeline
//!
//! JSON field names are part of the on-disk format of protected record
//! bundles, private imaging payloads and audit manifests, so the serde
//! renames here must stay stable.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Output of the upstream matching step
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchedPairs {
    #[serde(default)]
    pub results: Vec<MatchEntry>,
}

impl MatchedPairs {
    /// Entries the matcher marked as matched, in input order
    pub fn matched(&self) -> impl Iterator<Item = &MatchEntry> {
        self.results.iter().filter(|e| e.matched)
    }
}

/// One candidate imaging/tabular pair
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchEntry {
    /// Only matched entries are protected
    #[serde(default)]
    pub matched: bool,

    #[serde(default)]
    pub patient_id: Option<String>,

    #[serde(default)]
    pub dicom_metadata: DicomMetadata,

    /// Source tabular row, column name to raw value
    #[serde(default)]
    pub csv_data: Map<String, Value>,
}

/// Imaging side of a match entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DicomMetadata {
    #[serde(default)]
    pub filepath: Option<PathBuf>,

    /// Any other metadata the matcher attached; carried but not interpreted
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Render a tabular cell as text; null and empty strings are absent
pub fn cell_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    };
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Protection record for a single sensitive field
///
/// Empty source values produce a record with an empty token and every
/// cryptographic member set to `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedField {
    pub name: String,

    pub token: String,

    #[serde(rename = "cipher_b64")]
    pub ciphertext: Option<String>,

    /// Hex SHA-256 of the raw value
    pub hash: Option<String>,

    #[serde(rename = "ad")]
    pub associated_data: Option<String>,

    /// Hex-encoded 16-byte nonce
    pub nonce: Option<String>,

    #[serde(default)]
    pub is_linkage_key: bool,
}

impl ProtectedField {
    /// Record for a missing or blank value
    pub fn empty(name: impl Into<String>, is_linkage_key: bool) -> Self {
        Self {
            name: name.into(),
            token: String::new(),
            ciphertext: None,
            hash: None,
            associated_data: None,
            nonce: None,
            is_linkage_key,
        }
    }

    /// True when the source value was missing or blank
    pub fn is_empty(&self) -> bool {
        self.ciphertext.is_none()
    }
}

/// Private payload embedded in every protected imaging object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivatePayload {
    pub assoc: String,
    pub fields: Vec<ProtectedField>,
}

/// Result of protecting one imaging object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedImagingResult {
    pub dicom_in: String,
    pub dicom_out: String,
    pub sop: String,
    pub sha256_before: String,
    pub sha256_after: String,
    pub fields: Vec<ProtectedField>,
}

/// Imaging half of a manifest item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImagingOutcome {
    Protected(ProtectedImagingResult),
    Failed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dicom_path: Option<String>,
        error: String,
    },
}

impl ImagingOutcome {
    pub fn is_protected(&self) -> bool {
        matches!(self, ImagingOutcome::Protected(_))
    }

    /// Imaging object identifier, if the object was protected
    pub fn sop(&self) -> Option<&str> {
        match self {
            ImagingOutcome::Protected(result) => Some(&result.sop),
            ImagingOutcome::Failed { .. } => None,
        }
    }

    pub fn dicom_out(&self) -> Option<&str> {
        match self {
            ImagingOutcome::Protected(result) => Some(&result.dicom_out),
            ImagingOutcome::Failed { .. } => None,
        }
    }
}

/// Protected tabular row, one JSON document per matched pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedRecordBundle {
    /// Path of the protected imaging object this row belongs to
    pub dicom_out: Option<String>,

    /// Imaging object identifier, or `TEXTONLY` when there is none
    pub sop: String,

    pub assoc: String,

    /// Column name to token
    pub columns: BTreeMap<String, String>,

    /// Column name to full protection record
    pub columns_cipher: BTreeMap<String, ProtectedField>,
}

/// Placeholder imaging identifier for rows without a protected imaging object
pub const TEXT_ONLY_SOP: &str = "TEXTONLY";

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_matched_pairs_parsing() {
        let input = json!({
            "results": [
                {
                    "matched": true,
                    "patient_id": "patient00826",
                    "dicom_metadata": {"filepath": "/data/a.dcm", "modality": "CR"},
                    "csv_data": {"patient_id": "patient00826", "patient_sex": "F", "patient_age": 45}
                },
                {"matched": false}
            ]
        });
        let pairs: MatchedPairs = serde_json::from_value(input).unwrap();
        assert_eq!(pairs.results.len(), 2);

        let first = &pairs.results[0];
        assert!(first.matched);
        assert_eq!(
            first.dicom_metadata.filepath.as_deref(),
            Some(std::path::Path::new("/data/a.dcm"))
        );
        assert_eq!(first.dicom_metadata.extra["modality"], "CR");
        assert!(!pairs.results[1].matched);
        assert!(pairs.results[1].patient_id.is_none());
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&json!("F")), Some("F".to_string()));
        assert_eq!(cell_text(&json!(45)), Some("45".to_string()));
        assert_eq!(cell_text(&json!(null)), None);
        assert_eq!(cell_text(&json!("   ")), None);
    }

    #[test]
    fn test_protected_field_wire_names() {
        let field = ProtectedField::empty("PatientID", true);
        let value = serde_json::to_value(&field).unwrap();
        let obj = value.as_object().unwrap();
        for key in ["name", "token", "cipher_b64", "hash", "ad", "nonce", "is_linkage_key"] {
            assert!(obj.contains_key(key), "missing {key}");
        }
        assert!(obj["cipher_b64"].is_null());
        assert!(field.is_empty());
    }

    #[test]
    fn test_imaging_outcome_untagged() {
        let failed: ImagingOutcome =
            serde_json::from_value(json!({"error": "DICOM not found"})).unwrap();
        assert!(!failed.is_protected());
        assert_eq!(failed.sop(), None);

        let ok = ImagingOutcome::Protected(ProtectedImagingResult {
            dicom_in: "in.dcm".into(),
            dicom_out: "out.dcm".into(),
            sop: "1.2.3".into(),
            sha256_before: "a".into(),
            sha256_after: "b".into(),
            fields: vec![],
        });
        let back: ImagingOutcome =
            serde_json::from_str(&serde_json::to_string(&ok).unwrap()).unwrap();
        assert_eq!(back, ok);
        assert_eq!(back.sop(), Some("1.2.3"));
    }
}
