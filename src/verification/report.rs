//! Verification report structures
//!
//! Every report carries a flat list of issue strings. An empty list is the
//! success signal; nothing in here is ever raised as an error.

use crate::protection::ProtectedField;
use crate::store::IndexedObject;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Result of checking one protected imaging object against its record bundle
#[derive(Debug, Clone, Default, Serialize)]
pub struct PairReport {
    pub imaging: String,
    pub record: String,
    pub issues: Vec<String>,
    /// Header element name to the (tokenized) value found in the object
    pub headers: BTreeMap<String, String>,
    /// Protected field records from the private payload, as stored
    pub private_fields: Vec<ProtectedField>,
}

impl PairReport {
    pub fn new(imaging: impl Into<String>, record: impl Into<String>) -> Self {
        Self {
            imaging: imaging.into(),
            record: record.into(),
            ..Default::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Result of checking a portable bundle archive
#[derive(Debug, Clone, Serialize)]
pub struct BundleReport {
    pub verified_at: DateTime<Utc>,
    pub bundle: String,
    /// `None` when the archive lacks a manifest, signature or public key
    pub sig_ok: Option<bool>,
    pub has_manifest: bool,
    /// Archive and manifest level issues
    pub issues: Vec<String>,
    pub pair: Option<PairReport>,
}

impl BundleReport {
    pub fn new(bundle: impl Into<String>) -> Self {
        Self {
            verified_at: Utc::now(),
            bundle: bundle.into(),
            sig_ok: None,
            has_manifest: false,
            issues: Vec::new(),
            pair: None,
        }
    }

    /// Archive issues followed by pair issues
    pub fn all_issues(&self) -> Vec<String> {
        let mut all = self.issues.clone();
        if let Some(pair) = &self.pair {
            all.extend(pair.issues.iter().cloned());
        }
        all
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty() && self.pair.as_ref().map_or(true, PairReport::is_clean)
    }

    /// Format the report as a human-readable string
    pub fn format_summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str("📦 Bundle Verification Report\n");
        summary.push_str(&format!("  Bundle: {}\n", self.bundle));
        summary.push_str(&format!("  Verified at: {}\n", self.verified_at));
        summary.push_str(&format!("  Manifest present: {}\n", yes_no(self.has_manifest)));
        summary.push_str(&format!("  Signature: {}\n", signature_label(self.sig_ok)));
        if let Some(pair) = &self.pair {
            push_pair(&mut summary, pair);
        }
        push_issues(&mut summary, &self.all_issues());
        summary
    }
}

/// Result of checking one indexed repository object
#[derive(Debug, Clone, Serialize)]
pub struct ObjectReport {
    pub verified_at: DateTime<Utc>,
    pub patient_id: String,
    pub object: Option<IndexedObject>,
    pub sig_ok: Option<bool>,
    pub issues: Vec<String>,
    pub pair: Option<PairReport>,
}

impl ObjectReport {
    pub fn new(patient_id: impl Into<String>) -> Self {
        Self {
            verified_at: Utc::now(),
            patient_id: patient_id.into(),
            object: None,
            sig_ok: None,
            issues: Vec::new(),
            pair: None,
        }
    }

    pub fn all_issues(&self) -> Vec<String> {
        let mut all = self.issues.clone();
        if let Some(pair) = &self.pair {
            all.extend(pair.issues.iter().cloned());
        }
        all
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty() && self.pair.as_ref().map_or(true, PairReport::is_clean)
    }

    /// Format the report as a human-readable string
    pub fn format_summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str("🗄️  Repository Object Verification Report\n");
        summary.push_str(&format!("  Patient: {}\n", self.patient_id));
        summary.push_str(&format!("  Verified at: {}\n", self.verified_at));
        if let Some(object) = &self.object {
            summary.push_str(&format!("  Object id: {}\n", object.id));
            summary.push_str(&format!("  Batch: {}\n", object.batch_id));
            summary.push_str(&format!("  Imaging hash: {}\n", object.imaging_hash));
            summary.push_str(&format!("  Record hash: {}\n", object.record_hash));
        }
        summary.push_str(&format!("  Signature: {}\n", signature_label(self.sig_ok)));
        if let Some(pair) = &self.pair {
            push_pair(&mut summary, pair);
        }
        push_issues(&mut summary, &self.all_issues());
        summary
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn signature_label(sig_ok: Option<bool>) -> &'static str {
    match sig_ok {
        Some(true) => "✅ valid",
        Some(false) => "❌ invalid",
        None => "⏭️  not checked",
    }
}

fn push_pair(summary: &mut String, pair: &PairReport) {
    summary.push_str(&format!("  Protected fields: {}\n", pair.private_fields.len()));
    for (name, value) in &pair.headers {
        summary.push_str(&format!("     {name}: {value}\n"));
    }
}

fn push_issues(summary: &mut String, issues: &[String]) {
    if issues.is_empty() {
        summary.push_str("  ✅ No issues found\n");
        return;
    }
    summary.push_str(&format!("\n❌ Issues ({}):\n", issues.len()));
    for (i, issue) in issues.iter().enumerate() {
        summary.push_str(&format!("  {}. {}\n", i + 1, issue));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_report_clean_by_default() {
        let report = BundleReport::new("b.zip");
        assert!(report.is_clean());
        assert_eq!(report.sig_ok, None);
        assert!(report.format_summary().contains("No issues found"));
    }

    #[test]
    fn test_bundle_report_collects_pair_issues() {
        let mut report = BundleReport::new("b.zip");
        report.issues.push("manifest chain broken at item 0".to_string());
        let mut pair = PairReport::new("a.dcm", "a.json");
        pair.issues.push("missing private protection payload".to_string());
        report.pair = Some(pair);

        assert!(!report.is_clean());
        assert_eq!(report.all_issues().len(), 2);
        let summary = report.format_summary();
        assert!(summary.contains("Issues (2)"));
        assert!(summary.contains("1. manifest chain broken at item 0"));
    }

    #[test]
    fn test_signature_labels() {
        assert_eq!(signature_label(Some(true)), "✅ valid");
        assert_eq!(signature_label(Some(false)), "❌ invalid");
        assert_eq!(signature_label(None), "⏭️  not checked");
    }

    #[test]
    fn test_object_report_summary_lists_headers() {
        let mut report = ObjectReport::new("TOK1");
        let mut pair = PairReport::new("x", "y");
        pair.headers.insert("PatientID".to_string(), "TOK1".to_string());
        pair.private_fields.push(ProtectedField::empty("PatientID", true));
        report.pair = Some(pair);
        let summary = report.format_summary();
        assert!(summary.contains("PatientID: TOK1"));
        assert!(summary.contains("Protected fields: 1"));
        assert!(report.is_clean());
    }
}
