//! Verification of protected artifacts
//!
//! Checks run in three scopes: a single imaging/record pair on disk, a
//! portable bundle archive, and an object resolved through the repository
//! index. Each scope collects every problem it can find into the report and
//! keeps going; only an empty issue list means the artifact verified.

use crate::config::VerificationConfig;
use crate::protection::checksum::{sha256_file, sha256_hex};
use crate::protection::cipher::{is_fallback, parse_nonce, CipherSuite, FieldCipher};
use crate::protection::imaging::{element_text, load_payload, open_object, sop_instance_uid, HeaderField};
use crate::protection::key::KeyHandle;
use crate::protection::manifest::{BatchAuditManifest, MANIFEST_FILE, PUBLIC_KEY_FILE, SIGNATURE_FILE};
use crate::protection::models::{ImagingOutcome, PrivatePayload, ProtectedField, ProtectedRecordBundle, TEXT_ONLY_SOP};
use crate::protection::prf::PrfBackend;
use crate::protection::signer;
use crate::store::{ArtifactStore, BundleContents, IndexedObject};
use crate::verification::report::{BundleReport, ObjectReport, PairReport};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Keys every per-column cipher record must carry
const REQUIRED_CIPHER_KEYS: [&str; 3] = ["cipher_b64", "nonce", "ad"];

/// Verify a manifest signature; any failure, including a malformed key or
/// signature, yields `false`
pub fn verify_signature(manifest: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
    signer::verify_signature(manifest, signature, public_key)
}

struct ImagingFacts {
    sop: String,
    payload: Option<PrivatePayload>,
}

/// Read-only checker for protected artifacts
pub struct Verifier {
    header_fields: Vec<HeaderField>,
    keyed: Option<FieldCipher>,
    config: VerificationConfig,
}

impl Verifier {
    /// Create a verifier checking the given header elements
    pub fn new(header_fields: Vec<HeaderField>, config: VerificationConfig) -> Self {
        Self {
            header_fields,
            keyed: None,
            config,
        }
    }

    /// Enable keyed checks: every ciphertext is opened and its plaintext
    /// hash compared with the recorded integrity hash
    pub fn with_key(mut self, key: Arc<KeyHandle>, prf: PrfBackend) -> Self {
        if self.config.keyed_checks {
            self.keyed = Some(FieldCipher::new(key, CipherSuite::AuthenticatedAead, prf));
        }
        self
    }

    pub fn is_keyed(&self) -> bool {
        self.keyed.is_some()
    }

    /// Check a protected imaging object and its record bundle
    pub fn verify_pair(&self, imaging: &Path, record: &Path) -> PairReport {
        let mut report = PairReport::new(imaging.display().to_string(), record.display().to_string());
        let facts = self.check_imaging(imaging, &mut report);
        let bundle = self.check_record(record, &mut report);

        if let (Some(facts), Some(bundle)) = (&facts, &bundle) {
            cross_check(facts, bundle, &mut report.issues);
        }

        debug!(issues = report.issues.len(), "Pair verified");
        report
    }

    /// Check a bundle archive: manifest, signature, chain and the contained pair
    pub fn verify_bundle(&self, archive: &Path) -> BundleReport {
        let mut report = BundleReport::new(archive.display().to_string());
        let contents = match BundleContents::read(archive) {
            Ok(contents) => contents,
            Err(e) => {
                report.issues.push(format!("bundle unreadable: {e}"));
                return report;
            }
        };

        let (Some((imaging_name, imaging_bytes)), Some((record_name, record_bytes))) =
            (contents.imaging_entry(), contents.record_entry())
        else {
            report
                .issues
                .push("bundle does not contain an imaging object and a record bundle".to_string());
            return report;
        };

        report.has_manifest = contents.manifest().is_some();
        match contents.manifest() {
            Some(manifest) => {
                report.sig_ok = self.check_manifest(
                    manifest,
                    contents.signature(),
                    contents.public_key(),
                    &sha256_hex(imaging_bytes),
                    &mut report.issues,
                );
            }
            None => report.issues.push("bundle has no audit manifest".to_string()),
        }

        match extract_pair(imaging_name, imaging_bytes, record_name, record_bytes) {
            Ok(scratch) => {
                let mut pair = self.verify_pair(
                    &scratch.path().join(imaging_name),
                    &scratch.path().join(record_name),
                );
                pair.imaging = imaging_name.to_string();
                pair.record = record_name.to_string();
                report.pair = Some(pair);
            }
            Err(e) => report.issues.push(format!("cannot extract bundle: {e}")),
        }

        info!(
            bundle = %report.bundle,
            sig_ok = ?report.sig_ok,
            issues = report.all_issues().len(),
            "Bundle verified"
        );
        report
    }

    /// Check the latest indexed object for a patient against the CAS and its batch
    pub fn verify_repo_object(&self, store: &ArtifactStore, patient_id: &str) -> ObjectReport {
        let mut report = ObjectReport::new(patient_id);
        let object = match store.get_object_by_patient_id(patient_id) {
            Ok(Some(object)) => object,
            Ok(None) => {
                report
                    .issues
                    .push(format!("no indexed object for patient {patient_id}"));
                return report;
            }
            Err(e) => {
                report.issues.push(format!("index lookup failed: {e}"));
                return report;
            }
        };

        let imaging = check_blob(store, "imaging", &object.imaging_cas_ref, &object.imaging_hash, &mut report.issues);
        let record = check_blob(store, "record", &object.record_cas_ref, &object.record_hash, &mut report.issues);
        if let (Some(imaging), Some(record)) = (imaging, record) {
            report.pair = Some(self.verify_pair(&imaging, &record));
        }

        report.sig_ok = self.check_batch(store, &object, &mut report.issues);
        report.object = Some(object);

        info!(
            batch_id = %report.object.as_ref().map_or("", |o| o.batch_id.as_str()),
            sig_ok = ?report.sig_ok,
            issues = report.all_issues().len(),
            "Repository object verified"
        );
        report
    }

    fn check_imaging(&self, path: &Path, report: &mut PairReport) -> Option<ImagingFacts> {
        let obj = match open_object(path) {
            Ok(obj) => obj,
            Err(e) => {
                report.issues.push(format!("imaging object unreadable: {e}"));
                return None;
            }
        };

        let payload = load_payload(&obj).filter(|p| !p.fields.is_empty());
        if payload.is_none() {
            report.issues.push("missing private protection payload".to_string());
        }

        for field in &self.header_fields {
            let header = element_text(&obj, field.tag);
            if let Some(value) = &header {
                report.headers.insert(field.name.clone(), value.clone());
                if !field.token_shape_ok(value) {
                    report
                        .issues
                        .push(format!("header token shape suspicious: {}={}", field.name, value));
                }
            }

            let Some(payload) = &payload else {
                continue;
            };
            let recorded = payload.fields.iter().find(|f| f.name == field.name);
            match (header.as_deref(), recorded) {
                (Some(value), Some(r)) if !r.token.is_empty() && value != r.token => report
                    .issues
                    .push(format!("header token does not match payload: {}", field.name)),
                (Some(_), Some(r)) if r.token.is_empty() => report
                    .issues
                    .push(format!("header {} holds a value the payload records as empty", field.name)),
                (None, Some(r)) if !r.token.is_empty() => report
                    .issues
                    .push(format!("header {} missing but payload records a token", field.name)),
                (Some(_), None) => report
                    .issues
                    .push(format!("header {} not covered by protection payload", field.name)),
                _ => {}
            }
        }

        if let Some(payload) = &payload {
            for field in &payload.fields {
                self.check_field(&format!("payload field {}", field.name), field, &mut report.issues);
                report.private_fields.push(field.clone());
            }
        }

        Some(ImagingFacts {
            sop: sop_instance_uid(&obj),
            payload,
        })
    }

    fn check_record(&self, path: &Path, report: &mut PairReport) -> Option<ProtectedRecordBundle> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                report.issues.push(format!("record bundle unreadable: {e}"));
                return None;
            }
        };
        let value: Value = match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(e) => {
                report.issues.push(format!("text bundle parse error: {e}"));
                return None;
            }
        };

        match value.get("columns_cipher").and_then(Value::as_object) {
            Some(columns) => {
                for (column, record) in columns {
                    let Some(record) = record.as_object() else {
                        report
                            .issues
                            .push(format!("column {column} cipher record is not an object"));
                        continue;
                    };
                    for key in REQUIRED_CIPHER_KEYS {
                        if !record.contains_key(key) {
                            report.issues.push(format!("column {column} missing {key}"));
                        }
                    }
                }
            }
            None => report.issues.push("text bundle has no columns_cipher".to_string()),
        }

        let bundle: ProtectedRecordBundle = match serde_json::from_value(value) {
            Ok(bundle) => bundle,
            Err(e) => {
                report.issues.push(format!("text bundle parse error: {e}"));
                return None;
            }
        };

        for (column, record) in &bundle.columns_cipher {
            if bundle.columns.get(column) != Some(&record.token) {
                report
                    .issues
                    .push(format!("column {column} token does not match its cipher record"));
            }
            self.check_field(&format!("column {column}"), record, &mut report.issues);
        }
        Some(bundle)
    }

    fn check_field(&self, label: &str, field: &ProtectedField, issues: &mut Vec<String>) {
        let Some(ciphertext) = &field.ciphertext else {
            return;
        };
        if is_fallback(ciphertext) {
            issues.push(format!("{label} uses unauthenticated fallback cipher"));
        }
        let (Some(nonce), Some(ad), Some(hash)) = (&field.nonce, &field.associated_data, &field.hash) else {
            issues.push(format!("{label} has a ciphertext without nonce, ad and hash"));
            return;
        };
        let nonce = match parse_nonce(nonce) {
            Ok(nonce) => nonce,
            Err(e) => {
                issues.push(format!("{label} {e}"));
                return;
            }
        };

        let Some(cipher) = &self.keyed else {
            return;
        };
        match cipher.open(&nonce, ciphertext, ad) {
            Ok(plaintext) if sha256_hex(&plaintext) == *hash => {}
            Ok(_) => issues.push(format!("{label} integrity hash mismatch")),
            Err(_) => issues.push(format!("{label} failed authenticated decryption")),
        }
    }

    /// Signature, chain and membership checks for a batch manifest
    fn check_manifest(
        &self,
        manifest: &[u8],
        signature: Option<&[u8]>,
        public_key: Option<&[u8]>,
        imaging_sha256: &str,
        issues: &mut Vec<String>,
    ) -> Option<bool> {
        let sig_ok = match (signature, public_key) {
            (Some(sig), Some(pk)) => Some(verify_signature(manifest, sig, pk)),
            _ => None,
        };
        match sig_ok {
            Some(false) => issues.push("manifest signature invalid".to_string()),
            None if self.config.require_signature => {
                issues.push("manifest signature missing".to_string())
            }
            _ => {}
        }

        match BatchAuditManifest::from_bytes(manifest) {
            Ok(parsed) => {
                issues.extend(parsed.verify_chain());
                let listed = parsed.items.iter().any(|item| match &item.dicom {
                    ImagingOutcome::Protected(result) => result.sha256_after == imaging_sha256,
                    ImagingOutcome::Failed { .. } => false,
                });
                if !listed {
                    issues.push("imaging object not listed in manifest".to_string());
                }
            }
            Err(e) => issues.push(format!("manifest parse error: {e}")),
        }
        sig_ok
    }

    fn check_batch(&self, store: &ArtifactStore, object: &IndexedObject, issues: &mut Vec<String>) -> Option<bool> {
        let batch = match store.index().batch(&object.batch_id) {
            Ok(Some(batch)) => batch,
            Ok(None) => {
                issues.push(format!("batch {} not indexed", object.batch_id));
                return None;
            }
            Err(e) => {
                issues.push(format!("index lookup failed: {e}"));
                return None;
            }
        };

        let dir = store.batch_dir(&object.batch_id);
        let manifest = match std::fs::read(dir.join(MANIFEST_FILE)) {
            Ok(bytes) => bytes,
            Err(_) => {
                if batch.manifest_hash.is_some() {
                    issues.push(format!("batch {} manifest missing from repository", batch.id));
                } else if self.config.require_signature {
                    issues.push("manifest signature missing".to_string());
                }
                return None;
            }
        };
        if batch.manifest_hash.as_deref() != Some(sha256_hex(&manifest).as_str()) {
            issues.push(format!("batch {} manifest hash does not match index", batch.id));
        }

        let signature = std::fs::read(dir.join(SIGNATURE_FILE)).ok();
        let public_key = std::fs::read(dir.join(PUBLIC_KEY_FILE)).ok();
        self.check_manifest(
            &manifest,
            signature.as_deref(),
            public_key.as_deref(),
            &object.imaging_hash,
            issues,
        )
    }
}

/// Imaging and record must describe the same object, batch and patient
fn cross_check(facts: &ImagingFacts, bundle: &ProtectedRecordBundle, issues: &mut Vec<String>) {
    if bundle.sop != TEXT_ONLY_SOP && bundle.sop != facts.sop {
        issues.push(format!(
            "record bundle sop {} does not match imaging object {}",
            bundle.sop, facts.sop
        ));
    }

    let Some(payload) = &facts.payload else {
        return;
    };
    if payload.assoc != bundle.assoc {
        issues.push("association id differs between imaging and record".to_string());
    }

    let imaging_link = payload
        .fields
        .iter()
        .find(|f| f.is_linkage_key && f.ciphertext.is_some());
    let record_link = bundle
        .columns_cipher
        .values()
        .find(|f| f.is_linkage_key && f.ciphertext.is_some());
    if let (Some(a), Some(b)) = (imaging_link, record_link) {
        if a.ciphertext != b.ciphertext || a.nonce != b.nonce {
            issues.push("linkage ciphertext differs between imaging and record".to_string());
        }
    }
}

/// Resolve a CAS blob and re-hash it against the indexed hash
fn check_blob(
    store: &ArtifactStore,
    label: &str,
    cas_ref: &str,
    expected: &str,
    issues: &mut Vec<String>,
) -> Option<std::path::PathBuf> {
    let path = match store.blob_path(cas_ref) {
        Ok(path) => path,
        Err(e) => {
            issues.push(format!("{label} reference invalid: {e}"));
            return None;
        }
    };
    match sha256_file(&path) {
        Ok(actual) if actual == expected => Some(path),
        Ok(_) => {
            issues.push(format!("{label} blob hash does not match index"));
            Some(path)
        }
        Err(e) => {
            warn!(cas_ref = %cas_ref, "Blob missing from store");
            issues.push(format!("{label} blob missing: {e}"));
            None
        }
    }
}

fn extract_pair(
    imaging_name: &str,
    imaging: &[u8],
    record_name: &str,
    record: &[u8],
) -> std::io::Result<tempfile::TempDir> {
    let scratch = tempfile::tempdir()?;
    std::fs::write(scratch.path().join(imaging_name), imaging)?;
    std::fs::write(scratch.path().join(record_name), record)?;
    Ok(scratch)
}
