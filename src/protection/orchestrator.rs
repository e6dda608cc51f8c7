//! Batch protection
//!
//! Runs every matched pair through header and record protection, writes the
//! protected artifacts and finishes the batch with a hash-chained, optionally
//! signed audit manifest.
//!
//! ```text
//! <output>/protected_dicom/<patient>.dcm
//! <output>/protected_text/<patient>.json
//! <output>/protected_text/audit_manifest.json (+ .sig, .pk)
//! ```
//!
//! Pairs are protected on blocking worker tasks, `workers` at a time, and
//! collected in input order so the manifest order matches the match list.
//! Output stems are assigned before dispatch; a stem already taken by an
//! earlier entry gets a `-<n>` suffix, so no two workers share a file.
//! Log events and errors name a pair by its position in the match list,
//! never by its patient identifier.
//! A pair whose imaging object is missing or unreadable is recorded in the
//! manifest with an error marker and still gets its record bundle. Any
//! write failure aborts the batch; artifacts already written stay in place
//! and a re-run overwrites them.

use crate::config::ProtectionConfig;
use crate::domain::{BatchId, ItemErrorDetail, Result, VaultError};
use crate::protection::checksum::sha256_hex;
use crate::protection::cipher::FieldCipher;
use crate::protection::field::FieldProtector;
use crate::protection::imaging::{protect_imaging, HeaderField};
use crate::protection::key::KeyHandle;
use crate::protection::manifest::{self, BatchAuditManifest};
use crate::protection::models::{
    ImagingOutcome, MatchEntry, MatchedPairs, ProtectedRecordBundle, TEXT_ONLY_SOP,
};
use crate::protection::signer::{ManifestSigner, SigningUnavailable};
use crate::protection::tokenizer::Tokenizer;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Imaging output directory name
pub const PROTECTED_IMAGING_DIR: &str = "protected_dicom";

/// Record bundle output directory name
pub const PROTECTED_RECORDS_DIR: &str = "protected_text";

/// Outcome of one batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchProtectionSummary {
    pub batch_id: BatchId,
    /// Pairs whose imaging object was protected
    pub protected_count: usize,
    /// Pairs recorded with an error marker
    pub error_count: usize,
    pub errors: Vec<ItemErrorDetail>,
    pub output_imaging: PathBuf,
    pub output_records: PathBuf,
    pub key_hint: String,
    pub manifest_path: PathBuf,
    pub manifest_sha256: String,
    pub signed: bool,
}

#[derive(Debug)]
struct PairResult {
    outcome: ImagingOutcome,
    record_path: PathBuf,
    error: Option<ItemErrorDetail>,
}

/// One matched entry with its resolved identity and output stem
#[derive(Debug)]
struct PlannedPair {
    index: usize,
    patient_id: String,
    stem: String,
    entry: MatchEntry,
}

#[derive(Debug, Clone)]
struct OutputDirs {
    imaging: PathBuf,
    records: PathBuf,
}

/// Protects batches of matched imaging/tabular pairs under one key
#[derive(Debug, Clone)]
pub struct ProtectionEngine {
    protector: FieldProtector,
    header_fields: Arc<Vec<HeaderField>>,
    record_columns: Arc<Vec<String>>,
    linkage_column: String,
    signer: ManifestSigner,
    workers: usize,
    key_hint: String,
}

impl ProtectionEngine {
    /// Build an engine from configuration and an explicit key
    pub fn new(key: Arc<KeyHandle>, config: &ProtectionConfig) -> Self {
        let key_hint = key.key_hint();
        let protector = FieldProtector::new(
            Tokenizer::new(key.clone(), config.prf),
            FieldCipher::new(key, config.cipher, config.prf),
        );
        Self {
            protector,
            header_fields: Arc::new(config.header_fields.clone()),
            record_columns: Arc::new(config.record_columns.clone()),
            linkage_column: config.linkage_column.clone(),
            signer: config.signature,
            workers: config.workers.max(1),
            key_hint,
        }
    }

    pub fn key_hint(&self) -> &str {
        &self.key_hint
    }

    pub fn protector(&self) -> &FieldProtector {
        &self.protector
    }

    /// Protect every matched entry of `pairs` into `output_dir`
    ///
    /// Unmatched entries are ignored entirely. `batch_id` defaults to
    /// `batch_<unix seconds>`.
    pub async fn protect_batch(
        &self,
        pairs: &MatchedPairs,
        output_dir: &Path,
        batch_id: Option<BatchId>,
    ) -> Result<BatchProtectionSummary> {
        let started = Instant::now();
        let batch_id = batch_id.unwrap_or_else(BatchId::generate);
        let dirs = OutputDirs {
            imaging: output_dir.join(PROTECTED_IMAGING_DIR),
            records: output_dir.join(PROTECTED_RECORDS_DIR),
        };
        std::fs::create_dir_all(&dirs.imaging)?;
        std::fs::create_dir_all(&dirs.records)?;

        let planned = plan_pairs(pairs);
        crate::log_batch_start!(batch_id, planned.len());

        let results: Vec<Result<PairResult>> = stream::iter(planned.into_iter().map(|pair| {
            let engine = self.clone();
            let dirs = dirs.clone();
            let assoc = batch_id.as_str().to_string();
            async move {
                let index = pair.index;
                tokio::task::spawn_blocking(move || engine.protect_pair(&pair, &dirs, &assoc))
                    .await
                    .map_err(|e| {
                        VaultError::Other(format!("protection task for item {index} failed: {e}"))
                    })?
            }
        }))
        .buffered(self.workers)
        .collect()
        .await;

        let mut manifest_entries = Vec::with_capacity(results.len());
        let mut errors = Vec::new();
        for result in results {
            let pair = result?;
            if let Some(err) = pair.error {
                warn!(batch_id = %batch_id, error = %err, "Pair recorded with error marker");
                errors.push(err);
            }
            manifest_entries.push((pair.outcome, pair.record_path.display().to_string()));
        }

        let audit = BatchAuditManifest::build(batch_id.as_str(), &self.key_hint, manifest_entries)?;
        let bytes = audit.to_bytes()?;
        let signature = match self.signer.sign(&bytes) {
            Ok(sig) => Some(sig),
            Err(SigningUnavailable::Disabled) => {
                debug!(batch_id = %batch_id, "Manifest signing disabled");
                None
            }
            Err(e) => {
                warn!(batch_id = %batch_id, error = %e, "Manifest left unsigned");
                None
            }
        };
        let manifest_path = manifest::persist(&dirs.records, &bytes, signature.as_ref())?;

        let summary = BatchProtectionSummary {
            protected_count: audit.protected_count(),
            error_count: errors.len(),
            errors,
            output_imaging: dirs.imaging,
            output_records: dirs.records,
            key_hint: self.key_hint.clone(),
            manifest_path,
            manifest_sha256: sha256_hex(&bytes),
            signed: signature.is_some(),
            batch_id,
        };

        crate::log_batch_complete!(
            summary.batch_id,
            summary.protected_count,
            summary.error_count,
            started.elapsed()
        );
        Ok(summary)
    }

    fn protect_pair(&self, pair: &PlannedPair, dirs: &OutputDirs, assoc: &str) -> Result<PairResult> {
        let PlannedPair {
            index,
            patient_id,
            stem,
            entry,
        } = pair;
        let with_context = |e: VaultError| VaultError::Protection(format!("item {index}: {e}"));

        let source = entry.dicom_metadata.filepath.as_deref();
        let outcome = match source {
            Some(src) if src.is_file() => {
                let dst = dirs.imaging.join(format!("{stem}.dcm"));
                protect_imaging(&self.protector, &self.header_fields, src, &dst, assoc)
                    .map_err(with_context)?
            }
            _ => ImagingOutcome::Failed {
                dicom_path: source.map(|p| p.display().to_string()),
                error: "DICOM not found".to_string(),
            },
        };

        let columns = self
            .protector
            .protect_record(&entry.csv_data, &self.record_columns, &self.linkage_column, assoc)
            .map_err(with_context)?;
        let bundle = ProtectedRecordBundle {
            dicom_out: outcome.dicom_out().map(str::to_string),
            sop: outcome.sop().unwrap_or(TEXT_ONLY_SOP).to_string(),
            assoc: assoc.to_string(),
            columns: columns.tokens,
            columns_cipher: columns.ciphers,
        };
        let record_path = dirs.records.join(format!("{stem}.json"));
        let json = serde_json::to_vec(&bundle).map_err(|e| with_context(e.into()))?;
        std::fs::write(&record_path, json).map_err(|e| with_context(e.into()))?;

        let error = match &outcome {
            ImagingOutcome::Failed { dicom_path, error } => {
                let mut detail = ItemErrorDetail::new(error.clone())
                    .with_item_index(*index)
                    .with_patient_id(patient_id.as_str());
                if let Some(path) = dicom_path {
                    detail = detail.with_imaging_path(path.clone());
                }
                Some(detail)
            }
            ImagingOutcome::Protected(_) => None,
        };

        debug!(item = *index, protected = outcome.is_protected(), "Pair processed");
        Ok(PairResult {
            outcome,
            record_path,
            error,
        })
    }
}

/// Resolve patient ids and assign each matched entry a unique output stem
///
/// Stems are claimed in input order: the first entry keeps the plain stem
/// and later collisions take the lowest free `-<n>` suffix from 2 upwards.
fn plan_pairs(pairs: &MatchedPairs) -> Vec<PlannedPair> {
    let mut taken = HashSet::new();
    pairs
        .matched()
        .cloned()
        .enumerate()
        .map(|(index, entry)| {
            let patient_id = entry
                .patient_id
                .as_deref()
                .filter(|p| !p.trim().is_empty())
                .map(str::to_string)
                .unwrap_or_else(unknown_patient_id);
            let base = output_stem(&patient_id);
            let mut stem = base.clone();
            let mut n = 2;
            while !taken.insert(stem.clone()) {
                stem = format!("{base}-{n}");
                n += 1;
            }
            PlannedPair {
                index,
                patient_id,
                stem,
                entry,
            }
        })
        .collect()
}

fn unknown_patient_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("unknown_{}", &id[..8])
}

/// File stem for a patient's outputs; path separators and other unsafe
/// characters become `_`
pub fn output_stem(patient_id: &str) -> String {
    let stem: String = patient_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match stem.as_str() {
        "" | "." | ".." => unknown_patient_id(),
        _ => stem,
    }
}
