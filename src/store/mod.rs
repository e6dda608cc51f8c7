//! Artifact repository
//!
//! Protected outputs are ingested into a repository directory:
//!
//! ```text
//! <root>/cas/<hh>/<rest>          content-addressed blobs
//! <root>/db/index.sqlite          object and batch index
//! <root>/batches/<batch_id>/      manifest, signature and public key copies
//! ```
//!
//! Ingest pairs `<stem>.dcm` with `<stem>.json` by file stem, stores both in
//! the CAS and records them in the index in a single transaction. Running the
//! same ingest twice leaves one batch row and no duplicate object rows.

pub mod bundle;
pub mod cas;
pub mod index;

pub use bundle::BundleContents;
pub use cas::ContentStore;
pub use index::{Index, IndexedBatch, IndexedObject};

use crate::domain::{BatchId, ContentHash, Result, VaultError};
use crate::protection::checksum::sha256_file;
use crate::protection::imaging::{element_text, open_object, sop_instance_uid};
use crate::protection::manifest::{MANIFEST_FILE, PUBLIC_KEY_FILE, SIGNATURE_FILE};
use crate::protection::orchestrator::output_stem;
use dicom_dictionary_std::tags;
use index::NewObject;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CAS_DIR: &str = "cas";
const DB_DIR: &str = "db";
const INDEX_FILE: &str = "index.sqlite";
const BATCHES_DIR: &str = "batches";

/// Outcome of one ingest
#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub batch_id: BatchId,
    /// Object rows newly written
    pub ingested: usize,
    /// Pairs already indexed for this batch
    pub already_present: usize,
    /// Stems present on only one side
    pub skipped_stems: Vec<String>,
    pub manifest_hash: Option<String>,
    pub has_signature: bool,
}

/// Repository statistics
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub total_objects: u64,
    pub total_batches: u64,
    pub repo_path: PathBuf,
}

/// Differences between the CAS and the index
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    /// Blobs no object row references
    pub orphan_blobs: Vec<String>,
    /// References whose blob is absent
    pub missing_blobs: Vec<String>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.orphan_blobs.is_empty() && self.missing_blobs.is_empty()
    }
}

/// Content-addressed artifact repository with a relational index
pub struct ArtifactStore {
    root: PathBuf,
    cas: ContentStore,
    index: Index,
}

impl ArtifactStore {
    /// Open (creating if needed) a repository at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(BATCHES_DIR))?;
        let cas = ContentStore::open(root.join(CAS_DIR))?;
        let index = Index::open(&root.join(DB_DIR).join(INDEX_FILE))?;
        debug!(root = %root.display(), "Repository opened");
        Ok(Self { root, cas, index })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cas(&self) -> &ContentStore {
        &self.cas
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Directory holding a batch's manifest copies
    pub fn batch_dir(&self, batch_id: &str) -> PathBuf {
        self.root.join(BATCHES_DIR).join(batch_id)
    }

    /// CAS location for an index reference
    pub fn blob_path(&self, cas_ref: &str) -> Result<PathBuf> {
        let hash = ContentHash::new(cas_ref).map_err(VaultError::Storage)?;
        Ok(self.cas.path_for(&hash))
    }

    /// Ingest a protected batch
    ///
    /// `imaging_dir` holds `<stem>.dcm` files and `records_dir` holds
    /// `<stem>.json` record bundles plus the batch manifest files.
    pub fn ingest_batch(
        &self,
        imaging_dir: &Path,
        records_dir: &Path,
        batch_id: &BatchId,
    ) -> Result<IngestSummary> {
        let batch_dir = self.batch_dir(batch_id.as_str());
        fs::create_dir_all(&batch_dir)?;

        let manifest_hash = copy_batch_file(records_dir, &batch_dir, MANIFEST_FILE)?;
        let signature_hash = copy_batch_file(records_dir, &batch_dir, SIGNATURE_FILE)?;
        let pubkey_hash = copy_batch_file(records_dir, &batch_dir, PUBLIC_KEY_FILE)?;
        let count = manifest_count(&batch_dir.join(MANIFEST_FILE));

        let imaging = stems_with_extension(imaging_dir, "dcm", None)?;
        let records = stems_with_extension(records_dir, "json", Some(MANIFEST_FILE))?;
        let skipped_stems: Vec<String> = imaging
            .keys()
            .filter(|s| !records.contains_key(*s))
            .chain(records.keys().filter(|s| !imaging.contains_key(*s)))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if !skipped_stems.is_empty() {
            warn!(batch_id = %batch_id, skipped = skipped_stems.len(), "Unpaired files skipped");
        }

        let ts_ms = chrono::Utc::now().timestamp_millis();
        let mut objects = Vec::new();
        for (stem, imaging_path) in &imaging {
            let Some(record_path) = records.get(stem) else {
                continue;
            };
            let (patient_id, imaging_id) = match open_object(imaging_path) {
                Ok(obj) => (
                    element_text(&obj, tags::PATIENT_ID).unwrap_or_else(|| stem.clone()),
                    sop_instance_uid(&obj),
                ),
                Err(_) => {
                    warn!(batch_id = %batch_id, "Imaging object unreadable; indexing by file stem");
                    (stem.clone(), String::new())
                }
            };
            let imaging_hash = self.cas.put_file(imaging_path)?;
            let record_hash = self.cas.put_file(record_path)?;
            objects.push(NewObject {
                imaging_id,
                patient_id,
                imaging_hash: imaging_hash.into_string(),
                record_hash: record_hash.into_string(),
                batch_id: batch_id.to_string(),
                ts_ms,
            });
        }

        let batch = IndexedBatch {
            id: batch_id.to_string(),
            manifest_hash: manifest_hash.clone(),
            signature_hash: signature_hash.clone(),
            pubkey_hash,
            count,
            ts_ms,
        };
        let outcome = self.index.record_batch(&batch, &objects)?;

        info!(
            batch_id = %batch_id,
            ingested = outcome.inserted,
            already_present = outcome.already_present,
            skipped = skipped_stems.len(),
            "Batch ingested"
        );

        Ok(IngestSummary {
            batch_id: batch_id.clone(),
            ingested: outcome.inserted,
            already_present: outcome.already_present,
            skipped_stems,
            manifest_hash,
            has_signature: signature_hash.is_some(),
        })
    }

    pub fn list_objects(&self, limit: u32, offset: u32) -> Result<Vec<IndexedObject>> {
        self.index.list_objects(limit, offset)
    }

    pub fn list_batches(&self, limit: u32) -> Result<Vec<IndexedBatch>> {
        self.index.list_batches(limit)
    }

    /// Latest object indexed for a (pseudonymous) patient id
    pub fn get_object_by_patient_id(&self, patient_id: &str) -> Result<Option<IndexedObject>> {
        self.index.latest_by_patient(patient_id)
    }

    /// Write a zip bundle for a patient's latest object to `dest`
    ///
    /// Returns [`VaultError::NotFound`] when the patient has no indexed object
    /// and a storage error when a referenced blob is absent.
    pub fn build_bundle(&self, patient_id: &str, dest: &Path) -> Result<IndexedObject> {
        let object = self
            .get_object_by_patient_id(patient_id)?
            .ok_or_else(|| VaultError::NotFound(format!("no object for patient {patient_id}")))?;

        let stem = output_stem(patient_id);
        let mut entries = vec![
            (format!("{stem}.dcm"), self.read_blob(&object.imaging_cas_ref)?),
            (format!("{stem}.json"), self.read_blob(&object.record_cas_ref)?),
        ];
        let batch_dir = self.batch_dir(&object.batch_id);
        for name in [MANIFEST_FILE, SIGNATURE_FILE, PUBLIC_KEY_FILE] {
            let path = batch_dir.join(name);
            if path.is_file() {
                entries.push((name.to_string(), fs::read(&path)?));
            }
        }

        bundle::write_bundle(dest, &entries)?;
        info!(
            patient_id = %patient_id,
            batch_id = %object.batch_id,
            dest = %dest.display(),
            "Bundle written"
        );
        Ok(object)
    }

    pub fn get_stats(&self) -> Result<StoreStats> {
        let (total_objects, total_batches) = self.index.counts()?;
        Ok(StoreStats {
            total_objects,
            total_batches,
            repo_path: self.root.clone(),
        })
    }

    /// Compare blobs on disk with references in the index
    pub fn reconcile(&self) -> Result<ReconcileReport> {
        let referenced = self.index.referenced_blobs()?;
        let stored: BTreeSet<String> = self
            .cas
            .list()?
            .into_iter()
            .map(ContentHash::into_string)
            .collect();

        let report = ReconcileReport {
            orphan_blobs: stored.difference(&referenced).cloned().collect(),
            missing_blobs: referenced.difference(&stored).cloned().collect(),
        };
        if report.is_clean() {
            info!(blobs = stored.len(), "Repository consistent");
        } else {
            warn!(
                orphans = report.orphan_blobs.len(),
                missing = report.missing_blobs.len(),
                "Repository inconsistent"
            );
        }
        Ok(report)
    }

    fn read_blob(&self, cas_ref: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(cas_ref)?;
        fs::read(&path)
            .map_err(|e| VaultError::Storage(format!("missing blob {cas_ref}: {e}")))
    }
}

/// Copy a manifest-side file into the batch directory and hash the copy;
/// a stale copy is removed when the source no longer has the file
fn copy_batch_file(src_dir: &Path, batch_dir: &Path, name: &str) -> Result<Option<String>> {
    let src = src_dir.join(name);
    let dst = batch_dir.join(name);
    if !src.is_file() {
        if dst.exists() {
            fs::remove_file(&dst)?;
        }
        return Ok(None);
    }
    fs::copy(&src, &dst)?;
    Ok(Some(sha256_file(&dst)?))
}

fn manifest_count(path: &Path) -> i64 {
    fs::read(path)
        .ok()
        .and_then(|bytes| serde_json::from_slice::<serde_json::Value>(&bytes).ok())
        .and_then(|v| v.get("count").and_then(serde_json::Value::as_i64))
        .unwrap_or(0)
}

/// `stem -> path` for files with the given extension, sorted by stem
fn stems_with_extension(
    dir: &Path,
    extension: &str,
    exclude: Option<&str>,
) -> Result<BTreeMap<String, PathBuf>> {
    let mut stems = BTreeMap::new();
    if !dir.is_dir() {
        return Ok(stems);
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        if exclude.is_some() && path.file_name().and_then(|n| n.to_str()) == exclude {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            stems.insert(stem.to_string(), path.clone());
        }
    }
    Ok(stems)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protection::imaging::fixtures::write_source_object;

    struct Batch {
        _dir: tempfile::TempDir,
        imaging: PathBuf,
        records: PathBuf,
    }

    fn batch_output(stems: &[&str], with_signature: bool) -> Batch {
        let dir = tempfile::tempdir().unwrap();
        let imaging = dir.path().join("protected_dicom");
        let records = dir.path().join("protected_text");
        fs::create_dir_all(&imaging).unwrap();
        fs::create_dir_all(&records).unwrap();
        for (i, stem) in stems.iter().enumerate() {
            write_source_object(
                &imaging.join(format!("{stem}.dcm")),
                &format!("TOK{i}"),
                &format!("1.2.3.{i}"),
            );
            fs::write(records.join(format!("{stem}.json")), format!("{{\"sop\":\"1.2.3.{i}\"}}"))
                .unwrap();
        }
        fs::write(
            records.join(MANIFEST_FILE),
            format!("{{\"count\":{}}}", stems.len()),
        )
        .unwrap();
        if with_signature {
            fs::write(records.join(SIGNATURE_FILE), b"sig").unwrap();
            fs::write(records.join(PUBLIC_KEY_FILE), b"pk").unwrap();
        }
        Batch {
            _dir: dir,
            imaging,
            records,
        }
    }

    #[test]
    fn test_ingest_indexes_pairs() {
        let repo = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(repo.path()).unwrap();
        let batch = batch_output(&["p1", "p2"], true);
        let batch_id = BatchId::new("batch_1").unwrap();

        let summary = store.ingest_batch(&batch.imaging, &batch.records, &batch_id).unwrap();
        assert_eq!(summary.ingested, 2);
        assert!(summary.has_signature);
        assert!(summary.skipped_stems.is_empty());

        let objects = store.list_objects(10, 0).unwrap();
        assert_eq!(objects.len(), 2);
        for object in &objects {
            assert!(object.patient_id.starts_with("TOK"));
            assert!(store.blob_path(&object.imaging_cas_ref).unwrap().is_file());
            assert!(store.blob_path(&object.record_cas_ref).unwrap().is_file());
        }

        let batches = store.list_batches(10).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].count, 2);
        assert_eq!(
            batches[0].manifest_hash.as_deref(),
            Some(sha256_file(&batch.records.join(MANIFEST_FILE)).unwrap().as_str())
        );
        assert!(store.batch_dir("batch_1").join(SIGNATURE_FILE).is_file());
    }

    #[test]
    fn test_ingest_twice_is_idempotent() {
        let repo = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(repo.path()).unwrap();
        let batch = batch_output(&["p1"], false);
        let batch_id = BatchId::new("batch_1").unwrap();

        store.ingest_batch(&batch.imaging, &batch.records, &batch_id).unwrap();
        let again = store.ingest_batch(&batch.imaging, &batch.records, &batch_id).unwrap();

        assert_eq!(again.ingested, 0);
        assert_eq!(again.already_present, 1);
        let stats = store.get_stats().unwrap();
        assert_eq!(stats.total_objects, 1);
        assert_eq!(stats.total_batches, 1);
    }

    #[test]
    fn test_unpaired_stems_are_skipped() {
        let repo = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(repo.path()).unwrap();
        let batch = batch_output(&["p1"], false);
        fs::write(batch.records.join("orphan.json"), b"{}").unwrap();

        let summary = store
            .ingest_batch(&batch.imaging, &batch.records, &BatchId::new("b").unwrap())
            .unwrap();
        assert_eq!(summary.ingested, 1);
        assert_eq!(summary.skipped_stems, vec!["orphan".to_string()]);
    }

    #[test]
    fn test_build_bundle() {
        let repo = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(repo.path()).unwrap();
        let batch = batch_output(&["p1"], true);
        store
            .ingest_batch(&batch.imaging, &batch.records, &BatchId::new("b").unwrap())
            .unwrap();

        let dest = repo.path().join("out").join("TOK0.zip");
        let object = store.build_bundle("TOK0", &dest).unwrap();
        let contents = BundleContents::read(&dest).unwrap();

        let (name, dcm) = contents.imaging_entry().unwrap();
        assert_eq!(name, "TOK0.dcm");
        assert_eq!(ContentHash::of_bytes(dcm).as_str(), object.imaging_hash);
        let (_, json) = contents.record_entry().unwrap();
        assert_eq!(ContentHash::of_bytes(json).as_str(), object.record_hash);
        assert!(contents.manifest().is_some());
        assert!(contents.signature().is_some());
        assert!(contents.public_key().is_some());
    }

    #[test]
    fn test_build_bundle_unknown_patient() {
        let repo = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(repo.path()).unwrap();
        let dest = repo.path().join("x.zip");
        assert!(matches!(
            store.build_bundle("nobody", &dest),
            Err(VaultError::NotFound(_))
        ));
        assert!(!dest.exists());
    }

    #[test]
    fn test_reconcile_detects_drift() {
        let repo = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(repo.path()).unwrap();
        let batch = batch_output(&["p1"], false);
        store
            .ingest_batch(&batch.imaging, &batch.records, &BatchId::new("b").unwrap())
            .unwrap();
        assert!(store.reconcile().unwrap().is_clean());

        let orphan = store.cas().put(b"stray").unwrap();
        let object = &store.list_objects(1, 0).unwrap()[0];
        fs::remove_file(store.blob_path(&object.record_cas_ref).unwrap()).unwrap();

        let report = store.reconcile().unwrap();
        assert_eq!(report.orphan_blobs, vec![orphan.into_string()]);
        assert_eq!(report.missing_blobs, vec![object.record_cas_ref.clone()]);
    }

    #[test]
    fn test_unsigned_reingest_drops_stale_signature() {
        let repo = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(repo.path()).unwrap();
        let batch_id = BatchId::new("b").unwrap();
        let signed = batch_output(&["p1"], true);
        store.ingest_batch(&signed.imaging, &signed.records, &batch_id).unwrap();

        let unsigned = batch_output(&["p1"], false);
        let summary = store
            .ingest_batch(&unsigned.imaging, &unsigned.records, &batch_id)
            .unwrap();
        assert!(!summary.has_signature);
        assert!(!store.batch_dir("b").join(SIGNATURE_FILE).exists());
        assert_eq!(store.list_batches(10).unwrap()[0].signature_hash, None);
    }
}
