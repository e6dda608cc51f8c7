//! Ingest command implementation
//!
//! Stores a protected batch output directory in the repository.

use crate::cli::commands::load_or_report;
use crate::domain::BatchId;
use crate::protection::manifest::{BatchAuditManifest, MANIFEST_FILE};
use crate::protection::orchestrator::{PROTECTED_IMAGING_DIR, PROTECTED_RECORDS_DIR};
use crate::store::ArtifactStore;
use clap::Args;
use std::path::{Path, PathBuf};

/// Arguments for the ingest command
#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Batch output directory written by `protect`
    #[arg(short, long)]
    pub output: PathBuf,

    /// Batch id (default: the association id recorded in the manifest)
    #[arg(long)]
    pub batch_id: Option<String>,
}

impl IngestArgs {
    /// Execute the ingest command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output.display(), "Starting ingest command");

        let Some(config) = load_or_report(config_path) else {
            return Ok(2); // Configuration error exit code
        };

        let records_dir = self.output.join(PROTECTED_RECORDS_DIR);
        let batch_id = match self.batch_id.clone().or_else(|| manifest_assoc(&records_dir)) {
            Some(id) => match BatchId::new(id) {
                Ok(id) => id,
                Err(e) => {
                    eprintln!("Invalid batch id: {e}");
                    return Ok(2);
                }
            },
            None => {
                eprintln!(
                    "No batch id given and no readable manifest in {}",
                    records_dir.display()
                );
                return Ok(2);
            }
        };

        let store = match ArtifactStore::open(&config.store.root) {
            Ok(s) => s,
            Err(e) => {
                crate::log_error_with_context!(&e, "Failed to open repository");
                eprintln!("Failed to open repository: {e}");
                return Ok(5); // Fatal error exit code
            }
        };

        let summary = match store.ingest_batch(
            &self.output.join(PROTECTED_IMAGING_DIR),
            &records_dir,
            &batch_id,
        ) {
            Ok(s) => s,
            Err(e) => {
                crate::log_error_with_context!(&e, "Ingest failed");
                eprintln!("Ingest failed: {e}");
                return Ok(5);
            }
        };

        println!("🗄️  Ingest Summary:");
        println!("  Batch: {}", summary.batch_id);
        println!("  Repository: {}", store.root().display());
        println!("  Ingested: {}", summary.ingested);
        println!("  Already present: {}", summary.already_present);
        println!(
            "  Manifest SHA-256: {}",
            summary.manifest_hash.as_deref().unwrap_or("none")
        );
        println!("  Signed: {}", if summary.has_signature { "yes" } else { "no" });
        if !summary.skipped_stems.is_empty() {
            println!("  ⚠️  Unpaired files skipped: {}", summary.skipped_stems.join(", "));
        }
        println!();
        Ok(0)
    }
}

fn manifest_assoc(records_dir: &Path) -> Option<String> {
    let bytes = std::fs::read(records_dir.join(MANIFEST_FILE)).ok()?;
    BatchAuditManifest::from_bytes(&bytes).ok().map(|m| m.assoc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_assoc_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(manifest_assoc(dir.path()), None);
    }

    #[test]
    fn test_manifest_assoc_read() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = BatchAuditManifest::build("batch_9", "0123456789abcdef", Vec::new()).unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), manifest.to_bytes().unwrap()).unwrap();
        assert_eq!(manifest_assoc(dir.path()), Some("batch_9".to_string()));
    }
}
