//! Protect command implementation
//!
//! Reads a matched-pairs JSON document, protects every matched pair into an
//! output directory and optionally ingests the result into the repository.

use crate::cli::commands::load_or_report;
use crate::domain::BatchId;
use crate::protection::orchestrator::{PROTECTED_IMAGING_DIR, PROTECTED_RECORDS_DIR};
use crate::protection::{resolve_key, MatchedPairs, ProtectionEngine};
use crate::store::ArtifactStore;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the protect command
#[derive(Args, Debug)]
pub struct ProtectArgs {
    /// Matched pairs JSON (`{"results": [...]}`)
    #[arg(long)]
    pub pairs: PathBuf,

    /// Output directory for protected_dicom/ and protected_text/
    #[arg(short, long)]
    pub output: PathBuf,

    /// Batch id (default: batch_<unix seconds>)
    #[arg(long)]
    pub batch_id: Option<String>,

    /// Ingest the protected batch into the repository afterwards
    #[arg(long)]
    pub ingest: bool,
}

impl ProtectArgs {
    /// Execute the protect command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(pairs = %self.pairs.display(), "Starting protect command");

        let Some(config) = load_or_report(config_path) else {
            return Ok(2); // Configuration error exit code
        };

        let batch_id = match self.batch_id.as_deref().map(BatchId::new).transpose() {
            Ok(id) => id,
            Err(e) => {
                eprintln!("Invalid batch id: {e}");
                return Ok(2);
            }
        };

        let pairs: MatchedPairs = match std::fs::read(&self.pairs)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| serde_json::from_slice(&bytes).map_err(anyhow::Error::from))
        {
            Ok(pairs) => pairs,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read matched pairs");
                eprintln!("Failed to read matched pairs {}: {e}", self.pairs.display());
                return Ok(5); // Fatal error exit code
            }
        };

        let key = resolve_key(&config.protection)?;
        let engine = ProtectionEngine::new(key, &config.protection);

        println!("🔐 Protecting {} matched pair(s)...", pairs.matched().count());
        let summary = match engine.protect_batch(&pairs, &self.output, batch_id).await {
            Ok(s) => s,
            Err(e) => {
                crate::log_error_with_context!(&e, "Batch protection failed");
                eprintln!("Protection failed: {e}");
                return Ok(5);
            }
        };

        println!();
        println!("📊 Protection Summary:");
        println!("  Batch: {}", summary.batch_id);
        println!("  Key hint: {}", summary.key_hint);
        println!("  Protected: {}", summary.protected_count);
        println!("  Errors: {}", summary.error_count);
        println!("  Imaging output: {}", summary.output_imaging.display());
        println!("  Record output: {}", summary.output_records.display());
        println!("  Manifest: {}", summary.manifest_path.display());
        println!("  Manifest SHA-256: {}", summary.manifest_sha256);
        println!("  Signed: {}", if summary.signed { "yes" } else { "no" });
        println!();

        if !summary.errors.is_empty() {
            println!("⚠️  Errors encountered:");
            for error in &summary.errors {
                println!(
                    "  - {}: {}",
                    error.patient_id.as_deref().unwrap_or("unknown"),
                    error.message
                );
            }
            println!();
        }

        if self.ingest {
            let store = ArtifactStore::open(&config.store.root)?;
            let ingested = match store.ingest_batch(
                &self.output.join(PROTECTED_IMAGING_DIR),
                &self.output.join(PROTECTED_RECORDS_DIR),
                &summary.batch_id,
            ) {
                Ok(s) => s,
                Err(e) => {
                    crate::log_error_with_context!(&e, "Ingest after protection failed");
                    eprintln!("Ingest failed: {e}");
                    return Ok(5);
                }
            };
            println!(
                "🗄️  Ingested {} object(s) into {} ({} already present)",
                ingested.ingested,
                config.store.root.display(),
                ingested.already_present
            );
            println!();
        }

        if summary.error_count > 0 {
            println!("⚠️  Protection completed with failures");
            Ok(1) // Partial success
        } else {
            println!("✅ Protection completed successfully!");
            Ok(0)
        }
    }
}
