//! Bundle command implementation
//!
//! Packages a patient's latest repository object into a portable zip.

use crate::cli::commands::{load_or_report, resolve_patient_id};
use crate::domain::VaultError;
use crate::protection::orchestrator::output_stem;
use crate::store::ArtifactStore;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the bundle command
#[derive(Args, Debug)]
pub struct BundleArgs {
    /// Patient id as recorded in the repository (the pseudonym)
    pub patient_id: String,

    /// Treat the patient id as an original identifier and tokenize it with the configured key
    #[arg(long)]
    pub raw: bool,

    /// Archive path (default: <patient_id>.zip)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl BundleArgs {
    /// Execute the bundle command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let Some(config) = load_or_report(config_path) else {
            return Ok(2); // Configuration error exit code
        };
        let Some(patient_id) = resolve_patient_id(&config, &self.patient_id, self.raw)? else {
            eprintln!("--raw needs protection.key_hex to be configured");
            return Ok(2);
        };
        tracing::info!(patient_id = %patient_id, "Starting bundle command");

        let dest = self
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}.zip", output_stem(&patient_id))));
        let store = ArtifactStore::open(&config.store.root)?;

        match store.build_bundle(&patient_id, &dest) {
            Ok(object) => {
                println!("📦 Bundle written: {}", dest.display());
                println!("  Patient: {}", object.patient_id);
                println!("  Batch: {}", object.batch_id);
                println!("  Imaging hash: {}", object.imaging_hash);
                println!("  Record hash: {}", object.record_hash);
                Ok(0)
            }
            Err(VaultError::NotFound(msg)) => {
                println!("❌ {msg}");
                Ok(3)
            }
            Err(e) => {
                crate::log_error_with_context!(&e, "Bundle build failed");
                eprintln!("Bundle build failed: {e}");
                Ok(5) // Fatal error exit code
            }
        }
    }
}
