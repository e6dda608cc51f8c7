//! Reconcile command implementation
//!
//! Reports CAS blobs no index row references and index references whose
//! blob is missing. Nothing is deleted.

use crate::cli::commands::load_or_report;
use crate::store::ArtifactStore;
use clap::Args;

/// Arguments for the reconcile command
#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl ReconcileArgs {
    /// Execute the reconcile command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let Some(config) = load_or_report(config_path) else {
            return Ok(2); // Configuration error exit code
        };
        tracing::info!(root = %config.store.root.display(), "Reconciling repository");

        let store = match ArtifactStore::open(&config.store.root) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Failed to open repository: {e}");
                return Ok(5); // Fatal error exit code
            }
        };
        let report = store.reconcile()?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("🔎 Reconcile Report: {}", store.root().display());
            println!("  Orphan blobs: {}", report.orphan_blobs.len());
            for hash in &report.orphan_blobs {
                println!("     {hash}");
            }
            println!("  Missing blobs: {}", report.missing_blobs.len());
            for hash in &report.missing_blobs {
                println!("     {hash}");
            }
            if report.is_clean() {
                println!("  ✅ Repository consistent");
            }
        }
        Ok(if report.is_clean() { 0 } else { 3 })
    }
}
