//! Verify commands
//!
//! `verify-bundle` checks a portable zip; `verify-object` checks a
//! repository object resolved through the index. Both exit with 3 when the
//! report carries any issue.

use crate::cli::commands::{build_verifier, load_or_report, resolve_patient_id};
use crate::store::ArtifactStore;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the verify-bundle command
#[derive(Args, Debug)]
pub struct VerifyBundleArgs {
    /// Bundle archive to verify
    pub bundle: PathBuf,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl VerifyBundleArgs {
    /// Execute the verify-bundle command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(bundle = %self.bundle.display(), "Verifying bundle");

        let Some(config) = load_or_report(config_path) else {
            return Ok(2); // Configuration error exit code
        };
        let verifier = build_verifier(&config)?;
        let report = verifier.verify_bundle(&self.bundle);

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print!("{}", report.format_summary());
        }
        Ok(if report.is_clean() { 0 } else { 3 })
    }
}

/// Arguments for the verify-object command
#[derive(Args, Debug)]
pub struct VerifyObjectArgs {
    /// Patient id as recorded in the repository (the pseudonym)
    pub patient_id: String,

    /// Treat the patient id as an original identifier and tokenize it with the configured key
    #[arg(long)]
    pub raw: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl VerifyObjectArgs {
    /// Execute the verify-object command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let Some(config) = load_or_report(config_path) else {
            return Ok(2); // Configuration error exit code
        };
        let Some(patient_id) = resolve_patient_id(&config, &self.patient_id, self.raw)? else {
            eprintln!("--raw needs protection.key_hex to be configured");
            return Ok(2);
        };
        tracing::info!(patient_id = %patient_id, "Verifying repository object");

        let store = match ArtifactStore::open(&config.store.root) {
            Ok(s) => s,
            Err(e) => {
                crate::log_error_with_context!(&e, "Failed to open repository");
                eprintln!("Failed to open repository: {e}");
                return Ok(5); // Fatal error exit code
            }
        };
        let verifier = build_verifier(&config)?;
        let report = verifier.verify_repo_object(&store, &patient_id);

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print!("{}", report.format_summary());
        }
        Ok(if report.is_clean() { 0 } else { 3 })
    }
}
