//! Status command implementation
//!
//! Shows repository statistics, recent batches and optionally recent objects.

use crate::cli::commands::load_or_report;
use crate::store::ArtifactStore;
use clap::Args;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Number of batches (and objects) to list
    #[arg(long, default_value_t = 10)]
    pub limit: u32,

    /// Also list the most recent objects
    #[arg(long)]
    pub objects: bool,

    /// Skip this many objects before listing
    #[arg(long, default_value_t = 0)]
    pub offset: u32,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking repository status");

        println!("📊 Repository Status");
        println!();

        let Some(config) = load_or_report(config_path) else {
            return Ok(2); // Configuration error exit code
        };

        let store = match ArtifactStore::open(&config.store.root) {
            Ok(s) => s,
            Err(e) => {
                println!("❌ Failed to open repository");
                println!("   Error: {}", e);
                return Ok(5); // Fatal error exit code
            }
        };

        let stats = store.get_stats()?;
        println!("  Repository: {}", stats.repo_path.display());
        println!("  Objects: {}", stats.total_objects);
        println!("  Batches: {}", stats.total_batches);
        println!();

        let batches = store.list_batches(self.limit)?;
        if batches.is_empty() {
            println!("No batches ingested yet.");
            println!("Run 'medvault protect --ingest' or 'medvault ingest' to add one.");
            return Ok(0);
        }

        println!(
            "{:<28} {:<8} {:<8} {:<20} {:<25}",
            "Batch ID", "Count", "Signed", "Manifest", "Ingested"
        );
        println!("{}", "-".repeat(92));
        for batch in &batches {
            let manifest = batch
                .manifest_hash
                .as_deref()
                .map(|h| &h[..h.len().min(16)])
                .unwrap_or("none");
            println!(
                "{:<28} {:<8} {:<8} {:<20} {:<25}",
                batch.id,
                batch.count,
                signature_mark(batch.signature_hash.is_some()),
                manifest,
                format_ts(batch.ts_ms)
            );
        }
        println!();

        if self.objects {
            let objects = store.list_objects(self.limit, self.offset)?;
            println!(
                "{:<8} {:<24} {:<28} {:<20} {:<20}",
                "ID", "Patient", "Batch", "Imaging", "Record"
            );
            println!("{}", "-".repeat(104));
            for object in &objects {
                println!(
                    "{:<8} {:<24} {:<28} {:<20} {:<20}",
                    object.id,
                    object.patient_id,
                    object.batch_id,
                    &object.imaging_hash[..object.imaging_hash.len().min(16)],
                    &object.record_hash[..object.record_hash.len().min(16)]
                );
            }
            println!();
        }

        Ok(0)
    }
}

fn signature_mark(signed: bool) -> &'static str {
    if signed {
        "✅"
    } else {
        "-"
    }
}

fn format_ts(ts_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ts_ms)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_ts() {
        assert_eq!(format_ts(0), "1970-01-01 00:00:00");
        assert_eq!(format_ts(1_700_000_000_000), "2023-11-14 22:13:20");
    }

    #[test]
    fn test_signature_mark() {
        assert_eq!(signature_mark(true), "✅");
        assert_eq!(signature_mark(false), "-");
        assert!(signature_mark(false).is_ascii());
    }

    #[test]
    fn test_status_args_defaults() {
        let args = StatusArgs {
            limit: 10,
            objects: false,
            offset: 0,
        };
        assert_eq!(args.limit, 10);
        assert!(!args.objects);
    }
}
