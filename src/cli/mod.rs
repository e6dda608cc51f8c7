//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for MedVault using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// MedVault - DICOM and tabular record de-identification
#[derive(Parser, Debug)]
#[command(name = "medvault")]
#[command(version, about, long_about = None)]
#[command(author = "MedVault Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "medvault.toml", env = "MEDVAULT_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "MEDVAULT_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Protect matched imaging/tabular pairs into an output directory
    Protect(commands::protect::ProtectArgs),

    /// Ingest a protected batch into the repository
    Ingest(commands::ingest::IngestArgs),

    /// Package a patient's latest object into a portable bundle
    Bundle(commands::bundle::BundleArgs),

    /// Verify a bundle archive
    VerifyBundle(commands::verify::VerifyBundleArgs),

    /// Verify a repository object through the index
    VerifyObject(commands::verify::VerifyObjectArgs),

    /// Show repository statistics and recent batches
    Status(commands::status::StatusArgs),

    /// Compare CAS blobs with index references
    Reconcile(commands::reconcile::ReconcileArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}

impl Commands {
    /// Execute the command and return the process exit code
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        match self {
            Commands::Protect(args) => args.execute(config_path).await,
            Commands::Ingest(args) => args.execute(config_path).await,
            Commands::Bundle(args) => args.execute(config_path).await,
            Commands::VerifyBundle(args) => args.execute(config_path).await,
            Commands::VerifyObject(args) => args.execute(config_path).await,
            Commands::Status(args) => args.execute(config_path).await,
            Commands::Reconcile(args) => args.execute(config_path).await,
            Commands::ValidateConfig(args) => args.execute(config_path).await,
            Commands::Init(args) => args.execute().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_cli_parse_protect() {
        let cli = Cli::parse_from([
            "medvault", "protect", "--pairs", "matches.json", "--output", "out", "--ingest",
        ]);
        assert_eq!(cli.config, "medvault.toml");
        match cli.command {
            Commands::Protect(args) => {
                assert_eq!(args.pairs, PathBuf::from("matches.json"));
                assert_eq!(args.output, PathBuf::from("out"));
                assert!(args.ingest);
                assert!(args.batch_id.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_parse_with_config() {
        let cli = Cli::parse_from(["medvault", "--config", "custom.toml", "status"]);
        assert_eq!(cli.config, "custom.toml");
    }

    #[test]
    fn test_cli_parse_with_log_level() {
        let cli = Cli::parse_from(["medvault", "--log-level", "debug", "status"]);
        assert_eq!(cli.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_cli_parse_verify_commands() {
        let cli = Cli::parse_from(["medvault", "verify-bundle", "TOK1.zip", "--json"]);
        assert!(matches!(cli.command, Commands::VerifyBundle(ref a) if a.json));

        let cli = Cli::parse_from(["medvault", "verify-object", "patient00826", "--raw"]);
        assert!(matches!(cli.command, Commands::VerifyObject(ref a) if a.raw));
    }

    #[test]
    fn test_cli_parse_bundle() {
        let cli = Cli::parse_from(["medvault", "bundle", "TOK1", "-o", "b.zip"]);
        match cli.command {
            Commands::Bundle(args) => {
                assert_eq!(args.patient_id, "TOK1");
                assert_eq!(args.output, Some(PathBuf::from("b.zip")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_parse_repository_commands() {
        assert!(matches!(
            Cli::parse_from(["medvault", "ingest", "--output", "out"]).command,
            Commands::Ingest(_)
        ));
        assert!(matches!(
            Cli::parse_from(["medvault", "reconcile"]).command,
            Commands::Reconcile(_)
        ));
        assert!(matches!(
            Cli::parse_from(["medvault", "validate-config"]).command,
            Commands::ValidateConfig(_)
        ));
        assert!(matches!(
            Cli::parse_from(["medvault", "init", "--generate-key"]).command,
            Commands::Init(ref a) if a.generate_key
        ));
    }
}
