// MedVault - DICOM and tabular record de-identification
// Copyright (c) 2025 MedVault Contributors
// Licensed under the MIT License

use clap::Parser;
use medvault::cli::Cli;
use medvault::config::{load_config, LoggingConfig};
use medvault::logging::init_logging;
use std::process;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Logging follows the config file when it loads; commands report a bad
    // config themselves, so fall back to console-only output here.
    let (config_level, logging_config) = match load_config(&cli.config) {
        Ok(config) => (Some(config.application.log_level), config.logging),
        Err(_) => (
            None,
            LoggingConfig {
                local_enabled: false,
                ..LoggingConfig::default()
            },
        ),
    };
    let log_level = cli
        .log_level
        .clone()
        .or(config_level)
        .unwrap_or_else(|| "info".to_string());

    let guard = match init_logging(&log_level, &logging_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(5);
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "MedVault - DICOM and tabular record de-identification"
    );

    let exit_code = match cli.command.execute(&cli.config).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command execution failed");
            eprintln!("Error: {e}");
            5 // Fatal error exit code
        }
    };

    // Flush the file appender before exiting
    drop(guard);
    process::exit(exit_code);
}
