//! Validate config command implementation
//!
//! Loads and validates the configuration file and prints a summary.
//! The key itself is never printed, only its hint.

use crate::config::load_config;
use crate::protection::KeyHandle;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // load_config validates as its last step
        let config = match load_config(config_path) {
            Ok(c) => {
                println!("✅ Configuration is valid");
                c
            }
            Err(e) => {
                println!("❌ Configuration is invalid");
                println!("   Error: {e}");
                return Ok(2); // Configuration error exit code
            }
        };

        let key_status = match &config.protection.key_hex {
            Some(secret) => match KeyHandle::from_secret(secret) {
                Ok(key) => format!("configured (hint {})", key.key_hint()),
                Err(e) => {
                    println!("❌ Protection key is unusable: {e}");
                    return Ok(2);
                }
            },
            None => "not configured (a random key is generated per run)".to_string(),
        };

        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!("  Protection Key: {key_status}");
        println!("  Cipher: {}", config.protection.cipher.as_str());
        println!("  PRF: {}", config.protection.prf.as_str());
        println!("  Signature: {}", config.protection.signature.as_str());
        println!("  Workers: {}", config.protection.workers);
        let header_names: Vec<&str> = config
            .protection
            .header_fields
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        println!("  Header Fields: {header_names:?}");
        println!("  Record Columns: {:?}", config.protection.record_columns);
        println!("  Linkage Column: {}", config.protection.linkage_column);
        println!("  Repository: {}", config.store.root.display());
        println!(
            "  Require Signature: {}",
            config.verification.require_signature
        );
        println!(
            "  File Logging: {}",
            if config.logging.local_enabled {
                config.logging.local_path.as_str()
            } else {
                "disabled"
            }
        );
        println!();
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_validate_missing_file() {
        let args = ValidateArgs {};
        assert_eq!(args.execute("/nonexistent/medvault.toml").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_validate_minimal_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("medvault.toml");
        std::fs::write(&path, "[application]\nlog_level = \"info\"\n").unwrap();
        let args = ValidateArgs {};
        assert_eq!(args.execute(path.to_str().unwrap()).await.unwrap(), 0);
    }
}
