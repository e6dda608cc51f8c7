//! Init command implementation
//!
//! Generates a starter `medvault.toml`, optionally with a fresh protection key.

use crate::protection::KeyHandle;
use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "medvault.toml")]
    pub output: String,

    /// Include the full header field table and comments
    #[arg(long)]
    pub with_examples: bool,

    /// Print a freshly generated protection key to put in MEDVAULT_PROTECTION_KEY_HEX
    #[arg(long)]
    pub generate_key: bool,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        println!("📝 Initializing MedVault configuration");
        println!();

        if Path::new(&self.output).exists() && !self.force {
            println!("❌ Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(2); // Configuration error exit code
        }

        let config_content = if self.with_examples {
            Self::generate_config_with_examples()
        } else {
            Self::generate_minimal_config()
        };

        if let Err(e) = fs::write(&self.output, config_content) {
            println!("❌ Failed to write configuration file");
            println!("   Error: {}", e);
            return Ok(5); // Fatal error exit code
        }

        println!("✅ Configuration file created: {}", self.output);
        println!();
        if self.generate_key {
            // Printed once for the operator; never logged.
            let key = KeyHandle::generate();
            println!("🔑 Generated protection key (hint {}):", key.key_hint());
            println!("   MEDVAULT_PROTECTION_KEY_HEX={}", key.to_hex());
            println!("   Store it in .env or a secret manager; it cannot be recovered.");
            println!();
        }
        println!("Next steps:");
        println!("  1. Edit {} with your settings", self.output);
        println!("  2. Set MEDVAULT_PROTECTION_KEY_HEX (64 hex characters) in .env");
        println!("  3. Validate configuration: medvault validate-config");
        println!("  4. Protect a batch: medvault protect --pairs matches.json --output out --ingest");
        println!();
        Ok(0)
    }

    /// Generate minimal configuration
    fn generate_minimal_config() -> String {
        r#"# MedVault Configuration File
# De-identification of DICOM headers and tabular records

[application]
log_level = "info"

[protection]
# key_hex is read from MEDVAULT_PROTECTION_KEY_HEX
cipher = "aes-256-gcm"
prf = "blake3"
signature = "ml-dsa-65"
workers = 4
record_columns = ["patient_id", "patient_sex", "patient_age"]
linkage_column = "patient_id"

[store]
root = "./medvault_repo"

[verification]
require_signature = false
keyed_checks = true

[logging]
local_enabled = true
local_path = "./logs"
local_rotation = "daily"
"#
        .to_string()
    }

    /// Generate configuration with examples and comments
    fn generate_config_with_examples() -> String {
        r#"# MedVault Configuration File
#
# Every value can be overridden with a MEDVAULT_<SECTION>_<KEY> environment
# variable, and ${VAR} references are substituted from the environment.

# ============================================================================
# Application Settings
# ============================================================================
[application]
# Log level (trace, debug, info, warn, error)
log_level = "info"

# ============================================================================
# Field Protection
# ============================================================================
[protection]
# 32-byte key as 64 hex characters. Leave unset here and provide it through
# MEDVAULT_PROTECTION_KEY_HEX. Without a key every run uses a random key and
# tokens are not reproducible.
# key_hex = "${MEDVAULT_KEY}"

# Field cipher: "aes-256-gcm" (authenticated) or "fallback-xor" (unauthenticated,
# flagged by verification)
cipher = "aes-256-gcm"

# Keystream for tokenization: "blake3" or "sha256"
prf = "blake3"

# Manifest signature: "ml-dsa-65" or "none"
signature = "ml-dsa-65"

# Pairs protected concurrently (1-64)
workers = 4

# Tabular columns to protect; linkage_column is sealed as a cross-source linkage key
record_columns = ["patient_id", "patient_sex", "patient_age"]
linkage_column = "patient_id"

# Imaging header elements to protect
# kind: "alnum", "digits" or "none" (replaced by REDACTED)
[[protection.header_fields]]
name = "PatientID"
tag = "0010,0020"
kind = "alnum"
linkage = true

[[protection.header_fields]]
name = "AccessionNumber"
tag = "0008,0050"
kind = "alnum"

[[protection.header_fields]]
name = "StudyDate"
tag = "0008,0020"
kind = "digits"
min_len = 6

[[protection.header_fields]]
name = "InstitutionName"
tag = "0008,0080"
kind = "alnum"

# ============================================================================
# Repository
# ============================================================================
[store]
# Holds db/index.sqlite, cas/ and batches/
root = "./medvault_repo"

# ============================================================================
# Verification
# ============================================================================
[verification]
# Report an issue when a manifest is not signed
require_signature = false

# With a configured key, open every ciphertext and compare integrity hashes
keyed_checks = true

# ============================================================================
# Logging Configuration
# ============================================================================
[logging]
# Enable local JSON file logging
local_enabled = true

# Log directory
local_path = "./logs"

# Log rotation (daily, hourly or never)
local_rotation = "daily"
"#
        .to_string()
    }
}
