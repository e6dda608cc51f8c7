//! Configuration schema types
//!
//! This module defines the configuration structure for MedVault.

use crate::config::SecretString;
use crate::protection::cipher::CipherSuite;
use crate::protection::imaging::{default_header_fields, HeaderField};
use crate::protection::prf::PrfBackend;
use crate::protection::signer::ManifestSigner;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main MedVault configuration
///
/// This is the root configuration structure that maps to the TOML file.
/// Every section is optional; an empty file yields a usable configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VaultConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Field protection settings
    #[serde(default)]
    pub protection: ProtectionConfig,

    /// Artifact store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Verification settings
    #[serde(default)]
    pub verification: VerificationConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl VaultConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.protection.validate()?;
        self.store.validate()?;
        self.verification.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

/// Field protection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectionConfig {
    /// 32-byte process key as 64 hex characters
    ///
    /// When absent a random key is generated per run, so tokens are not
    /// reproducible across runs.
    #[serde(default)]
    pub key_hex: Option<SecretString>,

    /// Field cipher (aes-256-gcm, fallback-xor)
    #[serde(default)]
    pub cipher: CipherSuite,

    /// Keystream backend (blake3, sha256)
    #[serde(default)]
    pub prf: PrfBackend,

    /// Manifest signature scheme (ml-dsa-65, none)
    #[serde(default)]
    pub signature: ManifestSigner,

    /// Number of pairs protected concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Sensitive imaging header elements
    #[serde(default = "default_header_fields")]
    pub header_fields: Vec<HeaderField>,

    /// Sensitive tabular columns
    #[serde(default = "default_record_columns")]
    pub record_columns: Vec<String>,

    /// Tabular column holding the patient linkage key
    #[serde(default = "default_linkage_column")]
    pub linkage_column: String,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            key_hex: None,
            cipher: CipherSuite::default(),
            prf: PrfBackend::default(),
            signature: ManifestSigner::default(),
            workers: default_workers(),
            header_fields: default_header_fields(),
            record_columns: default_record_columns(),
            linkage_column: default_linkage_column(),
        }
    }
}

impl ProtectionConfig {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref key) = self.key_hex {
            if !key.expose_secret().is_hex_key(crate::protection::key::KEY_LEN) {
                return Err("protection.key_hex must be 64 hexadecimal characters".to_string());
            }
        }

        if self.workers == 0 || self.workers > 64 {
            return Err(format!(
                "protection.workers must be between 1 and 64, got {}",
                self.workers
            ));
        }

        if self.header_fields.is_empty() && self.record_columns.is_empty() {
            return Err(
                "protection.header_fields and protection.record_columns cannot both be empty"
                    .to_string(),
            );
        }

        let mut names: Vec<&str> = self.header_fields.iter().map(|f| f.name.as_str()).collect();
        names.sort_unstable();
        if names.windows(2).any(|w| w[0] == w[1]) {
            return Err("protection.header_fields contains duplicate names".to_string());
        }

        if self.header_fields.iter().filter(|f| f.linkage).count() > 1 {
            return Err("at most one protection.header_fields entry may be the linkage key".to_string());
        }

        if self.linkage_column.trim().is_empty() {
            return Err("protection.linkage_column cannot be empty".to_string());
        }

        Ok(())
    }
}

/// Artifact store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store root holding `db/`, `cas/` and `batches/`
    #[serde(default = "default_store_root")]
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_store_root(),
        }
    }
}

impl StoreConfig {
    fn validate(&self) -> Result<(), String> {
        if self.root.as_os_str().is_empty() {
            return Err("store.root cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Verification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Report an issue when a manifest carries no signature
    #[serde(default)]
    pub require_signature: bool,

    /// Open each ciphertext with the configured key and compare integrity hashes
    #[serde(default = "default_true")]
    pub keyed_checks: bool,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            require_signature: false,
            keyed_checks: true,
        }
    }
}

impl VerificationConfig {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable local file logging
    #[serde(default = "default_true")]
    pub local_enabled: bool,

    /// Local log directory
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Log rotation strategy (daily, hourly, never)
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }

        if self.local_enabled && self.local_path.trim().is_empty() {
            return Err("logging.local_path cannot be empty when local logging is enabled".to_string());
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: true,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_workers() -> usize {
    4
}

fn default_record_columns() -> Vec<String> {
    vec![
        "patient_id".to_string(),
        "patient_sex".to_string(),
        "patient_age".to_string(),
    ]
}

fn default_linkage_column() -> String {
    "patient_id".to_string()
}

fn default_store_root() -> PathBuf {
    PathBuf::from("./medvault_repo")
}

fn default_local_path() -> String {
    "./logs".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret_string;

    #[test]
    fn test_application_config_validation() {
        let mut config = ApplicationConfig::default();
        assert!(config.validate().is_ok());

        config.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_protection_config_key_validation() {
        let mut config = ProtectionConfig::default();
        assert!(config.validate().is_ok());

        config.key_hex = Some(secret_string("ab".repeat(32)));
        assert!(config.validate().is_ok());

        config.key_hex = Some(secret_string("abc".to_string()));
        assert!(config.validate().is_err());

        config.key_hex = Some(secret_string("zz".repeat(32)));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_protection_config_workers() {
        let config = ProtectionConfig {
            workers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_protection_config_duplicate_fields() {
        let mut config = ProtectionConfig::default();
        let dup = config.header_fields[1].clone();
        config.header_fields.push(dup);
        assert!(config.validate().unwrap_err().contains("duplicate"));
    }

    #[test]
    fn test_protection_config_single_linkage_field() {
        let mut config = ProtectionConfig::default();
        config.header_fields[1].linkage = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_logging_config_validation() {
        let mut config = LoggingConfig::default();
        assert!(config.validate().is_ok());

        config.local_rotation = "size".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_values() {
        let config = VaultConfig::default();
        assert_eq!(config.application.log_level, "info");
        assert_eq!(config.protection.cipher, CipherSuite::AuthenticatedAead);
        assert_eq!(config.protection.prf, PrfBackend::Blake3Keyed);
        assert_eq!(config.protection.signature, ManifestSigner::PostQuantum);
        assert_eq!(config.protection.header_fields.len(), 4);
        assert_eq!(config.protection.record_columns.len(), 3);
        assert_eq!(config.store.root, PathBuf::from("./medvault_repo"));
        assert!(config.verification.keyed_checks);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: VaultConfig = toml::from_str("").unwrap();
        assert_eq!(config.protection.workers, 4);
        assert!(config.protection.key_hex.is_none());
    }

    #[test]
    fn test_strategy_names_in_toml() {
        let config: VaultConfig = toml::from_str(
            r#"
            [protection]
            cipher = "fallback-xor"
            prf = "sha256"
            signature = "none"
            "#,
        )
        .unwrap();
        assert_eq!(config.protection.cipher, CipherSuite::FallbackXor);
        assert_eq!(config.protection.prf, PrfBackend::Sha256Concat);
        assert_eq!(config.protection.signature, ManifestSigner::NoSigner);
    }
}
