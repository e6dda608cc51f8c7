//! Configuration management for MedVault.
//!
//! MedVault uses TOML configuration files with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `MEDVAULT_<SECTION>_<KEY>` environment overrides
//! - Default values for every setting
//! - Validation on load
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use medvault::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("medvault.toml")?;
//! println!("Store root: {}", config.store.root.display());
//! println!("Cipher: {}", config.protection.cipher.as_str());
//! # Ok(())
//! # }
//! ```
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [protection]
//! key_hex = "${MEDVAULT_KEY}"
//! cipher = "aes-256-gcm"
//! prf = "blake3"
//! signature = "ml-dsa-65"
//! workers = 4
//! record_columns = ["patient_id", "patient_sex", "patient_age"]
//!
//! [[protection.header_fields]]
//! name = "PatientID"
//! tag = "0010,0020"
//! kind = "alnum"
//! linkage = true
//!
//! [store]
//! root = "./medvault_repo"
//!
//! [logging]
//! local_enabled = true
//! local_path = "./logs"
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

pub use loader::{load_config, load_config_str};
pub use schema::{
    ApplicationConfig, LoggingConfig, ProtectionConfig, StoreConfig, VaultConfig,
    VerificationConfig,
};
pub use secret::{secret_string, secret_string_opt, SecretString, SecretValue};
