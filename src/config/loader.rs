//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::VaultConfig;
use crate::config::secret_string;
use crate::domain::errors::VaultError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into VaultConfig
/// 4. Applies environment variable overrides (MEDVAULT_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns an error if:
/// - File cannot be read
/// - TOML parsing fails
/// - A referenced environment variable is not set
/// - Configuration validation fails
///
/// # Examples
///
/// ```no_run
/// use medvault::config::loader::load_config;
///
/// let config = load_config("medvault.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<VaultConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(VaultError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        VaultError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    load_config_str(&contents)
}

/// Same as [`load_config`] but from TOML text
pub fn load_config_str(contents: &str) -> Result<VaultConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: VaultConfig = toml::from_str(&contents)
        .map_err(|e| VaultError::Configuration(format!("Failed to parse TOML: {}", e)))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        VaultError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("env var pattern is a valid regex")
    })
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are left untouched.
///
/// # Errors
///
/// Returns an error if a referenced environment variable is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = env_var_pattern();
    let mut result = String::new();
    let mut missing_vars = Vec::new();

    for line in input.lines() {
        let trimmed = line.trim_start();

        if trimmed.starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    let placeholder = format!("${{{}}}", var_name);
                    processed_line = processed_line.replace(&placeholder, &value);
                }
                Err(_) => {
                    if !missing_vars.contains(&var_name.to_string()) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(VaultError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| VaultError::Configuration(format!("Invalid {name} value '{value}': {e}")))
}

/// Applies environment variable overrides using the MEDVAULT_* prefix
///
/// Environment variables follow the pattern: MEDVAULT_<SECTION>_<KEY>,
/// for example MEDVAULT_PROTECTION_KEY_HEX or MEDVAULT_STORE_ROOT.
fn apply_env_overrides(config: &mut VaultConfig) -> Result<()> {
    // Application overrides
    if let Ok(val) = std::env::var("MEDVAULT_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }

    // Protection overrides
    if let Ok(val) = std::env::var("MEDVAULT_PROTECTION_KEY_HEX") {
        config.protection.key_hex = Some(secret_string(val));
    }
    if let Ok(val) = std::env::var("MEDVAULT_PROTECTION_CIPHER") {
        config.protection.cipher = parse_env("MEDVAULT_PROTECTION_CIPHER", &val)?;
    }
    if let Ok(val) = std::env::var("MEDVAULT_PROTECTION_PRF") {
        config.protection.prf = parse_env("MEDVAULT_PROTECTION_PRF", &val)?;
    }
    if let Ok(val) = std::env::var("MEDVAULT_PROTECTION_SIGNATURE") {
        config.protection.signature = parse_env("MEDVAULT_PROTECTION_SIGNATURE", &val)?;
    }
    if let Ok(val) = std::env::var("MEDVAULT_PROTECTION_WORKERS") {
        config.protection.workers = parse_env("MEDVAULT_PROTECTION_WORKERS", &val)?;
    }
    if let Ok(val) = std::env::var("MEDVAULT_PROTECTION_RECORD_COLUMNS") {
        config.protection.record_columns = val
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    // Store overrides
    if let Ok(val) = std::env::var("MEDVAULT_STORE_ROOT") {
        config.store.root = PathBuf::from(val);
    }

    // Verification overrides
    if let Ok(val) = std::env::var("MEDVAULT_VERIFICATION_REQUIRE_SIGNATURE") {
        config.verification.require_signature = val.parse().unwrap_or(false);
    }
    if let Ok(val) = std::env::var("MEDVAULT_VERIFICATION_KEYED_CHECKS") {
        config.verification.keyed_checks = val.parse().unwrap_or(true);
    }

    // Logging overrides
    if let Ok(val) = std::env::var("MEDVAULT_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = val.parse().unwrap_or(true);
    }
    if let Ok(val) = std::env::var("MEDVAULT_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }
    if let Ok(val) = std::env::var("MEDVAULT_LOGGING_LOCAL_ROTATION") {
        config.logging.local_rotation = val;
    }

    Ok(())
}
