//! CLI command implementations
//!
//! Every command returns its process exit code:
//! 0 success, 1 partial success, 2 configuration error,
//! 3 verification issues found, 5 fatal error.

pub mod bundle;
pub mod init;
pub mod ingest;
pub mod protect;
pub mod reconcile;
pub mod status;
pub mod validate;
pub mod verify;

use crate::config::{load_config, VaultConfig};
use crate::protection::imaging::HeaderField;
use crate::protection::{FieldKind, KeyHandle, Tokenizer};
use crate::verification::Verifier;
use std::sync::Arc;

/// Load and validate the configuration, printing the failure if any
pub(crate) fn load_or_report(config_path: &str) -> Option<VaultConfig> {
    match load_config(config_path) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::error!(error = %e, config_path = %config_path, "Configuration load failed");
            println!("❌ Failed to load configuration file");
            println!("   Error: {e}");
            None
        }
    }
}

/// The configured key, or `None` when the configuration carries none
///
/// Unlike protection, read-side commands never fall back to an ephemeral
/// key: a random key could not reproduce any stored token.
pub(crate) fn configured_key(config: &VaultConfig) -> anyhow::Result<Option<Arc<KeyHandle>>> {
    match &config.protection.key_hex {
        Some(secret) => Ok(Some(Arc::new(KeyHandle::from_secret(secret)?))),
        None => Ok(None),
    }
}

/// Verifier for the configured header fields, keyed when a key is configured
pub(crate) fn build_verifier(config: &VaultConfig) -> anyhow::Result<Verifier> {
    let verifier = Verifier::new(
        config.protection.header_fields.clone(),
        config.verification.clone(),
    );
    Ok(match configured_key(config)? {
        Some(key) => verifier.with_key(key, config.protection.prf),
        None => verifier,
    })
}

/// Pseudonymous patient id used by the index
///
/// With `raw` set, `patient_id` is an original identifier and is tokenized
/// the way the linkage header field is; this needs the configured key.
pub(crate) fn resolve_patient_id(
    config: &VaultConfig,
    patient_id: &str,
    raw: bool,
) -> anyhow::Result<Option<String>> {
    if !raw {
        return Ok(Some(patient_id.to_string()));
    }
    let Some(key) = configured_key(config)? else {
        return Ok(None);
    };
    let kind = config
        .protection
        .header_fields
        .iter()
        .find(|f| f.linkage)
        .map(|f: &HeaderField| f.kind)
        .unwrap_or(FieldKind::Alnum);
    let tokenizer = Tokenizer::new(key, config.protection.prf);
    Ok(Some(tokenizer.tokenize(kind, patient_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret_string;

    #[test]
    fn test_resolve_patient_id_passthrough() {
        let config = VaultConfig::default();
        assert_eq!(
            resolve_patient_id(&config, "TOK1", false).unwrap(),
            Some("TOK1".to_string())
        );
    }

    #[test]
    fn test_resolve_patient_id_raw_needs_key() {
        let config = VaultConfig::default();
        assert_eq!(resolve_patient_id(&config, "patient00826", true).unwrap(), None);
    }

    #[test]
    fn test_resolve_patient_id_raw_is_deterministic() {
        let mut config = VaultConfig::default();
        config.protection.key_hex = Some(secret_string("ab".repeat(32)));
        let a = resolve_patient_id(&config, "patient00826", true).unwrap().unwrap();
        let b = resolve_patient_id(&config, "patient00826", true).unwrap().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), "PATIENT00826".len());
        assert_ne!(a, "PATIENT00826");
    }

    #[test]
    fn test_build_verifier_keyed_only_with_key() {
        let mut config = VaultConfig::default();
        assert!(!build_verifier(&config).unwrap().is_keyed());
        config.protection.key_hex = Some(secret_string("ab".repeat(32)));
        assert!(build_verifier(&config).unwrap().is_keyed());
    }
}
