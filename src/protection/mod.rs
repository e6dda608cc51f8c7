//! Field-level protection engine
//!
//! Layered bottom-up:
//!
//! - [`key`]: the process key handle
//! - [`prf`]: keyed keystream derivation
//! - [`tokenizer`]: format-preserving tokens
//! - [`cipher`]: authenticated field encryption with deterministic nonces
//! - [`field`]: token + ciphertext + hash for one value or one tabular row
//! - [`imaging`]: DICOM header replacement and the private payload
//! - [`manifest`] / [`signer`]: hash-chained, signed batch audit manifest
//! - [`orchestrator`]: batch protection over matched pairs
//!
//! # Example
//!
//! ```no_run
//! use medvault::config::ProtectionConfig;
//! use medvault::protection::{resolve_key, MatchedPairs, ProtectionEngine};
//! use std::path::Path;
//!
//! # async fn example() -> medvault::domain::Result<()> {
//! let config = ProtectionConfig::default();
//! let engine = ProtectionEngine::new(resolve_key(&config)?, &config);
//! let pairs: MatchedPairs = serde_json::from_str(r#"{"results": []}"#)?;
//! let summary = engine.protect_batch(&pairs, Path::new("./out"), None).await?;
//! println!("{} protected", summary.protected_count);
//! # Ok(())
//! # }
//! ```

pub mod checksum;
pub mod cipher;
pub mod field;
pub mod imaging;
pub mod key;
pub mod manifest;
pub mod models;
pub mod orchestrator;
pub mod prf;
pub mod signer;
pub mod tokenizer;

pub use cipher::{CipherSuite, FieldCipher};
pub use field::FieldProtector;
pub use imaging::HeaderField;
pub use key::KeyHandle;
pub use manifest::BatchAuditManifest;
pub use models::{MatchEntry, MatchedPairs, ProtectedField, ProtectedRecordBundle};
pub use orchestrator::{BatchProtectionSummary, ProtectionEngine};
pub use prf::PrfBackend;
pub use signer::ManifestSigner;
pub use tokenizer::{FieldKind, Tokenizer};

use crate::config::ProtectionConfig;
use crate::domain::Result;
use std::sync::Arc;

/// Key from configuration, or a fresh random key when none is configured
pub fn resolve_key(config: &ProtectionConfig) -> Result<Arc<KeyHandle>> {
    let key = match &config.key_hex {
        Some(secret) => KeyHandle::from_secret(secret)?,
        None => {
            let key = KeyHandle::generate();
            tracing::warn!(
                key_hint = %key.key_hint(),
                "No protection key configured; generated an ephemeral key, tokens will not be reproducible"
            );
            key
        }
    };
    Ok(Arc::new(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret_string;

    #[test]
    fn test_resolve_key_configured() {
        let config = ProtectionConfig {
            key_hex: Some(secret_string("11".repeat(32))),
            ..Default::default()
        };
        let a = resolve_key(&config).unwrap();
        let b = resolve_key(&config).unwrap();
        assert_eq!(a.key_hint(), b.key_hint());
    }

    #[test]
    fn test_resolve_key_ephemeral() {
        let config = ProtectionConfig::default();
        let a = resolve_key(&config).unwrap();
        let b = resolve_key(&config).unwrap();
        assert_ne!(a.key_hint(), b.key_hint());
    }
}
