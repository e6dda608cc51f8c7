//! Result type alias for MedVault

use super::errors::VaultError;

/// Result type alias for MedVault operations
///
/// ```
/// use medvault::domain::{Result, VaultError};
///
/// fn require_stem(stem: &str) -> Result<&str> {
///     if stem.is_empty() {
///         return Err(VaultError::Validation("empty file stem".to_string()));
///     }
///     Ok(stem)
/// }
/// ```
pub type Result<T> = std::result::Result<T, VaultError>;
