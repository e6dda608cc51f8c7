//! Domain error types
//!
//! This module defines the error hierarchy for MedVault.
//! All errors are domain-specific and don't expose third-party types.

use thiserror::Error;

/// Main MedVault error type
///
/// This is the primary error type used throughout the library.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Key material errors (malformed hex, wrong length)
    #[error("Key error: {0}")]
    Key(String),

    /// Imaging object could not be read, modified or written
    #[error("Imaging error: {0}")]
    Imaging(String),

    /// Field or batch protection errors
    #[error("Protection error: {0}")]
    Protection(String),

    /// Content-addressable store errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Relational index errors
    #[error("Index error: {0}")]
    Index(String),

    /// Bundle archive errors
    #[error("Bundle error: {0}")]
    Bundle(String),

    /// Requested object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

/// Per-item failure detail recorded in batch summaries
///
/// Carries enough context to locate the failing patient/imaging pair
/// without aborting the rest of the batch. `Display` names the item by its
/// position only, so the detail can go to logs as is.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ItemErrorDetail {
    /// Position of the pair among the matched entries
    pub item_index: Option<usize>,

    /// Patient identifier of the failing pair (as supplied by the matcher)
    pub patient_id: Option<String>,

    /// Source imaging object path, if known
    pub imaging_path: Option<String>,

    /// Error message
    pub message: String,
}

impl ItemErrorDetail {
    /// Creates a new item error detail
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            item_index: None,
            patient_id: None,
            imaging_path: None,
            message: message.into(),
        }
    }

    pub fn with_item_index(mut self, index: usize) -> Self {
        self.item_index = Some(index);
        self
    }

    /// Sets the patient identifier
    pub fn with_patient_id(mut self, patient_id: impl Into<String>) -> Self {
        self.patient_id = Some(patient_id.into());
        self
    }

    /// Sets the imaging object path
    pub fn with_imaging_path(mut self, path: impl Into<String>) -> Self {
        self.imaging_path = Some(path.into());
        self
    }
}

impl std::fmt::Display for ItemErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.item_index {
            Some(index) => write!(f, "item={index}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        VaultError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        VaultError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for VaultError {
    fn from(err: toml::de::Error) -> Self {
        VaultError::Configuration(format!("TOML parse error: {err}"))
    }
}

// Conversion from SQLite errors
impl From<rusqlite::Error> for VaultError {
    fn from(err: rusqlite::Error) -> Self {
        VaultError::Index(err.to_string())
    }
}

// Conversion from archive errors
impl From<zip::result::ZipError> for VaultError {
    fn from(err: zip::result::ZipError) -> Self {
        VaultError::Bundle(err.to_string())
    }
}
