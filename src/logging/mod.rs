//! Logging and observability
//!
//! Structured logging via `tracing`:
//! - human-readable console output
//! - optional JSON file output with rotation
//! - level from configuration, overridable with `RUST_LOG`
//!
//! Key material and raw field values are never logged; the 16-hex key hint
//! is the only key-derived value that may appear in events.
//!
//! # Example
//!
//! ```no_run
//! use medvault::logging::init_logging;
//! use medvault::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!(batch_id = "batch_1", "Batch started");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log the start of a protection batch
///
/// ```no_run
/// use medvault::log_batch_start;
///
/// log_batch_start!("batch_1700000000", 12);
/// ```
#[macro_export]
macro_rules! log_batch_start {
    ($batch_id:expr, $pairs:expr) => {
        tracing::info!(
            batch_id = %$batch_id,
            pairs = $pairs,
            "Starting batch protection"
        );
    };
}

/// Log the completion of a protection batch
///
/// ```no_run
/// use medvault::log_batch_complete;
/// use std::time::Duration;
///
/// log_batch_complete!("batch_1700000000", 11, 1, Duration::from_secs(3));
/// ```
#[macro_export]
macro_rules! log_batch_complete {
    ($batch_id:expr, $protected:expr, $errors:expr, $duration:expr) => {
        tracing::info!(
            batch_id = %$batch_id,
            protected = $protected,
            errors = $errors,
            duration_ms = $duration.as_millis() as u64,
            "Batch protection completed"
        );
    };
}

/// Log an error with context
///
/// ```no_run
/// use medvault::log_error_with_context;
/// use medvault::domain::VaultError;
///
/// let error = VaultError::Storage("disk full".to_string());
/// log_error_with_context!(&error, "Failed to ingest batch");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    };
}
