//! Domain types shared across MedVault.
//!
//! - **Strongly-typed identifiers** ([`BatchId`], [`ContentHash`])
//! - **Error types** ([`VaultError`], [`ItemErrorDetail`])
//! - **Result type alias** ([`Result`])
//!
//! Identifiers use the newtype pattern so a batch id can never be passed
//! where a content hash is expected:
//!
//! ```rust
//! use medvault::domain::{BatchId, ContentHash};
//!
//! # fn example() -> Result<(), String> {
//! let batch = BatchId::new("batch_1700000000")?;
//! let hash = ContentHash::of_bytes(b"protected object");
//! assert_eq!(hash.shard().len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod ids;
pub mod result;

pub use errors::{ItemErrorDetail, VaultError};
pub use ids::{BatchId, ContentHash};
pub use result::Result;
