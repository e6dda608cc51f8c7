// MedVault - DICOM and tabular record de-identification
// Copyright (c) 2025 MedVault Contributors
// Licensed under the MIT License

//! # MedVault
//!
//! MedVault pseudonymizes identifying fields in DICOM headers and tabular
//! records, keeps a reversible encrypted copy of every protected value, and
//! stores the results in a content-addressed repository with an audit trail.
//!
//! ## Architecture
//!
//! - [`protection`] - Tokenizer, field cipher, DICOM header rewrite, manifest and signing
//! - [`store`] - Content-addressable store, SQLite index and zip bundles
//! - [`verification`] - Integrity checks over output pairs, bundles and repository objects
//! - [`cli`] - Command-line interface and argument parsing
//! - [`domain`] - Shared identifiers and the [`domain::VaultError`] type
//! - [`config`] - TOML configuration with environment overrides
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use medvault::config::load_config;
//! use medvault::domain::BatchId;
//! use medvault::protection::{resolve_key, MatchedPairs, ProtectionEngine};
//! use medvault::store::ArtifactStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("medvault.toml")?;
//!     let key = resolve_key(&config.protection)?;
//!     let engine = ProtectionEngine::new(key, &config.protection);
//!
//!     let pairs: MatchedPairs =
//!         serde_json::from_str(&std::fs::read_to_string("matches.json")?)?;
//!     let batch_id = BatchId::generate();
//!     let summary = engine
//!         .protect_batch(&pairs, "out".as_ref(), Some(batch_id.clone()))
//!         .await?;
//!     println!("Protected {} pairs", summary.protected_count);
//!
//!     let store = ArtifactStore::open(&config.store.root)?;
//!     store.ingest_batch(
//!         "out/protected_dicom".as_ref(),
//!         "out/protected_text".as_ref(),
//!         &batch_id,
//!     )?;
//!     Ok(())
//! }
//! ```
//!
//! ## Key handling
//!
//! The key is threaded explicitly as an `Arc<KeyHandle>`. Only the 16-hex
//! key hint ever reaches logs, manifests or reports.

pub mod cli;
pub mod config;
pub mod domain;
pub mod logging;
pub mod protection;
pub mod store;
pub mod verification;
