//! Verification of protected pairs, bundle archives and repository objects
//!
//! Verification never mutates anything and never fails: every check appends
//! to the report's issue list, and an empty list is the success signal.

pub mod report;
pub mod verify;

pub use report::{BundleReport, ObjectReport, PairReport};
pub use verify::{verify_signature, Verifier};
