//! FO3 Custody - HD wallet derivation and delegated transaction signing
//!
//! This library maintains a hierarchical-deterministic wallet's account tree,
//! repairs it when derivations are missing or corrupted, and drives the
//! build, sign and push pipeline for self-custodied transactions. It also
//! provides the reactive cache the pipeline uses for session data.

pub mod account;
pub mod cache;
pub mod config;
pub mod crypto;
pub mod error;
pub mod transaction;

// Re-export commonly used types for convenience
pub use config::CustodyConfig;
pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
