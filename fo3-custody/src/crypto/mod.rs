//! Cryptographic primitives and operations
//!
//! This module provides mnemonic handling, key derivation, and the local
//! signing service used by the delegated transaction pipeline.

pub mod keys;
pub mod mnemonic;
pub mod signing;

pub use keys::*;
pub use mnemonic::*;
pub use signing::*;
