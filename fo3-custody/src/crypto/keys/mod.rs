//! Key derivation and management
//!
//! This module provides deterministic derivation of key pairs and extended
//! keys from a master seed, dispatched by curve.

pub mod ed25519;
pub mod path;
pub mod secp256k1;
mod derivation;

pub use derivation::*;
pub use path::{ChildIndex, DerivationPath};
pub use secp256k1::{ExtendedPrivateKey, ExtendedPublicKey, Network};
