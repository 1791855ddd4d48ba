//! Delegated transaction functionality
//!
//! This module builds transactions through a remote builder, signs their
//! pre-images locally and pushes the result to the broadcaster.

pub mod pipeline;
pub mod provider;
pub mod types;

pub use pipeline::*;
pub use provider::*;
pub use types::*;
