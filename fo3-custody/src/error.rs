//! Error types for the custody core

use thiserror::Error;

/// Key derivation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DerivationError {
    #[error("Invalid derivation path: {0}")]
    InvalidPath(String),

    #[error("Invalid seed: {0}")]
    InvalidSeed(String),

    #[error("Invalid derived key: {0}")]
    InvalidKey(String),

    #[error("Unknown derivation type: {0}")]
    UnknownDerivationType(String),
}

/// Mnemonic provider and BIP39 failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Mnemonic error: {0}")]
pub struct MnemonicError(pub String);

/// HD wallet failures. Missing seed and missing wallet are fatal for the
/// current operation and are never retried by the core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("Wallet seed hex is missing or invalid")]
    MissingSeedHex,

    #[error("Wallet has no default HD wallet")]
    MissingWallet,

    #[error(transparent)]
    Derivation(#[from] DerivationError),
}

/// Error delivered by the reactive cache. Wraps the fetcher's own error and is
/// replayed to every subscriber of the failed fetch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError<E> {
    #[error("Cache fetch failed: {0}")]
    Fetch(E),
}

/// Pre-image signing failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SigningError {
    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("Invalid digest: {0}")]
    InvalidDigest(String),
}

/// Failure to resolve the caller's authentication context
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    #[error("No active session")]
    MissingSession,

    #[error("Authentication data unavailable: {0}")]
    Unavailable(String),
}

/// Failure reported by the remote transaction builder/broadcaster
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Server returned {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Payload decoding failed: {0}")]
    Decoding(String),
}

/// Delegated transaction pipeline failures, scoped to the stage that raised them
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Authentication error: {0}")]
    Authentication(#[source] CacheError<AuthenticationError>),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Signing error: {0}")]
    Signing(#[from] SigningError),
}

/// Top-level error for callers that do not care which subsystem failed
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Mnemonic(#[from] MnemonicError),

    #[error(transparent)]
    Derivation(#[from] DerivationError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for custody operations
pub type Result<T> = std::result::Result<T, Error>;
