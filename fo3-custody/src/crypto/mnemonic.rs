//! Mnemonic phrase generation and seed handling

use std::fmt;

use bip39::Mnemonic;
use rand::{rngs::OsRng, RngCore};

use crate::error::{MnemonicError, WalletError};

/// Supported mnemonic strengths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MnemonicStrength {
    /// 12 words (128 bits)
    Words12,
    /// 24 words (256 bits)
    Words24,
}

impl MnemonicStrength {
    fn entropy_bytes(&self) -> usize {
        match self {
            Self::Words12 => 16,
            Self::Words24 => 32,
        }
    }
}

/// BIP39 seed bytes ("master node") from which every wallet key is derived.
///
/// Read-only for the derivation and signing code; the owner controls its
/// lifetime.
#[derive(Clone, PartialEq, Eq)]
pub struct MasterSeed(Vec<u8>);

impl MasterSeed {
    /// Seed from a mnemonic phrase and passphrase
    pub fn from_mnemonic(phrase: &str, passphrase: &str) -> Result<Self, MnemonicError> {
        mnemonic_to_seed(phrase, Some(passphrase)).map(Self)
    }

    /// Seed from hex-encoded BIP39 entropy, the form an HD wallet persists
    pub fn from_entropy_hex(seed_hex: &str, passphrase: &str) -> Result<Self, WalletError> {
        if seed_hex.is_empty() {
            return Err(WalletError::MissingSeedHex);
        }
        let entropy = hex::decode(seed_hex).map_err(|_| WalletError::MissingSeedHex)?;
        let mnemonic = Mnemonic::from_entropy(&entropy).map_err(|_| WalletError::MissingSeedHex)?;
        Ok(Self(mnemonic.to_seed(passphrase).to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for MasterSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MasterSeed").field(&"<redacted>").finish()
    }
}

/// Source of the wallet's mnemonic, backed by secure storage outside this crate
pub trait MnemonicProvider: Send + Sync {
    fn mnemonic(&self) -> Result<String, MnemonicError>;
}

/// Provider over an in-memory phrase
#[derive(Clone)]
pub struct StaticMnemonicProvider {
    phrase: String,
}

impl StaticMnemonicProvider {
    pub fn new(phrase: impl Into<String>) -> Self {
        Self { phrase: phrase.into() }
    }
}

impl MnemonicProvider for StaticMnemonicProvider {
    fn mnemonic(&self) -> Result<String, MnemonicError> {
        Ok(self.phrase.clone())
    }
}

/// Generate a new random mnemonic phrase with the specified strength
pub fn generate_mnemonic(strength: MnemonicStrength) -> Result<String, MnemonicError> {
    let mut entropy = vec![0u8; strength.entropy_bytes()];
    OsRng.fill_bytes(&mut entropy);

    let mnemonic = Mnemonic::from_entropy(&entropy).map_err(|e| MnemonicError(e.to_string()))?;

    Ok(mnemonic.to_string())
}

/// Hex-encoded entropy of a mnemonic phrase
pub fn mnemonic_to_entropy_hex(phrase: &str) -> Result<String, MnemonicError> {
    let mnemonic = Mnemonic::parse_normalized(phrase).map_err(|e| MnemonicError(e.to_string()))?;
    Ok(hex::encode(mnemonic.to_entropy()))
}

/// Generate a seed from a mnemonic phrase and optional passphrase
pub fn mnemonic_to_seed(phrase: &str, passphrase: Option<&str>) -> Result<Vec<u8>, MnemonicError> {
    let mnemonic = Mnemonic::parse_normalized(phrase).map_err(|e| MnemonicError(e.to_string()))?;

    let seed = mnemonic.to_seed(passphrase.unwrap_or(""));
    Ok(seed.to_vec())
}
