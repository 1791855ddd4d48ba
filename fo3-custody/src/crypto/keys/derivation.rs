//! Common key derivation functionality

use std::fmt;

use serde::{Deserialize, Serialize};

use super::path::DerivationPath;
use crate::error::DerivationError;

/// Supported curves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Curve {
    /// BIP32 over secp256k1 (Bitcoin, EVM, Stacks, ...)
    Secp256k1,
    /// SLIP-10 over ed25519 (Solana, ...)
    Ed25519,
}

/// A private key for a specific curve
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    /// The raw private key bytes
    bytes: Vec<u8>,
    curve: Curve,
}

impl PrivateKey {
    pub fn new(bytes: Vec<u8>, curve: Curve) -> Self {
        Self { bytes, curve }
    }

    /// Get the raw private key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn curve(&self) -> Curve {
        self.curve
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("curve", &self.curve)
            .field("bytes", &"<redacted>")
            .finish()
    }
}

/// A public key for a specific curve
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    /// Compressed SEC1 bytes for secp256k1, raw 32 bytes for ed25519
    bytes: Vec<u8>,
    curve: Curve,
}

impl PublicKey {
    pub fn new(bytes: Vec<u8>, curve: Curve) -> Self {
        Self { bytes, curve }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn curve(&self) -> Curve {
        self.curve
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

/// A key pair on a single curve
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    private_key: PrivateKey,
    public_key: PublicKey,
}

impl KeyPair {
    /// Create a new key pair
    pub fn new(private_key: PrivateKey, public_key: PublicKey) -> Result<Self, DerivationError> {
        if private_key.curve() != public_key.curve() {
            return Err(DerivationError::InvalidKey("Key curve mismatch".to_string()));
        }
        Ok(Self { private_key, public_key })
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn curve(&self) -> Curve {
        self.private_key.curve()
    }
}

/// Derive a key pair from a seed for a specific curve.
///
/// Pure and deterministic: the same seed, path and curve always yield the
/// same key pair.
pub fn derive_key_pair(seed: &[u8], path: &DerivationPath, curve: Curve) -> Result<KeyPair, DerivationError> {
    match curve {
        Curve::Secp256k1 => super::secp256k1::derive_secp256k1_key_pair(seed, path),
        Curve::Ed25519 => super::ed25519::derive_ed25519_key_pair(seed, path),
    }
}

/// Convenience wrapper that parses the path first
pub fn derive(seed: &[u8], path: &str, curve: Curve) -> Result<KeyPair, DerivationError> {
    let path: DerivationPath = path.parse()?;
    derive_key_pair(seed, &path, curve)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::mnemonic::mnemonic_to_seed;

    const ABANDON: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_stacks_regression_vector() {
        let seed = mnemonic_to_seed(ABANDON, None).unwrap();
        let key_pair = derive(&seed, "m/44'/5757'/0'/0/0", Curve::Secp256k1).unwrap();

        assert_eq!(
            key_pair.public_key().to_hex(),
            "03d5d038bce81b3965314dba54f636f093c7dbdd6617cded013a53474fbccb100c"
        );
        assert_eq!(
            hex::encode(key_pair.private_key().as_bytes()),
            "47382d0211f3bbb11812b5e60b696a93d7ad0a91cdeb2162f7d69d4adef48b5d"
        );
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let seed = mnemonic_to_seed(ABANDON, None).unwrap();
        for curve in [Curve::Secp256k1, Curve::Ed25519] {
            let first = derive(&seed, "m/44'/501'/0'/0'", curve).unwrap();
            let second = derive(&seed, "m/44'/501'/0'/0'", curve).unwrap();
            assert_eq!(first, second);
            assert_eq!(first.curve(), curve);
        }
    }

    #[test]
    fn test_invalid_inputs() {
        let seed = mnemonic_to_seed(ABANDON, None).unwrap();
        assert!(matches!(
            derive(&seed, "44'/0'", Curve::Secp256k1),
            Err(DerivationError::InvalidPath(_))
        ));
        assert!(matches!(
            derive(&[], "m/0", Curve::Secp256k1),
            Err(DerivationError::InvalidSeed(_))
        ));
    }

    #[test]
    fn test_private_key_debug_is_redacted() {
        let seed = mnemonic_to_seed(ABANDON, None).unwrap();
        let key_pair = derive(&seed, "m/44'/0'/0'/0/0", Curve::Secp256k1).unwrap();
        let debug = format!("{:?}", key_pair);
        assert!(!debug.contains(&hex::encode(key_pair.private_key().as_bytes())));
    }
}
