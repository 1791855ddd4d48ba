//! Local signing of delegated-custody pre-images
//!
//! Signing is synchronous and pure: no network access, no shared mutable
//! state, safe to call from any thread.

use ::secp256k1::{Message, Secp256k1, SecretKey};
use ed25519_dalek::{Signer, SigningKey};
use serde::{Deserialize, Serialize};

use super::keys::Curve;
use crate::error::SigningError;

/// Signature algorithm requested by the transaction builder for a pre-image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureAlgorithm {
    Secp256k1,
    Ed25519,
}

impl SignatureAlgorithm {
    /// Curve whose private keys this algorithm accepts
    pub fn curve(&self) -> Curve {
        match self {
            Self::Secp256k1 => Curve::Secp256k1,
            Self::Ed25519 => Curve::Ed25519,
        }
    }
}

/// Signs raw pre-images with caller-supplied key material
pub trait DelegatedSigner: Send + Sync {
    fn sign(&self, data: &[u8], private_key: &[u8], algorithm: SignatureAlgorithm) -> Result<Vec<u8>, SigningError>;
}

/// Default signer backed by libsecp256k1 and ed25519-dalek
#[derive(Debug, Clone, Copy, Default)]
pub struct SigningService;

impl SigningService {
    pub fn new() -> Self {
        Self
    }

    /// ECDSA over a 32-byte digest with an RFC6979 nonce.
    ///
    /// Output is `r || s || recovery_id` (65 bytes).
    fn sign_secp256k1(digest: &[u8], private_key: &[u8]) -> Result<Vec<u8>, SigningError> {
        let secret_key =
            SecretKey::from_slice(private_key).map_err(|e| SigningError::InvalidKeyMaterial(e.to_string()))?;
        let message = Message::from_digest_slice(digest)
            .map_err(|_| SigningError::InvalidDigest(format!("expected 32 bytes, got {}", digest.len())))?;

        let secp = Secp256k1::signing_only();
        let (recovery_id, compact) = secp.sign_ecdsa_recoverable(&message, &secret_key).serialize_compact();

        let mut signature = Vec::with_capacity(65);
        signature.extend_from_slice(&compact);
        signature.push(recovery_id.to_i32() as u8);
        Ok(signature)
    }

    fn sign_ed25519(data: &[u8], private_key: &[u8]) -> Result<Vec<u8>, SigningError> {
        let bytes: [u8; 32] = private_key.try_into().map_err(|_| {
            SigningError::InvalidKeyMaterial(format!("expected 32 bytes, got {}", private_key.len()))
        })?;
        let signing_key = SigningKey::from_bytes(&bytes);
        Ok(signing_key.sign(data).to_bytes().to_vec())
    }
}

impl DelegatedSigner for SigningService {
    fn sign(&self, data: &[u8], private_key: &[u8], algorithm: SignatureAlgorithm) -> Result<Vec<u8>, SigningError> {
        match algorithm {
            SignatureAlgorithm::Secp256k1 => Self::sign_secp256k1(data, private_key),
            SignatureAlgorithm::Ed25519 => Self::sign_ed25519(data, private_key),
        }
    }
}
