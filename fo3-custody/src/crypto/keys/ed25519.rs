//! SLIP-10 key derivation over ed25519

use ed25519_dalek::{SigningKey, VerifyingKey};
use hmac::{Hmac, Mac};
use sha2::Sha512;

use super::derivation::{Curve, KeyPair, PrivateKey, PublicKey};
use super::path::DerivationPath;
use crate::error::DerivationError;

/// Derive an ed25519 key pair from a seed and derivation path.
///
/// SLIP-10 only defines hardened children for ed25519.
pub fn derive_ed25519_key_pair(seed: &[u8], path: &DerivationPath) -> Result<KeyPair, DerivationError> {
    if !(16..=64).contains(&seed.len()) {
        return Err(DerivationError::InvalidSeed(format!(
            "seed must be 16 to 64 bytes, got {}",
            seed.len()
        )));
    }

    let (mut secret_key, mut chain_code) = hmac_sha512(b"ed25519 seed", seed)?;

    for component in path.components() {
        if !component.is_hardened() {
            return Err(DerivationError::InvalidPath(format!(
                "{}: ed25519 supports hardened derivation only",
                path
            )));
        }

        let mut data = Vec::with_capacity(37);
        data.push(0);
        data.extend_from_slice(&secret_key);
        data.extend_from_slice(&component.to_u32().to_be_bytes());

        (secret_key, chain_code) = hmac_sha512(&chain_code, &data)?;
    }

    let signing_key = SigningKey::from_bytes(&secret_key);
    let verifying_key = VerifyingKey::from(&signing_key);

    let private_key = PrivateKey::new(signing_key.to_bytes().to_vec(), Curve::Ed25519);
    let public_key = PublicKey::new(verifying_key.to_bytes().to_vec(), Curve::Ed25519);

    KeyPair::new(private_key, public_key)
}

fn hmac_sha512(key: &[u8], data: &[u8]) -> Result<([u8; 32], [u8; 32]), DerivationError> {
    let mut hmac = <Hmac<Sha512> as Mac>::new_from_slice(key)
        .map_err(|_| DerivationError::InvalidKey("HMAC error".to_string()))?;
    hmac.update(data);
    let result = hmac.finalize().into_bytes();

    let mut left = [0u8; 32];
    let mut right = [0u8; 32];
    left.copy_from_slice(&result[0..32]);
    right.copy_from_slice(&result[32..64]);

    Ok((left, right))
}
