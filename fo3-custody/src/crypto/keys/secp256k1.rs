//! BIP32 key derivation over secp256k1

use std::fmt;

use bitcoin::hashes::{hash160, Hash};
pub use bitcoin::Network;
use hmac::{Hmac, Mac};
use secp256k1::{All, PublicKey as Secp256k1PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256, Sha512};

use super::derivation::{Curve, KeyPair, PrivateKey, PublicKey};
use super::path::{ChildIndex, DerivationPath};
use crate::error::DerivationError;

const XPRV_MAINNET: [u8; 4] = [0x04, 0x88, 0xAD, 0xE4];
const XPUB_MAINNET: [u8; 4] = [0x04, 0x88, 0xB2, 0x1E];
const XPRV_TESTNET: [u8; 4] = [0x04, 0x35, 0x83, 0x94];
const XPUB_TESTNET: [u8; 4] = [0x04, 0x35, 0x87, 0xCF];

/// Derive a secp256k1 key pair from a seed and derivation path
pub fn derive_secp256k1_key_pair(seed: &[u8], path: &DerivationPath) -> Result<KeyPair, DerivationError> {
    let secp = Secp256k1::new();
    let xpriv = ExtendedPrivateKey::new_master(seed, Network::Bitcoin)?.derive_path(&secp, path)?;

    let private_key = PrivateKey::new(xpriv.secret_key.secret_bytes().to_vec(), Curve::Secp256k1);
    let public_key = PublicKey::new(xpriv.public_key(&secp).serialize().to_vec(), Curve::Secp256k1);

    KeyPair::new(private_key, public_key)
}

/// A BIP32 extended private key
#[derive(Clone, PartialEq, Eq)]
pub struct ExtendedPrivateKey {
    network: Network,
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_number: u32,
    chain_code: [u8; 32],
    secret_key: SecretKey,
}

/// A BIP32 extended public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedPublicKey {
    network: Network,
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_number: u32,
    chain_code: [u8; 32],
    public_key: Secp256k1PublicKey,
}

impl ExtendedPrivateKey {
    /// Derive the master key from a seed
    pub fn new_master(seed: &[u8], network: Network) -> Result<Self, DerivationError> {
        if !(16..=64).contains(&seed.len()) {
            return Err(DerivationError::InvalidSeed(format!(
                "seed must be 16 to 64 bytes, got {}",
                seed.len()
            )));
        }

        let (key, chain_code) = hmac_sha512(b"Bitcoin seed", &[seed])?;
        let secret_key = SecretKey::from_slice(&key)
            .map_err(|e| DerivationError::InvalidSeed(format!("unusable master key: {}", e)))?;

        Ok(Self {
            network,
            depth: 0,
            parent_fingerprint: [0; 4],
            child_number: 0,
            chain_code,
            secret_key,
        })
    }

    /// Derive a child key from this key
    pub fn derive_child(&self, secp: &Secp256k1<All>, index: ChildIndex) -> Result<Self, DerivationError> {
        let parent_public_key = self.public_key(secp);
        let index_bytes = index.to_u32().to_be_bytes();

        let (tweak, chain_code) = if index.is_hardened() {
            let secret = self.secret_key.secret_bytes();
            hmac_sha512(&self.chain_code, &[&[0u8][..], &secret[..], &index_bytes[..]])?
        } else {
            let public = parent_public_key.serialize();
            hmac_sha512(&self.chain_code, &[&public[..], &index_bytes[..]])?
        };

        // child = parse256(IL) + kpar (mod n)
        let secret_key = SecretKey::from_slice(&tweak)
            .map_err(|e| DerivationError::InvalidKey(format!("child {}: {}", index, e)))?
            .add_tweak(&self.secret_key.into())
            .map_err(|e| DerivationError::InvalidKey(format!("child {}: {}", index, e)))?;

        let depth = self
            .depth
            .checked_add(1)
            .ok_or_else(|| DerivationError::InvalidPath("maximum depth exceeded".to_string()))?;

        Ok(Self {
            network: self.network,
            depth,
            parent_fingerprint: fingerprint(&parent_public_key),
            child_number: index.to_u32(),
            chain_code,
            secret_key,
        })
    }

    /// Derive every component of `path` starting from this key
    pub fn derive_path(&self, secp: &Secp256k1<All>, path: &DerivationPath) -> Result<Self, DerivationError> {
        path.components()
            .iter()
            .try_fold(self.clone(), |key, index| key.derive_child(secp, *index))
    }

    pub fn public_key(&self, secp: &Secp256k1<All>) -> Secp256k1PublicKey {
        Secp256k1PublicKey::from_secret_key(secp, &self.secret_key)
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret_key.secret_bytes()
    }

    pub fn to_extended_public_key(&self, secp: &Secp256k1<All>) -> ExtendedPublicKey {
        ExtendedPublicKey {
            network: self.network,
            depth: self.depth,
            parent_fingerprint: self.parent_fingerprint,
            child_number: self.child_number,
            chain_code: self.chain_code,
            public_key: self.public_key(secp),
        }
    }

    fn encode(&self) -> [u8; 78] {
        let version = match self.network {
            Network::Bitcoin => XPRV_MAINNET,
            _ => XPRV_TESTNET,
        };
        let mut key = [0u8; 33];
        key[1..].copy_from_slice(&self.secret_key.secret_bytes());
        encode_extended(version, self.depth, self.parent_fingerprint, self.child_number, &self.chain_code, &key)
    }
}

impl fmt::Display for ExtendedPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&base58check(&self.encode()))
    }
}

impl fmt::Debug for ExtendedPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendedPrivateKey")
            .field("network", &self.network)
            .field("depth", &self.depth)
            .field("child_number", &self.child_number)
            .finish_non_exhaustive()
    }
}

impl ExtendedPublicKey {
    pub fn public_key(&self) -> &Secp256k1PublicKey {
        &self.public_key
    }

    fn encode(&self) -> [u8; 78] {
        let version = match self.network {
            Network::Bitcoin => XPUB_MAINNET,
            _ => XPUB_TESTNET,
        };
        encode_extended(
            version,
            self.depth,
            self.parent_fingerprint,
            self.child_number,
            &self.chain_code,
            &self.public_key.serialize(),
        )
    }
}

impl fmt::Display for ExtendedPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&base58check(&self.encode()))
    }
}

/// HMAC-SHA512 over the concatenation of `parts`, split into (IL, IR)
fn hmac_sha512(key: &[u8], parts: &[&[u8]]) -> Result<([u8; 32], [u8; 32]), DerivationError> {
    let mut hmac = <Hmac<Sha512> as Mac>::new_from_slice(key)
        .map_err(|_| DerivationError::InvalidKey("HMAC error".to_string()))?;
    for part in parts {
        hmac.update(part);
    }
    let result = hmac.finalize().into_bytes();

    let mut left = [0u8; 32];
    let mut right = [0u8; 32];
    left.copy_from_slice(&result[0..32]);
    right.copy_from_slice(&result[32..64]);

    Ok((left, right))
}

fn fingerprint(public_key: &Secp256k1PublicKey) -> [u8; 4] {
    let hash = hash160::Hash::hash(&public_key.serialize()).to_byte_array();
    let mut fingerprint = [0u8; 4];
    fingerprint.copy_from_slice(&hash[0..4]);
    fingerprint
}

fn encode_extended(
    version: [u8; 4],
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_number: u32,
    chain_code: &[u8; 32],
    key: &[u8; 33],
) -> [u8; 78] {
    let mut data = [0u8; 78];
    data[0..4].copy_from_slice(&version);
    data[4] = depth;
    data[5..9].copy_from_slice(&parent_fingerprint);
    data[9..13].copy_from_slice(&child_number.to_be_bytes());
    data[13..45].copy_from_slice(chain_code);
    data[45..78].copy_from_slice(key);
    data
}

/// Base58 with a 4-byte double-SHA256 checksum
fn base58check(payload: &[u8]) -> String {
    let checksum = Sha256::digest(Sha256::digest(payload));

    let mut data = Vec::with_capacity(payload.len() + 4);
    data.extend_from_slice(payload);
    data.extend_from_slice(&checksum[0..4]);

    bs58::encode(data).into_string()
}
