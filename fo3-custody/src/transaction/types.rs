//! Delegated transaction types

use serde::{Deserialize, Serialize};

use crate::crypto::signing::SignatureAlgorithm;
use crate::error::{SigningError, TransactionError};

/// Identifier returned by the broadcaster for a pushed transaction
pub type TransactionId = String;

/// Intent to move funds, sent to the remote transaction builder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegatedTransactionInput {
    /// Account index
    pub account: u32,
    /// Amount in minor units
    pub amount: String,
    /// Currency code
    pub currency: String,
    /// Destination address
    pub destination: String,
    /// Fee level or explicit fee
    pub fee: String,
    /// Currency the fee is paid in
    pub fee_currency: String,
    /// Memo attached to the transaction
    #[serde(default)]
    pub memo: String,
    /// Highest verification version the caller understands
    pub max_verification_version: Option<u32>,
    /// Transaction type, e.g. "PAYMENT"
    #[serde(rename = "type")]
    pub tx_type: String,
}

/// A digest the backend needs signed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreImage {
    /// Hex-encoded bytes to sign
    pub pre_image: String,
    /// Public key expected to sign
    pub signing_key: String,
    pub descriptor: Option<String>,
    pub signature_algorithm: SignatureAlgorithm,
}

impl PreImage {
    /// Decoded pre-image bytes. Malformed hex cannot be signed.
    pub fn bytes(&self) -> Result<Vec<u8>, SigningError> {
        hex::decode(&self.pre_image)
            .map_err(|e| SigningError::InvalidDigest(format!("pre-image is not valid hex: {}", e)))
    }
}

/// Unsigned transaction returned by the builder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegatedTransactionOutput {
    pub relative_fee: String,
    pub absolute_fee_maximum: String,
    pub absolute_fee_estimate: String,
    pub amount: String,
    pub balance: String,
    /// Chain-specific transaction, passed through untouched
    pub raw_tx: serde_json::Value,
    pub pre_images: Vec<PreImage>,
}

/// A pre-image paired with its signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedPreImage {
    pub pre_image: String,
    pub signing_key: String,
    pub signature_algorithm: SignatureAlgorithm,
    /// Hex-encoded signature
    pub signature: String,
}

/// Transaction ready to push. `signatures` pairs 1:1, in order, with the
/// builder's pre-images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTransactionOutput {
    pub raw_tx: serde_json::Value,
    pub signatures: Vec<SignedPreImage>,
}

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStage {
    Build,
    Sign,
    Push,
}

/// Observable state of a delegated transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Building,
    Signing,
    Pushing,
    Completed(TransactionId),
    Failed {
        stage: TransactionStage,
        error: TransactionError,
    },
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed { .. })
    }
}
