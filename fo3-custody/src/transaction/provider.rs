//! Remote collaborators of the delegated transaction pipeline

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::types::{DelegatedTransactionInput, DelegatedTransactionOutput, PreImage, SignedPreImage, SignedTransactionOutput};
use crate::error::{AuthenticationError, NetworkError};

/// Credentials identifying the wallet to the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationData {
    pub guid_hash: String,
    pub shared_key_hash: String,
}

/// Source of the current session's authentication data
#[async_trait]
pub trait AuthenticationDataProvider: Send + Sync {
    async fn authentication_data(&self) -> Result<AuthenticationData, AuthenticationError>;
}

/// Builder-side extra fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtraData {
    pub memo: String,
    pub fee_currency: String,
}

/// Request body of the build-tx call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildTxRequest {
    pub account: u32,
    pub amount: String,
    pub auth: AuthenticationData,
    pub currency: String,
    pub destination: String,
    pub extra_data: ExtraData,
    pub fee: String,
    pub max_verification_version: Option<u32>,
    #[serde(rename = "type")]
    pub tx_type: String,
}

impl BuildTxRequest {
    pub fn new(auth: &AuthenticationData, input: &DelegatedTransactionInput) -> Self {
        Self {
            account: input.account,
            amount: input.amount.clone(),
            auth: auth.clone(),
            currency: input.currency.clone(),
            destination: input.destination.clone(),
            extra_data: ExtraData {
                memo: input.memo.clone(),
                fee_currency: input.fee_currency.clone(),
            },
            fee: input.fee.clone(),
            max_verification_version: input.max_verification_version,
            tx_type: input.tx_type.clone(),
        }
    }
}

/// Fee summary of a built transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildTxSummary {
    pub relative_fee: String,
    pub absolute_fee_maximum: String,
    pub absolute_fee_estimate: String,
    pub amount: String,
    pub balance: String,
}

/// Response of the build-tx call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildTxResponse {
    pub summary: BuildTxSummary,
    pub raw_tx: serde_json::Value,
    pub pre_images: Vec<PreImage>,
}

impl From<BuildTxResponse> for DelegatedTransactionOutput {
    fn from(response: BuildTxResponse) -> Self {
        Self {
            relative_fee: response.summary.relative_fee,
            absolute_fee_maximum: response.summary.absolute_fee_maximum,
            absolute_fee_estimate: response.summary.absolute_fee_estimate,
            amount: response.summary.amount,
            balance: response.summary.balance,
            raw_tx: response.raw_tx,
            pre_images: response.pre_images,
        }
    }
}

/// Request body of the push-tx call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushTxRequest {
    pub auth: AuthenticationData,
    pub currency: String,
    pub raw_tx: serde_json::Value,
    pub signatures: Vec<SignedPreImage>,
}

impl PushTxRequest {
    pub fn new(auth: &AuthenticationData, currency: &str, transaction: &SignedTransactionOutput) -> Self {
        Self {
            auth: auth.clone(),
            currency: currency.to_string(),
            raw_tx: transaction.raw_tx.clone(),
            signatures: transaction.signatures.clone(),
        }
    }
}

/// Response of the push-tx call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushTxResponse {
    pub tx_id: String,
}

/// Remote transaction builder and broadcaster
#[async_trait]
pub trait TransactionsClient: Send + Sync {
    /// Build an unsigned transaction and the pre-images to sign
    async fn build_tx(&self, request: BuildTxRequest) -> Result<BuildTxResponse, NetworkError>;

    /// Broadcast a signed transaction
    async fn push_tx(&self, request: PushTxRequest) -> Result<PushTxResponse, NetworkError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::crypto::signing::SignatureAlgorithm;

    #[test]
    fn test_build_tx_response_decodes() {
        let body = json!({
            "summary": {
                "relativeFee": "1",
                "absoluteFeeMaximum": "2",
                "absoluteFeeEstimate": "3",
                "amount": "4",
                "balance": "5"
            },
            "rawTx": {
                "version": 1,
                "payload": {
                    "version": 0,
                    "auth": { "authType": 4 },
                    "chainId": 1,
                    "anchorMode": 3
                }
            },
            "preImages": [
                {
                    "preImage": "1",
                    "signingKey": "2",
                    "descriptor": null,
                    "signatureAlgorithm": "secp256k1"
                }
            ]
        });

        let response: BuildTxResponse = serde_json::from_value(body.clone()).unwrap();
        assert_eq!(response.summary.relative_fee, "1");
        assert_eq!(response.summary.balance, "5");
        assert_eq!(response.pre_images.len(), 1);
        assert_eq!(response.pre_images[0].signature_algorithm, SignatureAlgorithm::Secp256k1);
        assert_eq!(response.pre_images[0].descriptor, None);

        let output = DelegatedTransactionOutput::from(response);
        assert_eq!(output.absolute_fee_estimate, "3");
        assert_eq!(output.raw_tx, body["rawTx"]);
    }

    #[test]
    fn test_build_tx_request_shape() {
        let auth = AuthenticationData {
            guid_hash: "guid-hash".to_string(),
            shared_key_hash: "shared-key-hash".to_string(),
        };
        let input = DelegatedTransactionInput {
            account: 0,
            amount: "1".to_string(),
            currency: "STX".to_string(),
            destination: "SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ7".to_string(),
            fee: "NORMAL".to_string(),
            fee_currency: "STX".to_string(),
            memo: String::new(),
            max_verification_version: Some(1),
            tx_type: "PAYMENT".to_string(),
        };

        let value = serde_json::to_value(BuildTxRequest::new(&auth, &input)).unwrap();
        assert_eq!(value["auth"]["guidHash"], "guid-hash");
        assert_eq!(value["extraData"]["feeCurrency"], "STX");
        assert_eq!(value["maxVerificationVersion"], 1);
        assert_eq!(value["type"], "PAYMENT");
    }
}
