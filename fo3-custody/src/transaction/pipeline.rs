//! Build, sign and push of delegated-custody transactions

use std::sync::Arc;

use rayon::prelude::*;
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::provider::{
    AuthenticationData, AuthenticationDataProvider, BuildTxRequest, PushTxRequest, TransactionsClient,
};
use super::types::{
    DelegatedTransactionInput, DelegatedTransactionOutput, SignedPreImage, SignedTransactionOutput, TransactionId,
    TransactionStage, TransactionState,
};
use crate::cache::{LifecycleBus, ReactiveCache, RefreshPolicy};
use crate::crypto::signing::{DelegatedSigner, SigningService};
use crate::error::{AuthenticationError, SigningError, TransactionError};

/// Drives a delegated transaction from build to broadcast.
///
/// Authentication data is resolved through a cache so that consecutive
/// builds and pushes within a session hit the provider once.
pub struct DelegatedTransactionPipeline {
    client: Arc<dyn TransactionsClient>,
    signer: Arc<dyn DelegatedSigner>,
    auth: ReactiveCache<(), AuthenticationData, AuthenticationError>,
    state: watch::Sender<TransactionState>,
}

impl DelegatedTransactionPipeline {
    /// Create a pipeline with the default signing service. The auth cache
    /// uses `auth_policy`; a scoped policy is flushed by events published on
    /// `bus`. No runtime is needed to construct the pipeline.
    pub fn new(
        client: Arc<dyn TransactionsClient>,
        auth_provider: Arc<dyn AuthenticationDataProvider>,
        auth_policy: RefreshPolicy,
        bus: &LifecycleBus,
    ) -> Self {
        Self::with_signer(client, auth_provider, Arc::new(SigningService::new()), auth_policy, bus)
    }

    pub fn with_signer(
        client: Arc<dyn TransactionsClient>,
        auth_provider: Arc<dyn AuthenticationDataProvider>,
        signer: Arc<dyn DelegatedSigner>,
        auth_policy: RefreshPolicy,
        bus: &LifecycleBus,
    ) -> Self {
        let auth = ReactiveCache::with_lifecycle(auth_policy, bus, move |_: ()| {
            let provider = auth_provider.clone();
            async move { provider.authentication_data().await }
        });
        let (state, _) = watch::channel(TransactionState::Idle);

        Self {
            client,
            signer,
            auth,
            state,
        }
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<TransactionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> TransactionState {
        self.state.borrow().clone()
    }

    /// Drop the cached authentication data
    pub async fn invalidate_authentication(&self) {
        self.auth.invalidate(&()).await;
    }

    /// A failed lookup is dropped from the cache so the next build or push
    /// asks the provider again.
    async fn authentication_data(&self) -> Result<AuthenticationData, TransactionError> {
        match self.auth.get(()).await {
            Ok(auth) => Ok(auth),
            Err(e) => {
                warn!("Authentication data unavailable: {}", e);
                self.auth.invalidate(&()).await;
                Err(TransactionError::Authentication(e))
            }
        }
    }

    /// Ask the backend to build an unsigned transaction for `input`
    pub async fn build_transaction(
        &self,
        input: &DelegatedTransactionInput,
    ) -> Result<DelegatedTransactionOutput, TransactionError> {
        let auth = self.authentication_data().await?;
        let response = self.client.build_tx(BuildTxRequest::new(&auth, input)).await?;

        info!(
            "Built {} transaction with {} pre-image(s)",
            input.currency,
            response.pre_images.len()
        );
        Ok(response.into())
    }

    /// Sign every pre-image with `private_key`. Either all succeed, in input
    /// order, or the first failure is returned.
    pub fn sign(
        &self,
        transaction: &DelegatedTransactionOutput,
        private_key: &[u8],
    ) -> Result<SignedTransactionOutput, TransactionError> {
        let signer = &self.signer;
        let signatures = transaction
            .pre_images
            .par_iter()
            .map(|pre_image| -> Result<SignedPreImage, SigningError> {
                let data = pre_image.bytes()?;
                let signature = signer.sign(&data, private_key, pre_image.signature_algorithm)?;
                Ok(SignedPreImage {
                    pre_image: pre_image.pre_image.clone(),
                    signing_key: pre_image.signing_key.clone(),
                    signature_algorithm: pre_image.signature_algorithm,
                    signature: hex::encode(signature),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SignedTransactionOutput {
            raw_tx: transaction.raw_tx.clone(),
            signatures,
        })
    }

    /// Broadcast a signed transaction
    pub async fn push_transaction(
        &self,
        transaction: &SignedTransactionOutput,
        currency: &str,
    ) -> Result<TransactionId, TransactionError> {
        let auth = self.authentication_data().await?;
        let response = self
            .client
            .push_tx(PushTxRequest::new(&auth, currency, transaction))
            .await?;

        info!("Pushed {} transaction {}", currency, response.tx_id);
        Ok(response.tx_id)
    }

    /// Run build, sign and push, publishing each transition
    pub async fn execute(
        &self,
        input: &DelegatedTransactionInput,
        private_key: &[u8],
        currency: &str,
    ) -> Result<TransactionId, TransactionError> {
        self.transition(TransactionState::Building);
        let built = self
            .build_transaction(input)
            .await
            .map_err(|e| self.fail(TransactionStage::Build, e))?;

        self.transition(TransactionState::Signing);
        let signed = self
            .sign(&built, private_key)
            .map_err(|e| self.fail(TransactionStage::Sign, e))?;

        self.transition(TransactionState::Pushing);
        let tx_id = self
            .push_transaction(&signed, currency)
            .await
            .map_err(|e| self.fail(TransactionStage::Push, e))?;

        self.transition(TransactionState::Completed(tx_id.clone()));
        Ok(tx_id)
    }

    fn transition(&self, state: TransactionState) {
        info!("Delegated transaction state: {:?}", state);
        self.state.send_replace(state);
    }

    fn fail(&self, stage: TransactionStage, error: TransactionError) -> TransactionError {
        error!("Delegated transaction failed at {:?}: {}", stage, error);
        self.state.send_replace(TransactionState::Failed {
            stage,
            error: error.clone(),
        });
        error
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::cache::LifecycleEvent;
    use crate::crypto::signing::SignatureAlgorithm;
    use crate::error::{CacheError, NetworkError};
    use crate::transaction::provider::{BuildTxResponse, BuildTxSummary, PushTxResponse};
    use crate::transaction::types::PreImage;

    const PRIVATE_KEY: &str = "0d371300cd074054ef8248f5640a6dcbe60bdd1fad900be94e0d62fd9168caae";
    const DIGEST_A: &str = "fd09c5d898ca107a3cbc535065c66345d929e34a77beb687e8caf4a7a3683098";
    const DIGEST_B: &str = "0101010101010101010101010101010101010101010101010101010101010101";
    const DIGEST_C: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f90";

    struct CountingAuth {
        calls: AtomicUsize,
        /// Number of leading calls that fail
        failures: usize,
    }

    #[async_trait]
    impl AuthenticationDataProvider for CountingAuth {
        async fn authentication_data(&self) -> Result<AuthenticationData, AuthenticationError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(AuthenticationError::MissingSession);
            }
            Ok(AuthenticationData {
                guid_hash: "guid".to_string(),
                shared_key_hash: "shared".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct MockClient {
        pre_images: Vec<PreImage>,
        build_error: Option<NetworkError>,
        pushed: Mutex<Vec<PushTxRequest>>,
        observer: Mutex<Option<watch::Receiver<TransactionState>>>,
        observed: Mutex<Vec<TransactionState>>,
    }

    impl MockClient {
        fn observe(&self) {
            if let Some(rx) = self.observer.lock().unwrap().as_ref() {
                self.observed.lock().unwrap().push(rx.borrow().clone());
            }
        }
    }

    #[async_trait]
    impl TransactionsClient for MockClient {
        async fn build_tx(&self, _request: BuildTxRequest) -> Result<BuildTxResponse, NetworkError> {
            self.observe();
            if let Some(error) = &self.build_error {
                return Err(error.clone());
            }
            Ok(BuildTxResponse {
                summary: BuildTxSummary {
                    relative_fee: "1".to_string(),
                    absolute_fee_maximum: "2".to_string(),
                    absolute_fee_estimate: "3".to_string(),
                    amount: "4".to_string(),
                    balance: "5".to_string(),
                },
                raw_tx: json!({ "version": 1 }),
                pre_images: self.pre_images.clone(),
            })
        }

        async fn push_tx(&self, request: PushTxRequest) -> Result<PushTxResponse, NetworkError> {
            self.observe();
            self.pushed.lock().unwrap().push(request);
            Ok(PushTxResponse {
                tx_id: "0xabc".to_string(),
            })
        }
    }

    fn pre_image(digest: &str) -> PreImage {
        PreImage {
            pre_image: digest.to_string(),
            signing_key: "03d5d0".to_string(),
            descriptor: None,
            signature_algorithm: SignatureAlgorithm::Secp256k1,
        }
    }

    fn input() -> DelegatedTransactionInput {
        DelegatedTransactionInput {
            account: 0,
            amount: "1".to_string(),
            currency: "STX".to_string(),
            destination: "SP000".to_string(),
            fee: "NORMAL".to_string(),
            fee_currency: "STX".to_string(),
            memo: String::new(),
            max_verification_version: None,
            tx_type: "PAYMENT".to_string(),
        }
    }

    fn pipeline(client: Arc<MockClient>, auth: Arc<CountingAuth>, bus: &LifecycleBus) -> DelegatedTransactionPipeline {
        DelegatedTransactionPipeline::new(client, auth, RefreshPolicy::on_login_logout(), bus)
    }

    fn auth(fail: bool) -> Arc<CountingAuth> {
        failing_auth(if fail { usize::MAX } else { 0 })
    }

    fn failing_auth(failures: usize) -> Arc<CountingAuth> {
        Arc::new(CountingAuth {
            calls: AtomicUsize::new(0),
            failures,
        })
    }

    #[tokio::test]
    async fn test_authentication_is_cached_until_logout() {
        let bus = LifecycleBus::default();
        let auth = auth(false);
        let pipeline = pipeline(Arc::new(MockClient::default()), auth.clone(), &bus);

        pipeline.build_transaction(&input()).await.unwrap();
        pipeline.build_transaction(&input()).await.unwrap();
        assert_eq!(auth.calls.load(Ordering::SeqCst), 1);

        bus.publish(LifecycleEvent::Logout).await;
        pipeline.build_transaction(&input()).await.unwrap();
        assert_eq!(auth.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_authentication_failure_is_retried() {
        let bus = LifecycleBus::default();
        let auth = failing_auth(1);
        let pipeline = pipeline(Arc::new(MockClient::default()), auth.clone(), &bus);

        assert!(matches!(
            pipeline.build_transaction(&input()).await,
            Err(TransactionError::Authentication(_))
        ));
        pipeline.build_transaction(&input()).await.unwrap();
        pipeline.build_transaction(&input()).await.unwrap();
        assert_eq!(auth.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_scoped_pipeline_builds_without_runtime() {
        let bus = LifecycleBus::default();
        let pipeline = pipeline(Arc::new(MockClient::default()), auth(false), &bus);
        assert_eq!(pipeline.state(), TransactionState::Idle);
    }

    #[tokio::test]
    async fn test_build_errors_are_typed() {
        let bus = LifecycleBus::default();
        let failing = pipeline(Arc::new(MockClient::default()), auth(true), &bus);
        assert_eq!(
            failing.build_transaction(&input()).await,
            Err(TransactionError::Authentication(CacheError::Fetch(
                AuthenticationError::MissingSession
            )))
        );

        let client = MockClient {
            build_error: Some(NetworkError::Server {
                status: 503,
                message: "unavailable".to_string(),
            }),
            ..Default::default()
        };
        let offline = pipeline(Arc::new(client), auth(false), &bus);
        assert!(matches!(
            offline.build_transaction(&input()).await,
            Err(TransactionError::Network(NetworkError::Server { status: 503, .. }))
        ));
    }

    #[tokio::test]
    async fn test_sign_preserves_order() {
        let bus = LifecycleBus::default();
        let pipeline = pipeline(Arc::new(MockClient::default()), auth(false), &bus);
        let key = hex::decode(PRIVATE_KEY).unwrap();

        let output = DelegatedTransactionOutput {
            relative_fee: "1".to_string(),
            absolute_fee_maximum: "2".to_string(),
            absolute_fee_estimate: "3".to_string(),
            amount: "4".to_string(),
            balance: "5".to_string(),
            raw_tx: json!({}),
            pre_images: vec![pre_image(DIGEST_A), pre_image(DIGEST_B), pre_image(DIGEST_C)],
        };
        let signed = pipeline.sign(&output, &key).unwrap();

        assert_eq!(signed.signatures.len(), 3);
        for (pre_image, signed) in output.pre_images.iter().zip(&signed.signatures) {
            let expected = SigningService::new()
                .sign(&hex::decode(&pre_image.pre_image).unwrap(), &key, SignatureAlgorithm::Secp256k1)
                .unwrap();
            assert_eq!(signed.pre_image, pre_image.pre_image);
            assert_eq!(signed.signature_algorithm, pre_image.signature_algorithm);
            assert_eq!(signed.signature, hex::encode(expected));
        }
        assert_eq!(
            signed.signatures[0].signature,
            "bae592f9d4bcd845e8929cb753478f00350381dfd0cffa27876ed812564a8cc142ba9afa2f631b757eed4580948650c5fbd16644f294ba9b664fd1d646b3993800"
        );
    }

    #[tokio::test]
    async fn test_sign_is_all_or_nothing() {
        let bus = LifecycleBus::default();
        let pipeline = pipeline(Arc::new(MockClient::default()), auth(false), &bus);
        let key = hex::decode(PRIVATE_KEY).unwrap();

        let output = DelegatedTransactionOutput {
            relative_fee: "1".to_string(),
            absolute_fee_maximum: "2".to_string(),
            absolute_fee_estimate: "3".to_string(),
            amount: "4".to_string(),
            balance: "5".to_string(),
            raw_tx: json!({}),
            pre_images: vec![pre_image(DIGEST_A), pre_image("not hex"), pre_image(DIGEST_C)],
        };

        assert!(matches!(
            pipeline.sign(&output, &key),
            Err(TransactionError::Signing(SigningError::InvalidDigest(_)))
        ));
        assert!(matches!(
            pipeline.sign(&DelegatedTransactionOutput { pre_images: vec![pre_image(DIGEST_A)], ..output }, &[0u8; 32]),
            Err(TransactionError::Signing(SigningError::InvalidKeyMaterial(_)))
        ));
    }

    #[tokio::test]
    async fn test_execute_publishes_transitions() {
        let bus = LifecycleBus::default();
        let client = Arc::new(MockClient {
            pre_images: vec![pre_image(DIGEST_A), pre_image(DIGEST_B)],
            ..Default::default()
        });
        let pipeline = pipeline(client.clone(), auth(false), &bus);
        *client.observer.lock().unwrap() = Some(pipeline.subscribe());
        let key = hex::decode(PRIVATE_KEY).unwrap();

        let tx_id = pipeline.execute(&input(), &key, "STX").await.unwrap();

        assert_eq!(tx_id, "0xabc");
        assert_eq!(pipeline.state(), TransactionState::Completed("0xabc".to_string()));
        assert_eq!(
            *client.observed.lock().unwrap(),
            vec![TransactionState::Building, TransactionState::Pushing]
        );

        let pushed = client.pushed.lock().unwrap();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].currency, "STX");
        assert_eq!(pushed[0].signatures.len(), 2);
        assert_eq!(pushed[0].raw_tx, json!({ "version": 1 }));
    }

    #[tokio::test]
    async fn test_execute_failure_records_stage() {
        let bus = LifecycleBus::default();
        let client = Arc::new(MockClient {
            pre_images: vec![pre_image("zz")],
            ..Default::default()
        });
        let pipeline = pipeline(client.clone(), auth(false), &bus);

        let result = pipeline.execute(&input(), &hex::decode(PRIVATE_KEY).unwrap(), "STX").await;

        assert!(matches!(result, Err(TransactionError::Signing(_))));
        assert!(matches!(
            pipeline.state(),
            TransactionState::Failed {
                stage: TransactionStage::Sign,
                ..
            }
        ));
        assert!(pipeline.state().is_terminal());
        assert!(client.pushed.lock().unwrap().is_empty());
    }
}
