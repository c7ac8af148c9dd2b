//! FHEVM client façade
//!
//! Owns the lifecycle of one client:
//!
//! ```text
//! Uninitialized --init()--> Initializing --ok--> Ready
//!                                        --err-> Failed --init()--> Initializing
//! ```
//!
//! Concurrent `init()` callers share the in-flight attempt. Every operation
//! other than `get_public_key` fails with [`ClientError::ClientNotInitialized`]
//! outside `Ready`, without touching the network.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use fhevm_core::{
    Address, ClientConfig, EncryptedType, EncryptionContext, Handle, KeySource, PlainValue,
};
use futures::future::{BoxFuture, FutureExt, Shared};

use crate::engine::{EncryptedInput, EngineAdapter, EngineParams, EngineProvider, PublicKey};
use crate::error::{ClientError, Result};
use crate::gateway::{DecryptedValue, DecryptionRequest, GatewayClient};
use crate::resilience::{retry_if, RetryPolicy};
use crate::signer::{Authorization, AuthorizationSigner, TypedDataSigner};

/// Observable lifecycle state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    Uninitialized,
    Initializing,
    Ready,
    /// Last initialization attempt failed; `init()` may be called again
    Failed(String),
}

/// Everything that exists only once initialization succeeded
struct ReadyState {
    engine: EngineAdapter,
    authorizer: AuthorizationSigner,
    acl_public_key: Option<PublicKey>,
}

type InitOutcome = std::result::Result<Arc<ReadyState>, Arc<ClientError>>;
type InitFuture = Shared<BoxFuture<'static, InitOutcome>>;

enum Lifecycle {
    Uninitialized,
    Initializing { attempt: u64, future: InitFuture },
    Ready(Arc<ReadyState>),
    Failed(Arc<ClientError>),
}

/// Entry point for encrypting inputs and decrypting handles
pub struct FhevmClient {
    config: Arc<ClientConfig>,
    gateway: GatewayClient,
    provider: Arc<dyn EngineProvider>,
    lifecycle: Mutex<Lifecycle>,
    attempts: AtomicU64,
}

impl FhevmClient {
    /// Create an uninitialized client; no network activity happens here
    pub fn new(config: ClientConfig, provider: Arc<dyn EngineProvider>) -> Result<Self> {
        config.validate()?;
        let gateway = GatewayClient::from_config(&config)?;

        Ok(Self {
            config: Arc::new(config),
            gateway,
            provider,
            lifecycle: Mutex::new(Lifecycle::Uninitialized),
            attempts: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn gateway(&self) -> &GatewayClient {
        &self.gateway
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> ClientState {
        match &*self.lock() {
            Lifecycle::Uninitialized => ClientState::Uninitialized,
            Lifecycle::Initializing { .. } => ClientState::Initializing,
            Lifecycle::Ready(_) => ClientState::Ready,
            Lifecycle::Failed(err) => ClientState::Failed(err.to_string()),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(&*self.lock(), Lifecycle::Ready(_))
    }

    fn ready(&self) -> Result<Arc<ReadyState>> {
        match &*self.lock() {
            Lifecycle::Ready(ready) => Ok(ready.clone()),
            _ => Err(ClientError::ClientNotInitialized),
        }
    }

    /// Load key material and create the encryption engine
    ///
    /// A no-op once `Ready`. While an attempt is in flight, callers join it
    /// rather than starting another one.
    pub async fn init(&self) -> Result<()> {
        let (attempt, future) = {
            let mut lifecycle = self.lock();
            match &*lifecycle {
                Lifecycle::Ready(_) => return Ok(()),
                Lifecycle::Initializing { attempt, future } => (*attempt, future.clone()),
                Lifecycle::Uninitialized | Lifecycle::Failed(_) => {
                    let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    tracing::info!(
                        chain_id = self.config.chain_id,
                        attempt,
                        "Initializing FHEVM client"
                    );

                    let future = initialize(
                        self.config.clone(),
                        self.gateway.clone(),
                        self.provider.clone(),
                    )
                    .boxed()
                    .shared();

                    *lifecycle = Lifecycle::Initializing {
                        attempt,
                        future: future.clone(),
                    };
                    (attempt, future)
                }
            }
        };

        let outcome = future.await;

        {
            let mut lifecycle = self.lock();
            // A newer attempt owns the state
            let current = matches!(
                &*lifecycle,
                Lifecycle::Initializing { attempt: a, .. } if *a == attempt
            );
            if current {
                *lifecycle = match &outcome {
                    Ok(ready) => {
                        tracing::info!(chain_id = self.config.chain_id, attempt, "FHEVM client ready");
                        Lifecycle::Ready(ready.clone())
                    }
                    Err(err) => {
                        tracing::warn!(attempt, error = %err, "FHEVM client initialization failed");
                        Lifecycle::Failed(err.clone())
                    }
                };
            }
        }

        outcome.map(|_| ()).map_err(ClientError::InitializationFailed)
    }

    /// Encrypt one value into its own input
    pub fn encrypt(
        &self,
        value: impl Into<PlainValue>,
        ty: EncryptedType,
        context: &EncryptionContext,
    ) -> Result<EncryptedInput> {
        let ready = self.ready()?;
        ready.engine.encrypt_one(context, &value.into(), ty)
    }

    /// Encrypt each value into an independent input, in item order
    pub async fn encrypt_batch(
        &self,
        context: &EncryptionContext,
        items: &[(PlainValue, EncryptedType)],
    ) -> Result<Vec<EncryptedInput>> {
        let ready = self.ready()?;
        ready.engine.encrypt_batch(context, items).await
    }

    /// Encrypt all values into a single input with one proof
    pub fn encrypt_packed(
        &self,
        context: &EncryptionContext,
        items: &[(PlainValue, EncryptedType)],
    ) -> Result<EncryptedInput> {
        let ready = self.ready()?;
        ready.engine.encrypt_packed(context, items)
    }

    /// Sign a decryption authorization for `contract`
    pub async fn create_authorization(
        &self,
        contract: Address,
        signer: Option<&dyn TypedDataSigner>,
    ) -> Result<Authorization> {
        let ready = self.ready()?;
        ready
            .authorizer
            .sign(contract, self.config.chain_id, signer)
            .await
    }

    /// Authorize and decrypt one handle
    pub async fn decrypt(
        &self,
        handle: &Handle,
        context: &EncryptionContext,
        signer: Option<&dyn TypedDataSigner>,
    ) -> Result<DecryptedValue> {
        let request = self.prepare_decryption(handle, context, signer).await?;
        self.gateway.request_decryption(&request).await
    }

    /// Like [`FhevmClient::decrypt`], retrying the gateway call
    ///
    /// The signer is asked once; only retryable gateway failures are retried.
    pub async fn decrypt_with_retry(
        &self,
        handle: &Handle,
        context: &EncryptionContext,
        signer: Option<&dyn TypedDataSigner>,
        policy: &RetryPolicy,
    ) -> Result<DecryptedValue> {
        let request = self.prepare_decryption(handle, context, signer).await?;
        retry_if(
            policy,
            || self.gateway.request_decryption(&request),
            ClientError::is_retryable,
        )
        .await
    }

    async fn prepare_decryption(
        &self,
        handle: &Handle,
        context: &EncryptionContext,
        signer: Option<&dyn TypedDataSigner>,
    ) -> Result<DecryptionRequest> {
        let authorization = self
            .create_authorization(context.contract_address, signer)
            .await?;
        Ok(DecryptionRequest::new(handle, context, &authorization))
    }

    /// Engine public key for the ACL contract, `None` until `Ready`
    pub fn get_public_key(&self) -> Option<PublicKey> {
        self.ready().ok()?.acl_public_key.clone()
    }
}

async fn initialize(
    config: Arc<ClientConfig>,
    gateway: GatewayClient,
    provider: Arc<dyn EngineProvider>,
) -> InitOutcome {
    load(&config, &gateway, provider.as_ref())
        .await
        .map(Arc::new)
        .map_err(Arc::new)
}

async fn load(
    config: &ClientConfig,
    gateway: &GatewayClient,
    provider: &dyn EngineProvider,
) -> Result<ReadyState> {
    let public_key = match &config.key_source {
        KeySource::Bytes(bytes) => bytes.clone(),
        KeySource::Endpoint(endpoint) => {
            gateway
                .fetch_public_key(&config.resolve_endpoint(endpoint))
                .await?
        }
    };

    let params = EngineParams {
        chain_id: config.chain_id,
        acl_address: config.acl_address,
        gateway_url: config.gateway_url.clone(),
        public_key,
    };

    let engine = provider
        .create_engine(params)
        .await
        .map_err(ClientError::EngineUnavailable)?;
    let engine = EngineAdapter::new(engine);

    Ok(ReadyState {
        acl_public_key: engine.public_key(&config.acl_address).ok(),
        authorizer: AuthorizationSigner::new(engine.clone()),
        engine,
    })
}

/// Builder for [`FhevmClient`]
pub struct ClientBuilder {
    config: ClientConfig,
    provider: Option<Arc<dyn EngineProvider>>,
}

impl ClientBuilder {
    /// Start from the chain's preset gateway, if any
    pub fn new(chain_id: u64) -> Self {
        Self::from_config(ClientConfig::for_chain(chain_id))
    }

    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            provider: None,
        }
    }

    pub fn gateway_url(mut self, url: impl Into<String>) -> Self {
        self.config = self.config.with_gateway_url(url);
        self
    }

    pub fn key_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config = self.config.with_key_endpoint(endpoint);
        self
    }

    pub fn key_bytes(mut self, key: impl Into<fhevm_core::Bytes>) -> Self {
        self.config = self.config.with_key_bytes(key);
        self
    }

    pub fn acl_address(mut self, address: Address) -> Self {
        self.config = self.config.with_acl_address(address);
        self
    }

    pub fn request_timeout(mut self, timeout: Option<std::time::Duration>) -> Self {
        self.config = self.config.with_request_timeout(timeout);
        self
    }

    pub fn engine_provider(mut self, provider: Arc<dyn EngineProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn build(self) -> Result<FhevmClient> {
        let provider = self.provider.ok_or_else(|| {
            ClientError::Config(fhevm_core::Error::InvalidConfig(
                "an engine provider is required".into(),
            ))
        })?;
        FhevmClient::new(self.config, provider)
    }
}
