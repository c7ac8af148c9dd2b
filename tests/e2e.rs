//! End-to-end tests: client façade against a local gateway
//!
//! The gateway serves the network key and answers decryption requests by
//! reading the plaintext back out of the in-memory engine's handles.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use fhevm_client::signer::{AuthorizationMessage, SignerError};
use fhevm_client::test_utils::{mock_handle_value, MockEngineProvider};
use fhevm_core::{parse_handle, Address, Bytes, SEPOLIA_CHAIN_ID};
use fhevm_sdk::{
    ClientConfig, ClientError, ClientState, DecryptedValue, EncryptedType, EncryptionContext,
    FhevmClient, PlainValue, RetryPolicy, TypedDataSigner,
};

const NETWORK_KEY: &[u8] = b"sepolia-network-public-key";

#[derive(Default)]
struct GatewayState {
    key_hits: AtomicUsize,
    decrypt_hits: AtomicUsize,
    fail_first: AtomicUsize,
    last_body: Mutex<Option<Value>>,
}

async fn public_key(State(state): State<Arc<GatewayState>>) -> Vec<u8> {
    state.key_hits.fetch_add(1, Ordering::SeqCst);
    NETWORK_KEY.to_vec()
}

async fn decrypt(State(state): State<Arc<GatewayState>>, Json(body): Json<Value>) -> Response {
    state.decrypt_hits.fetch_add(1, Ordering::SeqCst);

    let failing = state
        .fail_first
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if failing {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let handle = parse_handle(body["handle"].as_str().unwrap()).unwrap();
    *state.last_body.lock().unwrap() = Some(body);

    let plain = mock_handle_value(&handle);
    // byte 21 carries the bit width
    let value = if handle[21] == 1 {
        json!(plain == 1)
    } else {
        json!(plain)
    };
    Json(json!({ "value": value })).into_response()
}

async fn spawn_gateway(state: Arc<GatewayState>) -> String {
    let router = Router::new()
        .route("/fhe-public-key", get(public_key))
        .route("/decrypt", post(decrypt))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

struct Harness {
    client: FhevmClient,
    provider: Arc<MockEngineProvider>,
    gateway: Arc<GatewayState>,
}

async fn harness() -> Harness {
    harness_with(MockEngineProvider::new()).await
}

async fn harness_with(provider: MockEngineProvider) -> Harness {
    let gateway = Arc::new(GatewayState::default());
    let url = spawn_gateway(gateway.clone()).await;

    let provider = Arc::new(provider);
    let config = ClientConfig::new(SEPOLIA_CHAIN_ID).with_gateway_url(url);
    let client = FhevmClient::new(config, provider.clone()).unwrap();

    Harness {
        client,
        provider,
        gateway,
    }
}

fn context(user: Address) -> EncryptionContext {
    EncryptionContext::new(Address::repeat_byte(0xc0), user)
}

/// Delegates to a local key and counts signature requests
struct CountingSigner {
    inner: PrivateKeySigner,
    calls: AtomicUsize,
}

#[async_trait]
impl TypedDataSigner for CountingSigner {
    async fn sign_typed_data(&self, message: &AuthorizationMessage) -> Result<String, SignerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.sign_typed_data(message).await
    }
}

#[tokio::test]
async fn test_no_network_before_init() {
    let h = harness().await;
    let wallet = PrivateKeySigner::random();
    let ctx = context(wallet.address());

    assert!(matches!(
        h.client.encrypt(1u8, EncryptedType::Uint8, &ctx),
        Err(ClientError::ClientNotInitialized)
    ));
    assert!(matches!(
        h.client
            .decrypt(&Bytes::from(vec![0u8; 32]), &ctx, Some(&wallet))
            .await,
        Err(ClientError::ClientNotInitialized)
    ));

    assert_eq!(h.gateway.key_hits.load(Ordering::SeqCst), 0);
    assert_eq!(h.gateway.decrypt_hits.load(Ordering::SeqCst), 0);
    assert_eq!(h.provider.attempts(), 0);
}

#[tokio::test]
async fn test_decrypt_during_init_never_calls_gateway() {
    let h = harness_with(MockEngineProvider::new().with_delay(Duration::from_millis(200))).await;
    let wallet = PrivateKeySigner::random();
    let ctx = context(wallet.address());

    let init = h.client.init();
    tokio::pin!(init);
    assert!(futures::poll!(&mut init).is_pending());
    assert_eq!(h.client.state(), ClientState::Initializing);

    let err = h
        .client
        .decrypt(&Bytes::from(vec![0u8; 32]), &ctx, Some(&wallet))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::ClientNotInitialized));
    assert!(h.client.get_public_key().is_none());

    init.await.unwrap();
    assert_eq!(h.client.state(), ClientState::Ready);
    assert_eq!(h.gateway.decrypt_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_encrypt_then_decrypt() {
    let h = harness().await;
    let wallet = PrivateKeySigner::random();
    let ctx = context(wallet.address());

    h.client.init().await.unwrap();
    h.client.init().await.unwrap();
    assert_eq!(h.client.state(), ClientState::Ready);
    assert_eq!(h.gateway.key_hits.load(Ordering::SeqCst), 1);
    assert_eq!(
        h.provider.last_params().unwrap().public_key,
        Bytes::from_static(NETWORK_KEY)
    );

    let input = h.client.encrypt(42u32, EncryptedType::Uint32, &ctx).unwrap();
    let value = h
        .client
        .decrypt(&input.handles[0], &ctx, Some(&wallet))
        .await
        .unwrap();
    assert_eq!(value.as_u64(), Some(42));

    let body = h.gateway.last_body.lock().unwrap().clone().unwrap();
    assert_eq!(body["handle"], input.handles[0].to_string());
    assert_eq!(body["contractAddress"], ctx.contract_address.to_checksum(None));
    assert_eq!(body["userAddress"], wallet.address().to_checksum(None));
    assert_eq!(body["publicKey"], hex::encode(NETWORK_KEY));
    assert!(body["signature"].as_str().unwrap().starts_with("0x"));
}

#[tokio::test]
async fn test_packed_input_decrypts_in_order() {
    let h = harness().await;
    let wallet = PrivateKeySigner::random();
    let ctx = context(wallet.address());
    h.client.init().await.unwrap();

    let items = [
        (PlainValue::from(true), EncryptedType::Bool),
        (PlainValue::from(255u8), EncryptedType::Uint8),
        (PlainValue::from(70_000u32), EncryptedType::Uint32),
    ];
    let input = h.client.encrypt_packed(&ctx, &items).unwrap();
    assert_eq!(input.handles.len(), 3);

    let mut values = Vec::new();
    for handle in &input.handles {
        values.push(h.client.decrypt(handle, &ctx, Some(&wallet)).await.unwrap());
    }

    assert_eq!(values[0], DecryptedValue::Bool(true));
    assert_eq!(values[1].as_u64(), Some(255));
    assert_eq!(values[2].as_u64(), Some(70_000));
}

#[tokio::test]
async fn test_decrypt_with_retry_recovers_and_signs_once() {
    let h = harness().await;
    let signer = CountingSigner {
        inner: PrivateKeySigner::random(),
        calls: AtomicUsize::new(0),
    };
    let ctx = context(signer.inner.address());
    h.client.init().await.unwrap();

    let input = h.client.encrypt(7u64, EncryptedType::Uint64, &ctx).unwrap();
    h.gateway.fail_first.store(2, Ordering::SeqCst);

    let policy = RetryPolicy::new(3, Duration::from_millis(10), 2.0);
    let value = h
        .client
        .decrypt_with_retry(&input.handles[0], &ctx, Some(&signer), &policy)
        .await
        .unwrap();

    assert_eq!(value.as_u64(), Some(7));
    assert_eq!(h.gateway.decrypt_hits.load(Ordering::SeqCst), 3);
    assert_eq!(signer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_plain_decrypt_surfaces_gateway_error() {
    let h = harness().await;
    let wallet = PrivateKeySigner::random();
    let ctx = context(wallet.address());
    h.client.init().await.unwrap();

    let input = h.client.encrypt(1u16, EncryptedType::Uint16, &ctx).unwrap();
    h.gateway.fail_first.store(1, Ordering::SeqCst);

    let err = h
        .client
        .decrypt(&input.handles[0], &ctx, Some(&wallet))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Gateway { status: 500, .. }));
    assert_eq!(h.gateway.decrypt_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_decrypt_without_signer_never_calls_gateway() {
    let h = harness().await;
    let ctx = context(Address::repeat_byte(0x0e));
    h.client.init().await.unwrap();

    let input = h.client.encrypt(3u8, EncryptedType::Uint8, &ctx).unwrap();
    let err = h
        .client
        .decrypt(&input.handles[0], &ctx, None)
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::SignerUnavailable));
    assert_eq!(h.gateway.decrypt_hits.load(Ordering::SeqCst), 0);
}
