//! Decryption gateway HTTP client
//!
//! One POST per decryption request, no built-in retry. Failures map to:
//! - network-level (timeout, DNS, reset) -> [`ClientError::Transport`]
//! - non-2xx status -> [`ClientError::Gateway`]
//! - 2xx with an unusable body -> [`ClientError::Protocol`]

use std::time::Duration;

use fhevm_core::{Bytes, ClientConfig, EncryptionContext, Handle, U256};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};
use crate::signer::Authorization;

/// Body of `POST {gateway}/decrypt`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptionRequest {
    pub handle: String,
    pub contract_address: String,
    pub user_address: String,
    pub signature: String,
    pub public_key: String,
}

impl DecryptionRequest {
    pub fn new(handle: &Handle, context: &EncryptionContext, authorization: &Authorization) -> Self {
        Self {
            handle: handle.to_string(),
            contract_address: context.contract_address.to_checksum(None),
            user_address: context.user_address.to_checksum(None),
            signature: authorization.signature.clone(),
            public_key: authorization.public_key.to_hex(),
        }
    }
}

/// Plaintext returned by the gateway
///
/// The gateway does not say which type the handle was; callers read it back
/// with the accessor matching the type they encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptedValue {
    Bool(bool),
    Uint(U256),
}

impl DecryptedValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DecryptedValue::Bool(b) => Some(*b),
            DecryptedValue::Uint(_) => None,
        }
    }

    pub fn as_u256(&self) -> Option<U256> {
        match self {
            DecryptedValue::Uint(v) => Some(*v),
            DecryptedValue::Bool(_) => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_u256().and_then(|v| u64::try_from(v).ok())
    }

    pub fn as_u128(&self) -> Option<u128> {
        self.as_u256().and_then(|v| u128::try_from(v).ok())
    }
}

impl std::fmt::Display for DecryptedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecryptedValue::Bool(b) => write!(f, "{b}"),
            DecryptedValue::Uint(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawValue {
    Bool(bool),
    Number(serde_json::Number),
    // Values above 2^53 may arrive as decimal or 0x strings
    Text(String),
}

#[derive(Deserialize)]
struct DecryptionResponse {
    value: RawValue,
}

impl TryFrom<RawValue> for DecryptedValue {
    type Error = ClientError;

    fn try_from(raw: RawValue) -> Result<Self> {
        match raw {
            RawValue::Bool(b) => Ok(DecryptedValue::Bool(b)),
            RawValue::Number(n) => n
                .as_u64()
                .map(|v| DecryptedValue::Uint(U256::from(v)))
                .ok_or_else(|| {
                    ClientError::protocol(format!("value {n} is not a non-negative integer"))
                }),
            RawValue::Text(s) => s
                .trim()
                .parse::<U256>()
                .map(DecryptedValue::Uint)
                .map_err(|_| ClientError::protocol(format!("value {s:?} is not an integer"))),
        }
    }
}

/// HTTP client for the decryption gateway and the public key endpoint
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: Client,
    base_url: String,
}

impl GatewayClient {
    /// Create a client; `timeout` bounds every request end to end
    ///
    /// `None` or a zero duration means no timeout.
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout.filter(|t| !t.is_zero()) {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ClientError::Transport)?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(config.gateway_url.clone(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Ask the gateway to decrypt one handle
    pub async fn request_decryption(&self, request: &DecryptionRequest) -> Result<DecryptedValue> {
        let url = format!("{}/decrypt", self.base_url);

        tracing::debug!(
            handle = %fhevm_core::shorten_hex(&request.handle),
            contract = %request.contract_address,
            "Requesting decryption"
        );

        let resp = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(ClientError::Transport)?;

        let resp = check_status(resp)?;
        let body = resp.text().await.map_err(ClientError::Transport)?;

        let parsed: DecryptionResponse =
            serde_json::from_str(&body).map_err(|e| ClientError::Protocol {
                message: "malformed decryption response".to_string(),
                source: Some(e),
            })?;

        DecryptedValue::try_from(parsed.value)
    }

    /// Download the network public key material from `url`
    pub async fn fetch_public_key(&self, url: &str) -> Result<Bytes> {
        tracing::debug!(url, "Fetching network public key");

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(ClientError::Transport)?;

        let resp = check_status(resp)?;
        let bytes = resp.bytes().await.map_err(ClientError::Transport)?;

        if bytes.is_empty() {
            return Err(ClientError::protocol("empty public key response"));
        }

        Ok(Bytes::from(bytes))
    }
}

fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    tracing::warn!(status = status.as_u16(), url = %resp.url(), "Gateway request failed");

    Err(ClientError::Gateway {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PublicKey;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use fhevm_core::Address;
    use serde_json::{json, Value};
    use std::error::Error as _;

    async fn spawn_gateway(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn sample_request() -> DecryptionRequest {
        let context = EncryptionContext::new(Address::repeat_byte(0xaa), Address::repeat_byte(0xbb));
        let authorization = Authorization {
            signature: "0xsig".into(),
            public_key: PublicKey::new(vec![0x01, 0x02]),
        };
        DecryptionRequest::new(&Bytes::from(vec![0xffu8; 4]), &context, &authorization)
    }

    fn gateway_returning(status: StatusCode, body: &'static str) -> Router {
        Router::new().route("/decrypt", post(move || async move { (status, body) }))
    }

    #[test]
    fn test_request_body_fields() {
        let body = serde_json::to_value(sample_request()).unwrap();
        assert_eq!(
            body,
            json!({
                "handle": "0xffffffff",
                "contractAddress": Address::repeat_byte(0xaa).to_checksum(None),
                "userAddress": Address::repeat_byte(0xbb).to_checksum(None),
                "signature": "0xsig",
                "publicKey": "0102",
            })
        );
    }

    #[tokio::test]
    async fn test_decrypt_posts_request_and_parses_value() {
        let router = Router::new().route(
            "/decrypt",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["handle"], "0xffffffff");
                assert_eq!(body["publicKey"], "0102");
                Json(json!({"value": 42}))
            }),
        );
        let url = spawn_gateway(router).await;
        let client = GatewayClient::new(url, None).unwrap();

        let value = client.request_decryption(&sample_request()).await.unwrap();
        assert_eq!(value.as_u64(), Some(42));
        assert_eq!(value.as_bool(), None);
    }

    #[tokio::test]
    async fn test_zero_timeout_means_no_timeout() {
        let url = spawn_gateway(gateway_returning(StatusCode::OK, r#"{"value": 5}"#)).await;

        let client = GatewayClient::new(url.clone(), Some(Duration::ZERO)).unwrap();
        let value = client.request_decryption(&sample_request()).await.unwrap();
        assert_eq!(value.as_u64(), Some(5));

        let config: ClientConfig = serde_json::from_value(json!({
            "chain_id": 11_155_111,
            "gateway_url": url,
            "request_timeout_ms": 0
        }))
        .unwrap();
        let client = GatewayClient::from_config(&config).unwrap();
        let value = client.request_decryption(&sample_request()).await.unwrap();
        assert_eq!(value.as_u64(), Some(5));
    }

    #[tokio::test]
    async fn test_decrypt_bool_and_large_values() {
        let url = spawn_gateway(gateway_returning(StatusCode::OK, r#"{"value": true}"#)).await;
        let client = GatewayClient::new(url, None).unwrap();
        let value = client.request_decryption(&sample_request()).await.unwrap();
        assert_eq!(value, DecryptedValue::Bool(true));

        let url = spawn_gateway(gateway_returning(
            StatusCode::OK,
            r#"{"value": "340282366920938463463374607431768211455"}"#,
        ))
        .await;
        let client = GatewayClient::new(url, None).unwrap();
        let value = client.request_decryption(&sample_request()).await.unwrap();
        assert_eq!(value.as_u128(), Some(u128::MAX));
        assert_eq!(value.as_u64(), None);
    }

    #[tokio::test]
    async fn test_server_error_is_gateway_error() {
        let url = spawn_gateway(gateway_returning(StatusCode::INTERNAL_SERVER_ERROR, "boom")).await;
        let client = GatewayClient::new(url, None).unwrap();

        let err = client.request_decryption(&sample_request()).await.unwrap_err();
        match err {
            ClientError::Gateway { status, status_text } => {
                assert_eq!(status, 500);
                assert_eq!(status_text, "Internal Server Error");
            }
            other => panic!("expected gateway error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_protocol_error() {
        let url = spawn_gateway(gateway_returning(StatusCode::OK, "{not json")).await;
        let client = GatewayClient::new(url, None).unwrap();

        let err = client.request_decryption(&sample_request()).await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol { .. }));
        assert!(err.source().is_some());
        assert_ne!(err.code(), "GATEWAY_ERROR");
    }

    #[tokio::test]
    async fn test_unusable_value_is_protocol_error() {
        for body in [r#"{"value": -1}"#, r#"{"value": 1.5}"#, r#"{"value": "abc"}"#, r#"{}"#] {
            let url = spawn_gateway(gateway_returning(StatusCode::OK, body)).await;
            let client = GatewayClient::new(url, None).unwrap();
            let err = client.request_decryption(&sample_request()).await.unwrap_err();
            assert!(matches!(err, ClientError::Protocol { .. }), "body {body}");
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = GatewayClient::new(format!("http://{addr}"), None).unwrap();
        let err = client.request_decryption(&sample_request()).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_timeout_is_transport_error() {
        let router = Router::new().route(
            "/decrypt",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({"value": 1}))
            }),
        );
        let url = spawn_gateway(router).await;
        let client = GatewayClient::new(url, Some(Duration::from_millis(100))).unwrap();

        let err = client.request_decryption(&sample_request()).await.unwrap_err();
        match err {
            ClientError::Transport(e) => assert!(e.is_timeout()),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_public_key() {
        let router = Router::new().route("/fhe-public-key", get(|| async { vec![7u8, 8, 9] }));
        let url = spawn_gateway(router).await;
        let client = GatewayClient::new(url.clone(), None).unwrap();

        let key = client
            .fetch_public_key(&format!("{url}/fhe-public-key"))
            .await
            .unwrap();
        assert_eq!(key.as_ref(), &[7u8, 8, 9]);

        let err = client
            .fetch_public_key(&format!("{url}/missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Gateway { status: 404, .. }));
    }
}
