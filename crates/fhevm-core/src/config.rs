//! Client configuration and per-chain presets

use std::time::Duration;

use alloy_primitives::{Address, Bytes};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{parse_address, Error, Result};

/// Default path of the network public key, relative to the gateway
pub const DEFAULT_PUBLIC_KEY_ENDPOINT: &str = "/fhe-public-key";

/// Default decryption gateway (Sepolia)
pub const DEFAULT_GATEWAY_URL: &str = "https://gateway.sepolia.zama.ai";

/// Default request timeout for gateway and key endpoint calls
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Sepolia testnet chain id
pub const SEPOLIA_CHAIN_ID: u64 = 11_155_111;

/// Known network with a hosted gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainPreset {
    pub chain_id: u64,
    pub name: &'static str,
    pub gateway_url: &'static str,
}

/// Networks the SDK ships defaults for
pub const SUPPORTED_CHAINS: &[ChainPreset] = &[ChainPreset {
    chain_id: SEPOLIA_CHAIN_ID,
    name: "sepolia",
    gateway_url: DEFAULT_GATEWAY_URL,
}];

pub fn is_supported_chain(chain_id: u64) -> bool {
    chain_preset(chain_id).is_some()
}

pub fn chain_preset(chain_id: u64) -> Option<&'static ChainPreset> {
    SUPPORTED_CHAINS.iter().find(|p| p.chain_id == chain_id)
}

/// Where the network's FHE public key comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    /// Fetched at init time. Relative paths are resolved against the gateway URL.
    Endpoint(String),
    /// Key material fetched ahead of time
    Bytes(Bytes),
}

impl Default for KeySource {
    fn default() -> Self {
        KeySource::Endpoint(DEFAULT_PUBLIC_KEY_ENDPOINT.to_string())
    }
}

fn default_gateway_url() -> String {
    DEFAULT_GATEWAY_URL.to_string()
}

fn default_request_timeout_ms() -> Option<u64> {
    Some(DEFAULT_REQUEST_TIMEOUT_MS)
}

/// `0` means no timeout, same as `null`
fn deserialize_request_timeout_ms<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.filter(|ms| *ms > 0))
}

/// Client configuration, immutable once a client has been built from it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub chain_id: u64,
    #[serde(default)]
    pub key_source: KeySource,
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    #[serde(default)]
    pub acl_address: Address,
    /// `None` (or `0`) disables the timeout
    #[serde(
        default = "default_request_timeout_ms",
        deserialize_with = "deserialize_request_timeout_ms"
    )]
    pub request_timeout_ms: Option<u64>,
}

impl ClientConfig {
    /// Configuration with defaults for every optional field
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            key_source: KeySource::default(),
            gateway_url: default_gateway_url(),
            acl_address: Address::ZERO,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }

    /// Configuration using the chain's preset gateway when one is known
    pub fn for_chain(chain_id: u64) -> Self {
        let config = Self::new(chain_id);
        match chain_preset(chain_id) {
            Some(preset) => config.with_gateway_url(preset.gateway_url),
            None => config,
        }
    }

    pub fn with_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_key_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.key_source = KeySource::Endpoint(endpoint.into());
        self
    }

    pub fn with_key_bytes(mut self, key: impl Into<Bytes>) -> Self {
        self.key_source = KeySource::Bytes(key.into());
        self
    }

    pub fn with_acl_address(mut self, address: Address) -> Self {
        self.acl_address = address;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout_ms = timeout
            .map(|t| t.as_millis().min(u64::MAX as u128) as u64)
            .filter(|ms| *ms > 0);
        self
    }

    /// Effective timeout; a zero value disables it
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Gateway URL with `path` appended
    pub fn gateway_endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.gateway_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Absolute URLs are kept, paths are resolved against the gateway URL
    pub fn resolve_endpoint(&self, endpoint: &str) -> String {
        if is_absolute_url(endpoint) {
            endpoint.to_string()
        } else {
            self.gateway_endpoint(endpoint)
        }
    }

    /// Absolute URL of the public key endpoint, if the key is not pre-fetched
    pub fn key_endpoint_url(&self) -> Option<String> {
        match &self.key_source {
            KeySource::Endpoint(endpoint) => Some(self.resolve_endpoint(endpoint)),
            KeySource::Bytes(_) => None,
        }
    }

    /// Check the configuration before a client is built from it
    pub fn validate(&self) -> Result<()> {
        if self.chain_id == 0 {
            return Err(Error::InvalidConfig("chain_id must be non-zero".into()));
        }
        if !is_absolute_url(&self.gateway_url) {
            return Err(Error::InvalidConfig(format!(
                "gateway_url must be an http(s) URL, got {:?}",
                self.gateway_url
            )));
        }
        match &self.key_source {
            KeySource::Endpoint(endpoint) if endpoint.trim().is_empty() => Err(
                Error::InvalidConfig("public key endpoint must not be empty".into()),
            ),
            KeySource::Bytes(bytes) if bytes.is_empty() => Err(Error::InvalidConfig(
                "pre-fetched public key must not be empty".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Load from `FHEVM_*` environment variables
    ///
    /// `FHEVM_CHAIN_ID` is required; `FHEVM_GATEWAY_URL`,
    /// `FHEVM_PUBLIC_KEY_ENDPOINT`, `FHEVM_ACL_ADDRESS` and
    /// `FHEVM_REQUEST_TIMEOUT_MS` (0 disables) are optional.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with a custom variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let chain_id = lookup("FHEVM_CHAIN_ID")
            .ok_or_else(|| Error::InvalidConfig("FHEVM_CHAIN_ID is not set".into()))?
            .trim()
            .parse::<u64>()
            .map_err(|e| Error::InvalidConfig(format!("FHEVM_CHAIN_ID: {e}")))?;

        let mut config = Self::for_chain(chain_id);

        if let Some(url) = lookup("FHEVM_GATEWAY_URL") {
            config = config.with_gateway_url(url);
        }
        if let Some(endpoint) = lookup("FHEVM_PUBLIC_KEY_ENDPOINT") {
            config = config.with_key_endpoint(endpoint);
        }
        if let Some(acl) = lookup("FHEVM_ACL_ADDRESS") {
            config = config.with_acl_address(parse_address(&acl)?);
        }
        if let Some(timeout) = lookup("FHEVM_REQUEST_TIMEOUT_MS") {
            let ms = timeout
                .trim()
                .parse::<u64>()
                .map_err(|e| Error::InvalidConfig(format!("FHEVM_REQUEST_TIMEOUT_MS: {e}")))?;
            config.request_timeout_ms = (ms > 0).then_some(ms);
        }

        config.validate()?;
        Ok(config)
    }
}

fn is_absolute_url(s: &str) -> bool {
    s.starts_with("https://") || s.starts_with("http://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new(SEPOLIA_CHAIN_ID);
        assert_eq!(config.gateway_url, "https://gateway.sepolia.zama.ai");
        assert_eq!(config.acl_address, Address::ZERO);
        assert_eq!(
            config.key_source,
            KeySource::Endpoint("/fhe-public-key".into())
        );
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(30)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_key_endpoint_resolution() {
        let config = ClientConfig::new(1).with_gateway_url("http://localhost:8080/");
        assert_eq!(
            config.key_endpoint_url().as_deref(),
            Some("http://localhost:8080/fhe-public-key")
        );

        let config = config.with_key_endpoint("https://keys.example/pk");
        assert_eq!(
            config.key_endpoint_url().as_deref(),
            Some("https://keys.example/pk")
        );

        let config = config.with_key_bytes(vec![1u8, 2, 3]);
        assert_eq!(config.key_endpoint_url(), None);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(ClientConfig::new(0).validate().is_err());
        assert!(ClientConfig::new(1)
            .with_gateway_url("gateway.local")
            .validate()
            .is_err());
        assert!(ClientConfig::new(1)
            .with_key_bytes(Vec::<u8>::new())
            .validate()
            .is_err());
    }

    #[test]
    fn test_serde_fills_defaults() {
        let config: ClientConfig = serde_json::from_str(r#"{"chain_id": 11155111}"#).unwrap();
        assert_eq!(config, ClientConfig::new(SEPOLIA_CHAIN_ID));

        let config: ClientConfig = serde_json::from_str(
            r#"{"chain_id": 5, "key_source": {"bytes": "0x0a0b"}, "request_timeout_ms": null}"#,
        )
        .unwrap();
        assert_eq!(config.key_source, KeySource::Bytes(Bytes::from(vec![10u8, 11])));
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn test_zero_timeout_disables_timeout() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"chain_id": 1, "request_timeout_ms": 0}"#).unwrap();
        assert_eq!(config.request_timeout_ms, None);
        assert_eq!(config.request_timeout(), None);

        let config = ClientConfig::new(1).with_request_timeout(Some(Duration::ZERO));
        assert_eq!(config.request_timeout_ms, None);

        let mut config = ClientConfig::new(1);
        config.request_timeout_ms = Some(0);
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("FHEVM_CHAIN_ID", "11155111"),
            ("FHEVM_GATEWAY_URL", "http://127.0.0.1:9000"),
            ("FHEVM_ACL_ADDRESS", "0x1111111111111111111111111111111111111111"),
            ("FHEVM_REQUEST_TIMEOUT_MS", "0"),
        ]
        .into_iter()
        .collect();

        let config = ClientConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.chain_id, SEPOLIA_CHAIN_ID);
        assert_eq!(config.gateway_url, "http://127.0.0.1:9000");
        assert_eq!(config.acl_address, Address::repeat_byte(0x11));
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn test_from_lookup_requires_chain_id() {
        let err = ClientConfig::from_lookup(|_| None).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_supported_chains() {
        assert!(is_supported_chain(SEPOLIA_CHAIN_ID));
        assert!(!is_supported_chain(1));
        assert_eq!(
            ClientConfig::for_chain(1).gateway_url,
            DEFAULT_GATEWAY_URL
        );
    }
}
