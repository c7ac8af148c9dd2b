//! Client error types

use std::sync::Arc;

use thiserror::Error;

use crate::engine::EngineError;
use crate::signer::SignerError;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("FHEVM client not initialized. Call init() first.")]
    ClientNotInitialized,

    #[error("Failed to initialize FHEVM client: {0}")]
    InitializationFailed(#[source] Arc<ClientError>),

    #[error("Invalid value: {0}")]
    InvalidValue(#[from] fhevm_core::ValueError),

    #[error("Encryption engine not ready")]
    EngineNotReady,

    #[error("No public key available for {0}")]
    PublicKeyUnavailable(fhevm_core::Address),

    #[error("Encryption engine unavailable: {0}")]
    EngineUnavailable(#[source] EngineError),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(#[source] EngineError),

    #[error("No signer available to authorize decryption")]
    SignerUnavailable,

    #[error("Signing rejected: {0}")]
    SigningRejected(#[source] SignerError),

    #[error("Transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Gateway request failed: {status} {status_text}")]
    Gateway { status: u16, status_text: String },

    #[error("Invalid gateway response: {message}")]
    Protocol {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Rate limit exceeded for {key}")]
    RateLimited { key: String },

    #[error("Config error: {0}")]
    Config(#[from] fhevm_core::Error),
}

impl ClientError {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        ClientError::Protocol {
            message: message.into(),
            source: None,
        }
    }

    /// Whether retrying the same request may succeed
    ///
    /// Only network and service errors qualify. Caller bugs, signer refusals
    /// and lifecycle errors are never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Transport(_) | ClientError::Gateway { .. } | ClientError::Protocol { .. }
        )
    }

    /// Stable error code for logs and API consumers
    pub fn code(&self) -> &'static str {
        match self {
            ClientError::ClientNotInitialized => "CLIENT_NOT_INITIALIZED",
            ClientError::InitializationFailed(_) => "INITIALIZATION_FAILED",
            ClientError::InvalidValue(_) => "INVALID_VALUE",
            ClientError::EngineNotReady => "ENGINE_NOT_READY",
            ClientError::PublicKeyUnavailable(_) => "PUBLIC_KEY_UNAVAILABLE",
            ClientError::EngineUnavailable(_) => "ENGINE_UNAVAILABLE",
            ClientError::EncryptionFailed(_) => "ENCRYPTION_FAILED",
            ClientError::SignerUnavailable => "SIGNER_UNAVAILABLE",
            ClientError::SigningRejected(_) => "SIGNING_REJECTED",
            ClientError::Transport(_) => "TRANSPORT_ERROR",
            ClientError::Gateway { .. } => "GATEWAY_ERROR",
            ClientError::Protocol { .. } => "PROTOCOL_ERROR",
            ClientError::RateLimited { .. } => "RATE_LIMITED",
            ClientError::Config(_) => "CONFIG_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
