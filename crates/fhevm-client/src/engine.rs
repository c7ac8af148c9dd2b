//! Encryption engine boundary
//!
//! The FHE primitives (key handling, ciphertext math, input proofs) live in
//! an external engine. This module defines the narrow interface the client
//! needs from it and the adapter that drives it:
//!
//! 1. [`EngineProvider`] builds an engine once per client initialization
//! 2. [`FheEngine`] opens one encrypted-input buffer per (contract, user) context
//! 3. [`EncryptedInputBuilder`] accumulates typed values and finalizes them into
//!    handles plus a single input proof

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use fhevm_core::{
    encode, Address, Bytes, EncryptedType, EncryptionContext, EngineValue, Handle, PlainValue,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ClientError, Result};

/// Error reported by the external encryption engine
#[derive(Debug, Error)]
#[error("{message}")]
pub struct EngineError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an engine-specific error, keeping it as the cause
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Parameters handed to the engine provider at initialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineParams {
    pub chain_id: u64,
    pub acl_address: Address,
    pub gateway_url: String,
    /// Network public key material
    pub public_key: Bytes,
}

/// Creates encryption engines; called once per initialization attempt
#[async_trait]
pub trait EngineProvider: Send + Sync {
    async fn create_engine(
        &self,
        params: EngineParams,
    ) -> std::result::Result<Arc<dyn FheEngine>, EngineError>;
}

/// A ready encryption engine
pub trait FheEngine: Send + Sync {
    /// Open a fresh encrypted-input buffer bound to `context`
    fn create_input(&self, context: &EncryptionContext) -> Box<dyn EncryptedInputBuilder>;

    /// Public decryption key material scoped to `address`
    fn public_key(&self, address: &Address) -> Option<Bytes>;
}

/// One encrypted-input buffer
///
/// Values are added in order; `encrypt` consumes the buffer and returns one
/// handle per added value plus one proof covering all of them.
pub trait EncryptedInputBuilder: Send {
    fn add_bool(&mut self, value: bool) -> std::result::Result<(), EngineError>;
    fn add_u8(&mut self, value: u8) -> std::result::Result<(), EngineError>;
    fn add_u16(&mut self, value: u16) -> std::result::Result<(), EngineError>;
    fn add_u32(&mut self, value: u32) -> std::result::Result<(), EngineError>;
    fn add_u64(&mut self, value: u64) -> std::result::Result<(), EngineError>;
    fn add_u128(&mut self, value: u128) -> std::result::Result<(), EngineError>;
    fn add_address(&mut self, value: Address) -> std::result::Result<(), EngineError>;
    fn encrypt(self: Box<Self>) -> std::result::Result<EncryptedInput, EngineError>;
}

/// Ciphertext handles plus the proof covering them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedInput {
    /// One handle per submitted value, in submission order
    pub handles: Vec<Handle>,
    pub input_proof: Bytes,
}

/// Public decryption key material
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(Bytes);

impl PublicKey {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    /// Hex without `0x`, as sent to the gateway
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Hex with `0x`, as embedded in the signed authorization
    pub fn to_prefixed_hex(&self) -> String {
        format!("0x{}", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", fhevm_core::shorten_hex(&self.to_prefixed_hex()))
    }
}

/// Drives the external engine on behalf of the client
///
/// A detached adapter has no engine yet and fails every call with
/// [`ClientError::EngineNotReady`].
#[derive(Clone, Default)]
pub struct EngineAdapter {
    engine: Option<Arc<dyn FheEngine>>,
}

impl EngineAdapter {
    pub fn new(engine: Arc<dyn FheEngine>) -> Self {
        Self {
            engine: Some(engine),
        }
    }

    pub fn detached() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.engine.is_some()
    }

    fn engine(&self) -> Result<&Arc<dyn FheEngine>> {
        self.engine.as_ref().ok_or(ClientError::EngineNotReady)
    }

    /// Key material for `address`, used to authorize decryption
    pub fn public_key(&self, address: &Address) -> Result<PublicKey> {
        self.engine()?
            .public_key(address)
            .map(PublicKey::new)
            .ok_or(ClientError::PublicKeyUnavailable(*address))
    }

    /// Encrypt a single value in its own buffer
    pub fn encrypt_one(
        &self,
        context: &EncryptionContext,
        value: &PlainValue,
        ty: EncryptedType,
    ) -> Result<EncryptedInput> {
        self.encrypt_packed(context, &[(*value, ty)])
    }

    /// Encrypt each value in its own buffer, concurrently
    ///
    /// Returns one independent [`EncryptedInput`] per item, in item order.
    pub async fn encrypt_batch(
        &self,
        context: &EncryptionContext,
        items: &[(PlainValue, EncryptedType)],
    ) -> Result<Vec<EncryptedInput>> {
        self.engine()?;

        let encryptions = items
            .iter()
            .map(|(value, ty)| async move { self.encrypt_one(context, value, *ty) });

        futures::future::try_join_all(encryptions).await
    }

    /// Encrypt all values into one buffer, producing one proof for the batch
    pub fn encrypt_packed(
        &self,
        context: &EncryptionContext,
        items: &[(PlainValue, EncryptedType)],
    ) -> Result<EncryptedInput> {
        let engine = self.engine()?;

        if items.is_empty() {
            return Err(ClientError::EncryptionFailed(EngineError::new(
                "no values to encrypt",
            )));
        }

        // Reject bad values before the engine sees any of them
        let encoded = items
            .iter()
            .map(|(value, ty)| encode(value, *ty))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut input = engine.create_input(context);
        for value in &encoded {
            add_value(input.as_mut(), value).map_err(ClientError::EncryptionFailed)?;
        }
        let encrypted = input.encrypt().map_err(ClientError::EncryptionFailed)?;

        if encrypted.handles.len() != encoded.len() {
            return Err(ClientError::EncryptionFailed(EngineError::new(format!(
                "engine returned {} handles for {} values",
                encrypted.handles.len(),
                encoded.len()
            ))));
        }

        tracing::debug!(
            contract = %context.contract_address,
            user = %context.user_address,
            values = encoded.len(),
            proof_len = encrypted.input_proof.len(),
            "Encrypted input"
        );

        Ok(encrypted)
    }
}

/// Width dispatch: the one place an engine value meets the builder API
fn add_value(
    input: &mut dyn EncryptedInputBuilder,
    value: &EngineValue,
) -> std::result::Result<(), EngineError> {
    match *value {
        EngineValue::Bool(v) => input.add_bool(v),
        EngineValue::U8(v) => input.add_u8(v),
        EngineValue::U16(v) => input.add_u16(v),
        EngineValue::U32(v) => input.add_u32(v),
        EngineValue::U64(v) => input.add_u64(v),
        EngineValue::U128(v) => input.add_u128(v),
        EngineValue::Address(v) => input.add_address(v),
    }
}
