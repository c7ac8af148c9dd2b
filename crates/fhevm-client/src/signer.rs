//! Decryption authorization
//!
//! Decrypting a handle requires an EIP-712 signature over the requester's
//! public key, domain-separated by chain id and the contract that owns the
//! handle. The typed data must match what the gateway verifies exactly:
//!
//! ```json
//! {
//!   "domain": {"name": "Authorization token", "version": "1",
//!              "chainId": 11155111, "verifyingContract": "0x..."},
//!   "types": {"Reencrypt": [{"name": "publicKey", "type": "bytes"}]},
//!   "message": {"publicKey": "0x..."}
//! }
//! ```

use std::borrow::Cow;

use alloy_primitives::{B256, U256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{sol, Eip712Domain, SolStruct};
use async_trait::async_trait;
use fhevm_core::Address;
use serde::Serialize;
use thiserror::Error;

use crate::engine::{EngineAdapter, PublicKey};
use crate::error::{ClientError, Result};

pub const AUTHORIZATION_DOMAIN_NAME: &str = "Authorization token";
pub const AUTHORIZATION_DOMAIN_VERSION: &str = "1";

sol! {
    #[derive(Debug)]
    struct Reencrypt {
        bytes publicKey;
    }
}

/// Failure reported by a signing capability
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("signature request declined: {0}")]
    Declined(String),

    #[error("signer returned an empty signature")]
    EmptySignature,

    #[error("local signer error: {0}")]
    Local(#[from] alloy_signer::Error),

    #[error("{0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// External "sign structured data" capability (wallet, KMS, local key)
#[async_trait]
pub trait TypedDataSigner: Send + Sync {
    /// Sign `message`, returning a `0x`-prefixed signature
    async fn sign_typed_data(
        &self,
        message: &AuthorizationMessage,
    ) -> std::result::Result<String, SignerError>;
}

#[async_trait]
impl TypedDataSigner for PrivateKeySigner {
    async fn sign_typed_data(
        &self,
        message: &AuthorizationMessage,
    ) -> std::result::Result<String, SignerError> {
        let signature = self.sign_hash_sync(&message.signing_hash())?;
        Ok(format!("0x{}", hex::encode(signature.as_bytes())))
    }
}

/// The only message ever signed for decryption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationMessage {
    chain_id: u64,
    verifying_contract: Address,
    public_key: PublicKey,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DomainView {
    name: &'static str,
    version: &'static str,
    chain_id: u64,
    verifying_contract: String,
}

#[derive(Debug, Serialize)]
struct FieldView {
    name: &'static str,
    #[serde(rename = "type")]
    ty: &'static str,
}

#[derive(Debug, Serialize)]
struct TypesView {
    #[serde(rename = "Reencrypt")]
    reencrypt: [FieldView; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageView {
    public_key: String,
}

/// JSON shape handed to wallets implementing `eth_signTypedData`
#[derive(Debug, Serialize)]
pub struct TypedDataView {
    domain: DomainView,
    types: TypesView,
    message: MessageView,
}

impl AuthorizationMessage {
    pub fn new(chain_id: u64, verifying_contract: Address, public_key: PublicKey) -> Self {
        Self {
            chain_id,
            verifying_contract,
            public_key,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn verifying_contract(&self) -> Address {
        self.verifying_contract
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn typed_data(&self) -> TypedDataView {
        TypedDataView {
            domain: DomainView {
                name: AUTHORIZATION_DOMAIN_NAME,
                version: AUTHORIZATION_DOMAIN_VERSION,
                chain_id: self.chain_id,
                verifying_contract: self.verifying_contract.to_checksum(None),
            },
            types: TypesView {
                reencrypt: [FieldView {
                    name: "publicKey",
                    ty: "bytes",
                }],
            },
            message: MessageView {
                public_key: self.public_key.to_prefixed_hex(),
            },
        }
    }

    /// `{domain, types, message}` as a JSON value
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!(self.typed_data())
    }

    pub fn domain(&self) -> Eip712Domain {
        Eip712Domain::new(
            Some(Cow::Borrowed(AUTHORIZATION_DOMAIN_NAME)),
            Some(Cow::Borrowed(AUTHORIZATION_DOMAIN_VERSION)),
            Some(U256::from(self.chain_id)),
            Some(self.verifying_contract),
            None,
        )
    }

    /// EIP-712 digest the signature commits to
    pub fn signing_hash(&self) -> B256 {
        let payload = Reencrypt {
            publicKey: self.public_key.as_bytes().clone(),
        };
        payload.eip712_signing_hash(&self.domain())
    }
}

/// Signature plus the key it authorizes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub signature: String,
    pub public_key: PublicKey,
}

/// Ask `signer` to sign `message`
///
/// Every failure of the capability, including the holder declining, is a
/// [`ClientError::SigningRejected`]. Nothing here is ever retried.
pub async fn sign_message(
    message: &AuthorizationMessage,
    signer: Option<&dyn TypedDataSigner>,
) -> Result<String> {
    let signer = signer.ok_or(ClientError::SignerUnavailable)?;

    let signature = signer
        .sign_typed_data(message)
        .await
        .map_err(ClientError::SigningRejected)?;

    if signature.trim().is_empty() || signature.trim() == "0x" {
        return Err(ClientError::SigningRejected(SignerError::EmptySignature));
    }

    Ok(signature)
}

/// Builds and signs decryption authorizations
///
/// The public key always comes from the engine, scoped to the contract.
/// Signatures are not cached; each call asks the signer again.
#[derive(Clone)]
pub struct AuthorizationSigner {
    engine: EngineAdapter,
}

impl AuthorizationSigner {
    pub fn new(engine: EngineAdapter) -> Self {
        Self { engine }
    }

    pub fn message(&self, contract: Address, chain_id: u64) -> Result<AuthorizationMessage> {
        let public_key = self.engine.public_key(&contract)?;
        Ok(AuthorizationMessage::new(chain_id, contract, public_key))
    }

    pub async fn sign(
        &self,
        contract: Address,
        chain_id: u64,
        signer: Option<&dyn TypedDataSigner>,
    ) -> Result<Authorization> {
        let message = self.message(contract, chain_id)?;

        tracing::debug!(
            chain_id,
            contract = %contract,
            "Requesting decryption authorization signature"
        );

        let signature = sign_message(&message, signer).await?;

        Ok(Authorization {
            signature,
            public_key: message.public_key,
        })
    }
}
