//! fhevm-client: encryption, authorization and decryption for fhEVM
//!
//! [`FhevmClient`] drives an external FHE engine to turn plaintext values
//! into ciphertext handles, and asks the gateway to decrypt handles on
//! presentation of an EIP-712 authorization signed by the caller.

pub mod client;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod resilience;
pub mod signer;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use client::{ClientBuilder, ClientState, FhevmClient};
pub use engine::{
    EncryptedInput, EncryptedInputBuilder, EngineAdapter, EngineError, EngineParams,
    EngineProvider, FheEngine, PublicKey,
};
pub use error::{ClientError, Result};
pub use gateway::{DecryptedValue, DecryptionRequest, GatewayClient};
pub use resilience::{retry, retry_if, RateLimiter, RetryPolicy};
pub use signer::{
    Authorization, AuthorizationMessage, AuthorizationSigner, SignerError, TypedDataSigner,
};
