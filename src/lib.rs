//! fhevm-sdk: client SDK for confidential contracts on fhEVM
//!
//! Re-exports the two workspace crates:
//! - [`fhevm_core`]: encrypted types, value codec, configuration
//! - [`fhevm_client`]: engine adapter, authorization signer, gateway client and
//!   the [`FhevmClient`] façade

pub use fhevm_client;
pub use fhevm_core;

pub use fhevm_client::{
    ClientBuilder, ClientError, ClientState, DecryptedValue, EncryptedInput, FhevmClient,
    PublicKey, RateLimiter, RetryPolicy, TypedDataSigner,
};
pub use fhevm_core::{ClientConfig, EncryptedType, EncryptionContext, Handle, PlainValue};
