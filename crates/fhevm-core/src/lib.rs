//! fhevm-core: Core types for the fhEVM client SDK
//!
//! This crate holds everything that does not talk to the network:
//! - Encrypted types and the plaintext values they accept
//! - The typed-value codec (validation and width dispatch)
//! - Address and handle parsing
//! - Client configuration and chain presets
//!
//! The encryption engine, signer and gateway live in `fhevm-client`.

mod address;
pub mod codec;
mod config;
mod error;
mod types;

pub use address::{parse_address, parse_handle, shorten_hex};
pub use codec::{encode, validate, EngineValue, ValueError};
pub use config::{
    chain_preset, is_supported_chain, ChainPreset, ClientConfig, KeySource,
    DEFAULT_GATEWAY_URL, DEFAULT_PUBLIC_KEY_ENDPOINT, DEFAULT_REQUEST_TIMEOUT_MS,
    SEPOLIA_CHAIN_ID, SUPPORTED_CHAINS,
};
pub use error::Error;
pub use types::{EncryptedType, EncryptionContext, PlainValue};

pub use alloy_primitives::{Address, Bytes, U256};

pub type Result<T> = std::result::Result<T, Error>;

/// Opaque ciphertext reference returned by encryption
pub type Handle = Bytes;
