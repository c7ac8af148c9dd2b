//! Core error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Unsupported encrypted type: {0}")]
    UnknownType(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}
