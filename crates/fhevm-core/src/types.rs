//! Encrypted value types and the plaintext values they accept

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Encrypted value types supported by the fhEVM
///
/// Each variant has a fixed maximum representable value. `Address` is bounded
/// like a 160-bit unsigned integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncryptedType {
    #[serde(rename = "ebool")]
    Bool,
    #[serde(rename = "euint8")]
    Uint8,
    #[serde(rename = "euint16")]
    Uint16,
    #[serde(rename = "euint32")]
    Uint32,
    #[serde(rename = "euint64")]
    Uint64,
    #[serde(rename = "euint128")]
    Uint128,
    #[serde(rename = "eaddress")]
    Address,
}

impl EncryptedType {
    /// Every supported type, narrowest first
    pub const ALL: [EncryptedType; 7] = [
        EncryptedType::Bool,
        EncryptedType::Uint8,
        EncryptedType::Uint16,
        EncryptedType::Uint32,
        EncryptedType::Uint64,
        EncryptedType::Uint128,
        EncryptedType::Address,
    ];

    /// Number of plaintext bits carried by this type
    pub const fn bits(self) -> usize {
        match self {
            EncryptedType::Bool => 1,
            EncryptedType::Uint8 => 8,
            EncryptedType::Uint16 => 16,
            EncryptedType::Uint32 => 32,
            EncryptedType::Uint64 => 64,
            EncryptedType::Uint128 => 128,
            EncryptedType::Address => 160,
        }
    }

    /// Largest plaintext value representable by this type (`2^bits - 1`)
    pub fn max_value(self) -> U256 {
        U256::MAX >> (256 - self.bits())
    }

    /// Solidity-facing type name (`euint8`, `ebool`, ...)
    pub const fn name(self) -> &'static str {
        match self {
            EncryptedType::Bool => "ebool",
            EncryptedType::Uint8 => "euint8",
            EncryptedType::Uint16 => "euint16",
            EncryptedType::Uint32 => "euint32",
            EncryptedType::Uint64 => "euint64",
            EncryptedType::Uint128 => "euint128",
            EncryptedType::Address => "eaddress",
        }
    }

    pub const fn is_bool(self) -> bool {
        matches!(self, EncryptedType::Bool)
    }
}

impl fmt::Display for EncryptedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EncryptedType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EncryptedType::ALL
            .into_iter()
            .find(|ty| ty.name() == s)
            .ok_or_else(|| Error::UnknownType(s.to_string()))
    }
}

/// Plaintext value submitted for encryption
///
/// Integers are carried as `U256` so that every width, including addresses,
/// fits without loss. Negative values cannot be expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlainValue {
    Bool(bool),
    Uint(U256),
}

impl fmt::Display for PlainValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlainValue::Bool(b) => write!(f, "{b}"),
            PlainValue::Uint(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for PlainValue {
    fn from(value: bool) -> Self {
        PlainValue::Bool(value)
    }
}

macro_rules! impl_from_uint {
    ($($t:ty),*) => {
        $(
            impl From<$t> for PlainValue {
                fn from(value: $t) -> Self {
                    PlainValue::Uint(U256::from(value))
                }
            }
        )*
    };
}

impl_from_uint!(u8, u16, u32, u64, u128, usize);

impl From<U256> for PlainValue {
    fn from(value: U256) -> Self {
        PlainValue::Uint(value)
    }
}

impl From<Address> for PlainValue {
    fn from(value: Address) -> Self {
        PlainValue::Uint(U256::from_be_slice(value.as_slice()))
    }
}

/// Encryption scope: every encrypted input is bound to one contract and one user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionContext {
    pub contract_address: Address,
    pub user_address: Address,
}

impl EncryptionContext {
    pub fn new(contract_address: Address, user_address: Address) -> Self {
        Self {
            contract_address,
            user_address,
        }
    }
}
