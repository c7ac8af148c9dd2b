//! Typed-value codec
//!
//! Validates plaintext values against their encrypted type and narrows them
//! to the primitive width the encryption engine takes. Out-of-range values
//! are rejected, never truncated or clamped.

use alloy_primitives::{Address, U256};
use thiserror::Error;

use crate::{EncryptedType, PlainValue};

/// A validated value, narrowed to the engine's primitive width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineValue {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    U128(u128),
    Address(Address),
}

impl EngineValue {
    /// Encrypted type this value will be submitted as
    pub fn encrypted_type(&self) -> EncryptedType {
        match self {
            EngineValue::Bool(_) => EncryptedType::Bool,
            EngineValue::U8(_) => EncryptedType::Uint8,
            EngineValue::U16(_) => EncryptedType::Uint16,
            EngineValue::U32(_) => EncryptedType::Uint32,
            EngineValue::U64(_) => EncryptedType::Uint64,
            EngineValue::U128(_) => EncryptedType::Uint128,
            EngineValue::Address(_) => EncryptedType::Address,
        }
    }
}

/// Value rejected for its encrypted type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("{ty} expects a boolean value, got {value}")]
    ExpectedBool { ty: EncryptedType, value: PlainValue },

    #[error("{ty} expects an unsigned integer, got {value}")]
    ExpectedInteger { ty: EncryptedType, value: PlainValue },

    #[error("value {value} exceeds maximum for {ty}: {max}")]
    OutOfRange {
        ty: EncryptedType,
        value: U256,
        max: U256,
    },
}

/// Check that `value` can be encrypted as `ty`
pub fn validate(value: &PlainValue, ty: EncryptedType) -> Result<(), ValueError> {
    match (ty, value) {
        (EncryptedType::Bool, PlainValue::Bool(_)) => Ok(()),
        (EncryptedType::Bool, PlainValue::Uint(_)) => Err(ValueError::ExpectedBool {
            ty,
            value: *value,
        }),
        (_, PlainValue::Bool(_)) => Err(ValueError::ExpectedInteger {
            ty,
            value: *value,
        }),
        (_, PlainValue::Uint(v)) => {
            let max = ty.max_value();
            if *v > max {
                return Err(ValueError::OutOfRange { ty, value: *v, max });
            }
            Ok(())
        }
    }
}

/// Validate `value` and narrow it to the width `ty` is encrypted with
pub fn encode(value: &PlainValue, ty: EncryptedType) -> Result<EngineValue, ValueError> {
    validate(value, ty)?;

    let encoded = match (ty, *value) {
        (EncryptedType::Bool, PlainValue::Bool(b)) => EngineValue::Bool(b),
        (EncryptedType::Uint8, PlainValue::Uint(v)) => EngineValue::U8(v.to::<u8>()),
        (EncryptedType::Uint16, PlainValue::Uint(v)) => EngineValue::U16(v.to::<u16>()),
        (EncryptedType::Uint32, PlainValue::Uint(v)) => EngineValue::U32(v.to::<u32>()),
        (EncryptedType::Uint64, PlainValue::Uint(v)) => EngineValue::U64(v.to::<u64>()),
        (EncryptedType::Uint128, PlainValue::Uint(v)) => EngineValue::U128(v.to::<u128>()),
        (EncryptedType::Address, PlainValue::Uint(v)) => {
            let word = v.to_be_bytes::<32>();
            EngineValue::Address(Address::from_slice(&word[12..]))
        }
        // validate() already rejected every other pairing
        (_, value) => {
            return Err(if ty.is_bool() {
                ValueError::ExpectedBool { ty, value }
            } else {
                ValueError::ExpectedInteger { ty, value }
            })
        }
    };

    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uint(v: u128) -> PlainValue {
        PlainValue::Uint(U256::from(v))
    }

    #[test]
    fn test_boundaries_for_every_integer_type() {
        for ty in EncryptedType::ALL.into_iter().filter(|t| !t.is_bool()) {
            let max = ty.max_value();
            assert!(validate(&PlainValue::Uint(U256::ZERO), ty).is_ok(), "{ty} zero");
            assert!(validate(&PlainValue::Uint(max), ty).is_ok(), "{ty} max");

            let over = max + U256::from(1u8);
            assert_eq!(
                validate(&PlainValue::Uint(over), ty),
                Err(ValueError::OutOfRange { ty, value: over, max }),
                "{ty} max + 1"
            );
        }
    }

    #[test]
    fn test_euint8_255_and_256() {
        assert!(validate(&uint(255), EncryptedType::Uint8).is_ok());
        assert!(validate(&uint(256), EncryptedType::Uint8).is_err());
    }

    #[test]
    fn test_bool_must_be_boolean() {
        assert!(validate(&PlainValue::Bool(true), EncryptedType::Bool).is_ok());
        assert!(matches!(
            validate(&uint(1), EncryptedType::Bool),
            Err(ValueError::ExpectedBool { .. })
        ));
        assert!(matches!(
            validate(&PlainValue::Bool(false), EncryptedType::Uint32),
            Err(ValueError::ExpectedInteger { .. })
        ));
    }

    #[test]
    fn test_encode_narrows_width() {
        assert_eq!(
            encode(&uint(42), EncryptedType::Uint8).unwrap(),
            EngineValue::U8(42)
        );
        assert_eq!(
            encode(&uint(u64::MAX as u128), EncryptedType::Uint64).unwrap(),
            EngineValue::U64(u64::MAX)
        );
        assert_eq!(
            encode(&uint(u128::MAX), EncryptedType::Uint128).unwrap(),
            EngineValue::U128(u128::MAX)
        );
        assert_eq!(
            encode(&PlainValue::Bool(true), EncryptedType::Bool).unwrap(),
            EngineValue::Bool(true)
        );
    }

    #[test]
    fn test_encode_address() {
        let addr = Address::repeat_byte(0xab);
        let encoded = encode(&PlainValue::from(addr), EncryptedType::Address).unwrap();
        assert_eq!(encoded, EngineValue::Address(addr));
        assert_eq!(encoded.encrypted_type(), EncryptedType::Address);
    }

    #[test]
    fn test_encode_never_truncates() {
        let err = encode(&uint(70_000), EncryptedType::Uint16).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum for euint16"));
    }
}
