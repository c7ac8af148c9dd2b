//! Address and handle parsing helpers

use alloy_primitives::{Address, Bytes};

use crate::{Error, Result};

/// Parse a `0x`-prefixed, 40 hex digit address
pub fn parse_address(s: &str) -> Result<Address> {
    let trimmed = s.trim();
    let hex_part = trimmed
        .strip_prefix("0x")
        .ok_or_else(|| Error::InvalidAddress(s.to_string()))?;
    if hex_part.len() != 40 {
        return Err(Error::InvalidAddress(s.to_string()));
    }
    trimmed
        .parse::<Address>()
        .map_err(|_| Error::InvalidAddress(s.to_string()))
}

/// Parse a `0x`-prefixed, non-empty hex ciphertext handle
pub fn parse_handle(s: &str) -> Result<Bytes> {
    let hex_part = s
        .trim()
        .strip_prefix("0x")
        .filter(|h| !h.is_empty())
        .ok_or_else(|| Error::InvalidHandle(s.to_string()))?;
    let bytes = hex::decode(hex_part).map_err(|_| Error::InvalidHandle(s.to_string()))?;
    Ok(Bytes::from(bytes))
}

/// Shorten a hex string for display: `0x1234...abcd`
pub fn shorten_hex(s: &str) -> String {
    let len = s.chars().count();
    if len <= 10 {
        return s.to_string();
    }
    let head: String = s.chars().take(6).collect();
    let tail: String = s.chars().skip(len - 4).collect();
    format!("{head}...{tail}")
}
