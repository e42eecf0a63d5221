//! Identifiers for traced entities.
//!
//! Block identifiers are ephemeral: the runtime hands the same value out again
//! once the block carrying it has been deleted. Nothing here assumes global
//! uniqueness.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Parse a hexadecimal `u32`, with or without a `0x` prefix.
fn parse_hex_u32(text: &str) -> CoreResult<u32> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() {
        return Err(CoreError::InvalidId {
            reason: format!("no hex digits in {:?}", text),
        });
    }
    u32::from_str_radix(digits, 16).map_err(|e| CoreError::InvalidId {
        reason: format!("{:?} is not a 32-bit hex value: {}", text, e),
    })
}

/// Basic block identifier - unique among live blocks, reused after deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct BlockId(u32);

impl BlockId {
    /// Create from the raw wire value
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw wire value
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for BlockId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl FromStr for BlockId {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        parse_hex_u32(s).map(Self)
    }
}

/// Thread identifier as reported by the host runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(u32);

impl ThreadId {
    /// Create from the raw wire value
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw wire value
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for ThreadId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl FromStr for ThreadId {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        parse_hex_u32(s).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_block_id_display() {
        assert_eq!(BlockId::new(0x2a).to_string(), "0x2a");
        assert_eq!(BlockId::new(0).to_string(), "0x0");
    }

    #[test]
    fn test_block_id_parse_with_and_without_prefix() {
        assert_eq!("0x2a".parse::<BlockId>().unwrap(), BlockId::new(0x2a));
        assert_eq!("2A".parse::<BlockId>().unwrap(), BlockId::new(0x2a));
        assert_eq!(" ffffffff ".parse::<BlockId>().unwrap(), BlockId::new(u32::MAX));
    }

    #[test]
    fn test_block_id_parse_rejects_garbage() {
        assert!("".parse::<BlockId>().is_err());
        assert!("0x".parse::<BlockId>().is_err());
        assert!("xyz".parse::<BlockId>().is_err());
        assert!("100000000".parse::<BlockId>().is_err());
    }

    #[test]
    fn test_thread_id_serde_is_transparent() {
        let id = ThreadId::new(7);
        assert_eq!(serde_json::to_string(&id).unwrap(), "7");
        let back: ThreadId = serde_json::from_str("7").unwrap();
        assert_eq!(back, id);
    }

    proptest! {
        #[test]
        fn prop_display_parses_back(raw: u32) {
            let id = BlockId::new(raw);
            prop_assert_eq!(id.to_string().parse::<BlockId>().unwrap(), id);
        }
    }
}
