//! 128-bit VPN identities

use rand::{rngs::OsRng, RngCore};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Size of a [`UniqueId`] in bytes
pub const UNIQUE_ID_LEN: usize = 128 / 8;

/// Identity of a single VPN for the lifetime of its record.
///
/// Rendered as 32 lowercase hex digits. Collisions between two randomly
/// generated ids are not checked for.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniqueId([u8; UNIQUE_ID_LEN]);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseIdError {
    #[error("vpn id must be {expected} hex digits, got {actual} characters")]
    WrongLength { expected: usize, actual: usize },

    #[error("vpn id contains non-hex characters")]
    NotHex,
}

impl UniqueId {
    /// Draw a fresh id from the operating system's CSPRNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; UNIQUE_ID_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; UNIQUE_ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UniqueId({})", self)
    }
}

/// Accepts hex of either case, as callers of the REST API may send it.
impl FromStr for UniqueId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != UNIQUE_ID_LEN * 2 {
            return Err(ParseIdError::WrongLength {
                expected: UNIQUE_ID_LEN * 2,
                actual: s.len(),
            });
        }
        let mut bytes = [0u8; UNIQUE_ID_LEN];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| ParseIdError::NotHex)?;
        Ok(Self(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_fixed_width_lowercase() {
        let id = UniqueId::from_bytes([
            0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x0f,
        ]);
        assert_eq!(id.to_string(), "0123456789abcdef000000000000000f");
    }

    #[test]
    fn test_parse_accepts_uppercase() {
        let id: UniqueId = "0123456789ABCDEF0123456789ABCDEF".parse().unwrap();
        assert_eq!(id.to_string(), "0123456789abcdef0123456789abcdef");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(
            "abcd".parse::<UniqueId>(),
            Err(ParseIdError::WrongLength {
                expected: 32,
                actual: 4
            })
        );
        assert_eq!(
            "0123456789abcdef0123456789abcdeg".parse::<UniqueId>(),
            Err(ParseIdError::NotHex)
        );
        assert!("0123456789abcdef0123456789abcdef00"
            .parse::<UniqueId>()
            .is_err());
    }

    #[test]
    fn test_generate_is_random() {
        let a = UniqueId::generate();
        let b = UniqueId::generate();
        assert_ne!(a, b);
    }
}
