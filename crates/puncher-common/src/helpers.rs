//! Common helper functions for Puncher.

use crate::error::{Error, Result};

/// Performs a constant-time comparison of two byte strings.
///
/// Used when comparing cookies and other tokens that an attacker may probe.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;
    for (lhs, rhs) in a.iter().zip(b.iter()) {
        diff |= lhs ^ rhs;
    }
    diff == 0
}

/// Decode a hex string holding exactly 32 bytes (keys, seeds, secrets).
pub fn decode_hex_32(s: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(s.trim())?;
    let actual = bytes.len();
    bytes
        .try_into()
        .map_err(|_| Error::KeyLength {
            expected: 32,
            actual,
        })
}
