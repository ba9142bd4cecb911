//! Common error types for Puncher.

use thiserror::Error;

/// Result type alias using Puncher's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for key files and shared helpers.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file, network, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed hexadecimal input
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    /// Key material has the wrong size
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    KeyLength { expected: usize, actual: usize },

    /// Key material has the right size but is not a valid key
    #[error("invalid key: {0}")]
    InvalidKey(String),
}
