//! AES-128-GCM channel cipher with per-frame counters.
//!
//! # Frame Format
//!
//! ```text
//! +--------+-----------------+----------------+-----------------+
//! |  Tag   | Counter (LE u64)|  Ciphertext    |  GCM auth tag   |
//! | 1 byte |    8 bytes      |  variable      |    16 bytes     |
//! +--------+-----------------+----------------+-----------------+
//! ```
//!
//! The 9-byte header is authenticated as additional data but sent in the
//! clear. The nonce is the direction's IV with its first 8 bytes XORed by
//! the little-endian counter.
//!
//! A receiver accepts a counter only if it is strictly greater than the last
//! counter it authenticated. The stored counter moves only after the AEAD
//! check passes, so forged frames cannot push it forward.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Nonce};
use thiserror::Error;

use crate::kdf::SessionKeys;

/// AES-128 key size.
pub const KEY_SIZE: usize = 16;

/// GCM IV size.
pub const IV_SIZE: usize = 12;

/// Tag byte plus 8-byte counter.
pub const HEADER_SIZE: usize = 1 + 8;

/// GCM authentication tag size.
pub const AUTH_TAG_SIZE: usize = 16;

/// Smallest well-formed frame: header plus auth tag over an empty body.
pub const MIN_FRAME_SIZE: usize = HEADER_SIZE + AUTH_TAG_SIZE;

/// Channel cipher errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("invalid key length: expected {KEY_SIZE} bytes, got {0}")]
    InvalidKey(usize),

    #[error("invalid IV length: expected {IV_SIZE} bytes, got {0}")]
    InvalidIv(usize),

    #[error("send counter exhausted")]
    CounterExhausted,

    #[error("frame too short: {0} bytes")]
    InvalidMessage(usize),

    #[error("replayed counter {0}")]
    Replay(u64),

    #[error("frame failed authentication")]
    Authentication,

    #[error("encryption failed")]
    Encryption,
}

/// One direction of a secure channel.
///
/// A sending instance only ever calls [`seal`](Self::seal) and a receiving
/// instance only ever calls [`open`](Self::open); the counter is the last
/// value sent or the highest value accepted respectively.
pub struct ChannelCipher {
    aead: Aes128Gcm,
    iv: [u8; IV_SIZE],
    counter: u64,
}

impl ChannelCipher {
    pub fn new(key: &[u8], iv: &[u8]) -> Result<Self, CipherError> {
        let aead = Aes128Gcm::new_from_slice(key).map_err(|_| CipherError::InvalidKey(key.len()))?;
        let iv: [u8; IV_SIZE] = iv
            .try_into()
            .map_err(|_| CipherError::InvalidIv(iv.len()))?;
        Ok(Self {
            aead,
            iv,
            counter: 0,
        })
    }

    /// Last counter sent or accepted.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Encrypt `plaintext` into a frame carrying `tag`.
    ///
    /// Once the counter reaches `u64::MAX` every call fails with
    /// [`CipherError::CounterExhausted`].
    pub fn seal(&mut self, plaintext: &[u8], tag: u8) -> Result<Vec<u8>, CipherError> {
        let counter = self
            .counter
            .checked_add(1)
            .ok_or(CipherError::CounterExhausted)?;
        let header = frame_header(tag, counter);

        let ciphertext = self
            .aead
            .encrypt(
                Nonce::from_slice(&self.nonce(counter)),
                Payload {
                    msg: plaintext,
                    aad: &header,
                },
            )
            .map_err(|_| CipherError::Encryption)?;
        self.counter = counter;

        let mut frame = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
        frame.extend_from_slice(&header);
        frame.extend_from_slice(&ciphertext);
        Ok(frame)
    }

    /// Authenticate and decrypt a frame, returning the plaintext and its tag.
    pub fn open(&mut self, frame: &[u8]) -> Result<(Vec<u8>, u8), CipherError> {
        if frame.len() < MIN_FRAME_SIZE {
            return Err(CipherError::InvalidMessage(frame.len()));
        }

        let (header, ciphertext) = frame.split_at(HEADER_SIZE);
        let tag = header[0];
        let mut counter_bytes = [0u8; 8];
        counter_bytes.copy_from_slice(&header[1..]);
        let counter = u64::from_le_bytes(counter_bytes);

        if counter <= self.counter {
            return Err(CipherError::Replay(counter));
        }

        let plaintext = self
            .aead
            .decrypt(
                Nonce::from_slice(&self.nonce(counter)),
                Payload {
                    msg: ciphertext,
                    aad: header,
                },
            )
            .map_err(|_| CipherError::Authentication)?;
        self.counter = counter;

        Ok((plaintext, tag))
    }

    fn nonce(&self, counter: u64) -> [u8; IV_SIZE] {
        let mut nonce = self.iv;
        for (n, c) in nonce.iter_mut().zip(counter.to_le_bytes()) {
            *n ^= c;
        }
        nonce
    }

    #[cfg(test)]
    pub(crate) fn with_counter(key: &[u8], iv: &[u8], counter: u64) -> Result<Self, CipherError> {
        let mut cipher = Self::new(key, iv)?;
        cipher.counter = counter;
        Ok(cipher)
    }
}

impl std::fmt::Debug for ChannelCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelCipher")
            .field("counter", &self.counter)
            .finish_non_exhaustive()
    }
}

fn frame_header(tag: u8, counter: u64) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[0] = tag;
    header[1..].copy_from_slice(&counter.to_le_bytes());
    header
}

/// Read a frame's cleartext tag without touching any cipher state.
pub fn frame_tag(frame: &[u8]) -> Option<u8> {
    frame.first().copied()
}

/// Both directions of an established session.
#[derive(Debug)]
pub struct SecureChannel {
    pub send: ChannelCipher,
    pub recv: ChannelCipher,
}

impl SecureChannel {
    /// Client side: send with the client keys, receive with the server keys.
    pub fn client(keys: &SessionKeys) -> Result<Self, CipherError> {
        Ok(Self {
            send: ChannelCipher::new(&keys.client_key, &keys.client_iv)?,
            recv: ChannelCipher::new(&keys.server_key, &keys.server_iv)?,
        })
    }

    /// Server side: send with the server keys, receive with the client keys.
    pub fn server(keys: &SessionKeys) -> Result<Self, CipherError> {
        Ok(Self {
            send: ChannelCipher::new(&keys.server_key, &keys.server_iv)?,
            recv: ChannelCipher::new(&keys.client_key, &keys.client_iv)?,
        })
    }

    pub fn seal(&mut self, plaintext: &[u8], tag: u8) -> Result<Vec<u8>, CipherError> {
        self.send.seal(plaintext, tag)
    }

    pub fn open(&mut self, frame: &[u8]) -> Result<(Vec<u8>, u8), CipherError> {
        self.recv.open(frame)
    }
}
