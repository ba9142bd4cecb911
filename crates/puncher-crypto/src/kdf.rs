//! HKDF-SHA256 key schedule.
//!
//! Both roles derive the same four subkeys from the X25519 output and the
//! handshake salt `server random || client random`. Each subkey uses its own
//! info label, so the outputs are independent of one another.

use hkdf::Hkdf;
use hmac::digest::Key;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use puncher_core::RANDOM_SIZE;

use crate::cipher::{IV_SIZE, KEY_SIZE};

/// Handshake salt: `server random || client random`.
pub type Salt = [u8; 2 * RANDOM_SIZE];

/// Largest output HKDF-SHA256 can produce (255 blocks).
pub const MAX_OUTPUT_LEN: usize = 255 * 32;

pub const SERVER_KEY_LABEL: &[u8] = b"server key";
pub const CLIENT_KEY_LABEL: &[u8] = b"client key";
pub const SERVER_IV_LABEL: &[u8] = b"server iv";
pub const CLIENT_IV_LABEL: &[u8] = b"client iv";

/// Key derivation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KdfError {
    #[error("requested {requested} bytes, HKDF-SHA256 is limited to {MAX_OUTPUT_LEN}")]
    OutputTooLong { requested: usize },

    #[error("invalid HMAC key length")]
    InvalidMacKey,
}

/// Expand `secret` into `len` bytes bound to `salt` and `info`.
pub fn derive(
    secret: &[u8],
    salt: &[u8],
    info: &[u8],
    len: usize,
) -> Result<Zeroizing<Vec<u8>>, KdfError> {
    if len > MAX_OUTPUT_LEN {
        return Err(KdfError::OutputTooLong { requested: len });
    }

    let hk = Hkdf::<Sha256>::new(Some(salt), secret);
    let mut okm = Zeroizing::new(vec![0u8; len]);
    hk.expand(info, &mut okm)
        .map_err(|_| KdfError::OutputTooLong { requested: len })?;
    Ok(okm)
}

fn derive_array<const N: usize>(
    secret: &[u8],
    salt: &[u8],
    info: &[u8],
) -> Result<[u8; N], KdfError> {
    let okm = derive(secret, salt, info, N)?;
    let mut out = [0u8; N];
    out.copy_from_slice(&okm);
    Ok(out)
}

/// Build the handshake salt. The order is fixed for both roles; swapping it
/// breaks both the signature check and every derived key.
pub fn handshake_salt(
    server_random: &[u8; RANDOM_SIZE],
    client_random: &[u8; RANDOM_SIZE],
) -> Salt {
    let mut salt = [0u8; 2 * RANDOM_SIZE];
    salt[..RANDOM_SIZE].copy_from_slice(server_random);
    salt[RANDOM_SIZE..].copy_from_slice(client_random);
    salt
}

/// HMAC-SHA256 block size; keys of exactly this length are used as-is.
pub const HMAC_KEY_SIZE: usize = 64;

/// HMAC-SHA256 over `data` with a block-sized key.
pub(crate) fn hmac_sha256(key: &[u8; HMAC_KEY_SIZE], data: &[u8]) -> [u8; 32] {
    let mut mac = <Hmac<Sha256> as Mac>::new(Key::<Hmac<Sha256>>::from_slice(key));
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Membership proof for `site`: HMAC-SHA256 keyed by the client's shared secret.
pub fn pairing_code(client_secret: &[u8], site: &str) -> Result<[u8; 32], KdfError> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(client_secret)
        .map_err(|_| KdfError::InvalidMacKey)?;
    mac.update(site.as_bytes());
    Ok(mac.finalize().into_bytes().into())
}

/// Per-session AES-128-GCM keys and IVs for both directions.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    pub server_key: [u8; KEY_SIZE],
    pub client_key: [u8; KEY_SIZE],
    pub server_iv: [u8; IV_SIZE],
    pub client_iv: [u8; IV_SIZE],
}

impl SessionKeys {
    /// Derive all four subkeys from one shared secret and salt.
    pub fn derive(secret: &[u8], salt: &Salt) -> Result<Self, KdfError> {
        Ok(Self {
            server_key: derive_array(secret, salt, SERVER_KEY_LABEL)?,
            client_key: derive_array(secret, salt, CLIENT_KEY_LABEL)?,
            server_iv: derive_array(secret, salt, SERVER_IV_LABEL)?,
            client_iv: derive_array(secret, salt, CLIENT_IV_LABEL)?,
        })
    }
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKeys { .. }")
    }
}
