//! Ephemeral X25519 key agreement.
//!
//! A [`KeyPair`] is created per handshake attempt and dropped once the
//! session keys are derived. The private scalar zeroizes on drop and is
//! never serialized.

use rand::{CryptoRng, RngCore};
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use puncher_core::PUBLIC_KEY_SIZE;

/// Raw Diffie-Hellman output. Wiped when dropped.
pub type SharedSecret = Zeroizing<[u8; 32]>;

/// Key agreement errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EcdhError {
    #[error("invalid peer public key: expected {PUBLIC_KEY_SIZE} bytes, got {0}")]
    InvalidPublicKey(usize),
}

/// Ephemeral X25519 key pair.
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a key pair from 32 bytes of the supplied CSPRNG.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut seed = Zeroizing::new([0u8; 32]);
        rng.fill_bytes(&mut seed[..]);
        let secret = StaticSecret::from(*seed);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// The public point to send to the peer.
    pub fn public_key(&self) -> [u8; PUBLIC_KEY_SIZE] {
        *self.public.as_bytes()
    }

    /// Multiply our private scalar with the peer's public point.
    pub fn compute_secret(&self, peer_public: &[u8]) -> Result<SharedSecret, EcdhError> {
        let peer: [u8; PUBLIC_KEY_SIZE] = peer_public
            .try_into()
            .map_err(|_| EcdhError::InvalidPublicKey(peer_public.len()))?;
        let shared = self.secret.diffie_hellman(&PublicKey::from(peer));
        Ok(Zeroizing::new(shared.to_bytes()))
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &hex::encode(self.public.as_bytes()))
            .finish_non_exhaustive()
    }
}
