//! Ed25519 server identity.
//!
//! The server signs the handshake salt with its long-term [`SigningIdentity`].
//! Clients pin the matching [`ServerPublicKey`] out of band and verify every
//! `ServerHello` against it.
//!
//! # Example
//!
//! ```
//! use puncher_crypto::identity::SigningIdentity;
//!
//! let identity = SigningIdentity::generate();
//! let pinned = identity.public_key();
//!
//! let salt = [7u8; 32];
//! let signature = identity.sign(&salt);
//! assert!(pinned.verify(&salt, &signature));
//! ```

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use puncher_common::{decode_hex_32, Error, Result};
use rand::rngs::OsRng;
use std::fmt;
use std::fs;
use std::path::Path;
use zeroize::Zeroizing;

use puncher_core::{PUBLIC_KEY_SIZE, SIGNATURE_SIZE};

/// Long-term Ed25519 signing key.
///
/// The seed is zeroized on drop by `ed25519-dalek`.
pub struct SigningIdentity {
    signing_key: SigningKey,
}

impl SigningIdentity {
    /// Generate a new random identity using the OS CSPRNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Create from a raw 32-byte seed.
    pub fn from_bytes(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Create from a hex-encoded seed (as stored in `PUNCHER_SIGN_KEY`).
    pub fn from_hex(seed_hex: &str) -> Result<Self> {
        let seed = Zeroizing::new(decode_hex_32(seed_hex)?);
        Ok(Self::from_bytes(&seed))
    }

    /// Hex-encoded seed.
    ///
    /// # Security
    /// Anyone holding this string can impersonate the server.
    pub fn seed_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.signing_key.to_bytes()))
    }

    /// The verifying half, for pinning by clients.
    pub fn public_key(&self) -> ServerPublicKey {
        ServerPublicKey {
            verifying_key: self.signing_key.verifying_key(),
        }
    }

    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        *self.signing_key.verifying_key().as_bytes()
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Save the seed and public key to files.
    ///
    /// The seed file is written with restricted permissions (0600 on Unix).
    pub fn save(&self, private_path: impl AsRef<Path>, public_path: impl AsRef<Path>) -> Result<()> {
        let private_path = private_path.as_ref();
        let seed = Zeroizing::new(self.signing_key.to_bytes());

        fs::write(private_path, seed.as_slice())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(private_path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(private_path, perms)?;
        }

        fs::write(public_path, self.public_key_bytes())?;
        Ok(())
    }

    /// Load an identity from a 32-byte seed file.
    pub fn load(private_path: impl AsRef<Path>) -> Result<Self> {
        let bytes = Zeroizing::new(fs::read(private_path)?);
        let seed: &[u8; 32] = bytes.as_slice().try_into().map_err(|_| Error::KeyLength {
            expected: 32,
            actual: bytes.len(),
        })?;
        Ok(Self::from_bytes(seed))
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningIdentity({})", hex::encode(self.public_key_bytes()))
    }
}

/// Pinned server verifying key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ServerPublicKey {
    verifying_key: VerifyingKey,
}

impl ServerPublicKey {
    /// Create from raw public key bytes.
    pub fn from_bytes(bytes: &[u8; PUBLIC_KEY_SIZE]) -> Result<Self> {
        let verifying_key =
            VerifyingKey::from_bytes(bytes).map_err(|e| Error::InvalidKey(e.to_string()))?;
        Ok(Self { verifying_key })
    }

    /// Parse a hex-encoded public key (as stored in `PUNCHER_SERVER_KEY`).
    pub fn from_hex(s: &str) -> Result<Self> {
        Self::from_bytes(&decode_hex_32(s)?)
    }

    /// Load from a 32-byte public key file.
    pub fn load(public_path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(public_path)?;
        let key: [u8; PUBLIC_KEY_SIZE] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| Error::KeyLength {
                    expected: PUBLIC_KEY_SIZE,
                    actual: bytes.len(),
                })?;
        Self::from_bytes(&key)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        self.verifying_key.as_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    /// Verify a signature. Signatures of the wrong length never verify.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let sig = match Signature::from_slice(signature) {
            Ok(s) => s,
            Err(_) => return false,
        };
        self.verifying_key.verify(message, &sig).is_ok()
    }
}

impl fmt::Debug for ServerPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServerPublicKey({})", self.to_hex())
    }
}

impl fmt::Display for ServerPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
