//! Stateless address cookies.
//!
//! A cookie is `HMAC-SHA256(key, address string)`. The server hands one out
//! to any peer whose `ClientHello` lacks a valid cookie and allocates nothing
//! until the peer echoes it back from the same address. Rotating the key
//! invalidates every cookie issued before the rotation.

use rand::{CryptoRng, RngCore};
use std::net::SocketAddr;
use zeroize::Zeroizing;

use puncher_common::constant_time_eq;
use puncher_core::COOKIE_SIZE;

use crate::kdf::{hmac_sha256, HMAC_KEY_SIZE};

/// Process-wide cookie key holder.
pub struct CookieJar {
    key: Zeroizing<[u8; HMAC_KEY_SIZE]>,
    generation: u64,
}

impl CookieJar {
    pub fn new<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut jar = Self {
            key: Zeroizing::new([0u8; HMAC_KEY_SIZE]),
            generation: 0,
        };
        rng.fill_bytes(&mut jar.key[..]);
        jar
    }

    /// Cookie for `addr` under the current key.
    pub fn issue(&self, addr: SocketAddr) -> [u8; COOKIE_SIZE] {
        hmac_sha256(&self.key, addr.to_string().as_bytes())
    }

    /// Check a cookie presented by `addr`.
    pub fn verify(&self, addr: SocketAddr, cookie: &[u8]) -> bool {
        constant_time_eq(&self.issue(addr), cookie)
    }

    /// Replace the key with fresh random bytes.
    pub fn rotate<R: RngCore + CryptoRng>(&mut self, rng: &mut R) {
        rng.fill_bytes(&mut self.key[..]);
        self.generation += 1;
    }

    /// Number of rotations so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl std::fmt::Debug for CookieJar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieJar")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_issue_verify() {
        let jar = CookieJar::new(&mut StdRng::seed_from_u64(1));
        let peer = addr("192.0.2.10:4000");

        let cookie = jar.issue(peer);
        assert!(jar.verify(peer, &cookie));
        assert_eq!(jar.issue(peer), cookie);
    }

    #[test]
    fn test_cookie_bound_to_address() {
        let jar = CookieJar::new(&mut StdRng::seed_from_u64(2));
        let cookie = jar.issue(addr("192.0.2.10:4000"));

        assert!(!jar.verify(addr("192.0.2.10:4001"), &cookie));
        assert!(!jar.verify(addr("192.0.2.11:4000"), &cookie));
    }

    #[test]
    fn test_rotation_invalidates() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut jar = CookieJar::new(&mut rng);
        let peer = addr("[2001:db8::1]:9000");

        let old = jar.issue(peer);
        jar.rotate(&mut rng);
        assert_eq!(jar.generation(), 1);
        assert!(!jar.verify(peer, &old));
        assert!(jar.verify(peer, &jar.issue(peer)));
    }

    #[test]
    fn test_malformed_cookie_rejected() {
        let jar = CookieJar::new(&mut StdRng::seed_from_u64(4));
        let peer = addr("127.0.0.1:1");
        let cookie = jar.issue(peer);

        assert!(!jar.verify(peer, &[]));
        assert!(!jar.verify(peer, &cookie[..31]));
    }
}
