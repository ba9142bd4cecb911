//! Cryptographic primitives for Puncher.
//!
//! This crate provides:
//! - X25519 ephemeral key agreement
//! - HKDF-SHA256 session key schedule and pairing codes
//! - AES-128-GCM framed channel cipher with strict anti-replay counters
//! - Ed25519 server identity keys
//! - Stateless address cookies with key rotation
//! - The client and server handshake state machines
//!
//! # Design
//!
//! Every frame carries its own counter, and the receiver accepts a counter
//! only if it is strictly greater than the last one it authenticated. There
//! is no reordering window: a late frame is dropped even if it was never
//! seen before.
//!
//! The handshake machines are sans-IO. They consume datagrams and return
//! datagrams to send; the server dispatcher and the client driver own the
//! sockets and the timers.

#![forbid(unsafe_code)]

pub mod cipher;
pub mod cookie;
pub mod ecdh;
pub mod handshake;
pub mod identity;
pub mod kdf;

pub use cipher::{ChannelCipher, CipherError, SecureChannel};
pub use cookie::CookieJar;
pub use ecdh::{EcdhError, KeyPair, SharedSecret};
pub use handshake::{
    ClientHandshake, ClientState, HandshakeError, IgnoreReason, ServerHandshake, ServerState,
    Transition,
};
pub use identity::{ServerPublicKey, SigningIdentity};
pub use kdf::{derive, pairing_code, KdfError, Salt, SessionKeys};
