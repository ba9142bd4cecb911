//! Core Puncher protocol types, framing, and constants.
//!
//! This crate provides:
//! - Message tags shared by the plaintext and encrypted phases
//! - Handshake message bodies and their serialization
//! - The datagram transport capability used by the server and client
//!
//! # Packet Format
//!
//! Plaintext handshake messages (`ClientHello`, `Cookie`, `ServerHello`):
//!
//! ```text
//! +--------+---------------------------+
//! |  Tag   |  Body (JSON object)       |
//! | 1 byte |  variable                 |
//! +--------+---------------------------+
//! ```
//!
//! Encrypted frames (everything after `ServerHello`):
//!
//! ```text
//! +--------+-----------------+----------------+-----------------+
//! |  Tag   | Counter (LE u64)|  Ciphertext    |  GCM auth tag   |
//! | 1 byte |    8 bytes      |  variable      |    16 bytes     |
//! +--------+-----------------+----------------+-----------------+
//! ```
//!
//! The tag byte is readable in both phases so the receiver can decide
//! whether a datagram belongs to the current step before doing any work.

#![forbid(unsafe_code)]

pub mod messages;
pub mod transport;

use thiserror::Error;

pub use messages::{ClientHello, Cookie, Entry, HandshakeMessage, MessageError, ServerHello};
pub use transport::DatagramTransport;

/// Maximum datagram size the endpoints will read or emit.
pub const MAX_DATAGRAM_SIZE: usize = 1500;

/// Size of the per-peer random contributed to the handshake salt.
pub const RANDOM_SIZE: usize = 16;

/// Size of X25519 public keys and Ed25519 verifying keys.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of an Ed25519 signature.
pub const SIGNATURE_SIZE: usize = 64;

/// Size of an address cookie (HMAC-SHA256 output).
pub const COOKIE_SIZE: usize = 32;

/// Message tags.
///
/// `Rendezvous`, `TunnelDatagram` and `TunnelStream` are reserved for the
/// pairing layer that runs on top of an established channel. The handshake
/// never produces or consumes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    ClientHello = 0x00,
    ServerHello = 0x01,
    Cookie = 0x02,
    Entry = 0x10,
    Rendezvous = 0x11,
    TunnelDatagram = 0x20,
    TunnelStream = 0x21,
    Ping = 0x80,
    Pong = 0x81,
    Ack = 0x82,
}

impl Tag {
    /// Every tag in the vocabulary.
    pub const ALL: [Tag; 10] = [
        Tag::ClientHello,
        Tag::ServerHello,
        Tag::Cookie,
        Tag::Entry,
        Tag::Rendezvous,
        Tag::TunnelDatagram,
        Tag::TunnelStream,
        Tag::Ping,
        Tag::Pong,
        Tag::Ack,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Tag {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::ClientHello),
            0x01 => Ok(Self::ServerHello),
            0x02 => Ok(Self::Cookie),
            0x10 => Ok(Self::Entry),
            0x11 => Ok(Self::Rendezvous),
            0x20 => Ok(Self::TunnelDatagram),
            0x21 => Ok(Self::TunnelStream),
            0x80 => Ok(Self::Ping),
            0x81 => Ok(Self::Pong),
            0x82 => Ok(Self::Ack),
            _ => Err(WireError::UnknownTag(value)),
        }
    }
}

/// Wire-level framing errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("empty datagram")]
    Empty,

    #[error("unknown message tag: 0x{0:02x}")]
    UnknownTag(u8),
}

/// Build a plaintext message holding `body` behind `tag`.
pub fn attach_tag(tag: Tag, body: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(1 + body.len());
    msg.push(tag.as_u8());
    msg.extend_from_slice(body);
    msg
}

/// Split a datagram into its raw tag byte and the remaining bytes.
///
/// Works on both plaintext messages and encrypted frames since the tag is
/// the first byte of either.
pub fn detach_tag(msg: &[u8]) -> Result<(u8, &[u8]), WireError> {
    match msg.split_first() {
        Some((tag, body)) => Ok((*tag, body)),
        None => Err(WireError::Empty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tags_are_unique() {
        let values: HashSet<u8> = Tag::ALL.iter().map(|t| t.as_u8()).collect();
        assert_eq!(values.len(), Tag::ALL.len());
    }

    #[test]
    fn test_tag_wire_values() {
        assert_eq!(Tag::ClientHello.as_u8(), 0x00);
        assert_eq!(Tag::ServerHello.as_u8(), 0x01);
        assert_eq!(Tag::Entry.as_u8(), 0x10);
        assert_eq!(Tag::Rendezvous.as_u8(), 0x11);
        assert_eq!(Tag::Ping.as_u8(), 0x80);
        assert_eq!(Tag::Pong.as_u8(), 0x81);
        assert_eq!(Tag::Ack.as_u8(), 0x82);
    }

    #[test]
    fn test_tag_try_from() {
        for tag in Tag::ALL {
            assert_eq!(Tag::try_from(tag.as_u8()).unwrap(), tag);
        }
        assert_eq!(Tag::try_from(0x7f), Err(WireError::UnknownTag(0x7f)));
    }

    #[test]
    fn test_attach_detach() {
        let msg = attach_tag(Tag::Cookie, b"body");
        assert_eq!(msg[0], 0x02);

        let (tag, body) = detach_tag(&msg).unwrap();
        assert_eq!(tag, Tag::Cookie.as_u8());
        assert_eq!(body, b"body");

        let (tag, body) = detach_tag(&[0x80]).unwrap();
        assert_eq!(tag, 0x80);
        assert!(body.is_empty());

        assert_eq!(detach_tag(&[]), Err(WireError::Empty));
    }
}
