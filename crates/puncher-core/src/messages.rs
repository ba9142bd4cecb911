//! Handshake message bodies.
//!
//! Bodies are JSON objects keyed by field name, so field order does not
//! matter and unknown fields are ignored. Byte strings travel as padded
//! standard base64.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{attach_tag, detach_tag, Tag, WireError, PUBLIC_KEY_SIZE, RANDOM_SIZE};

/// Message encoding and decoding errors.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    #[error("unexpected tag 0x{actual:02x}, expected {expected:?}")]
    UnexpectedTag { expected: Tag, actual: u8 },

    #[error("malformed body: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid {field} length: expected {expected} bytes, got {actual}")]
    FieldLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// A message body that can travel behind a tag byte.
pub trait HandshakeMessage: Serialize + DeserializeOwned + Sized {
    /// Tag this body is sent with.
    const TAG: Tag;

    /// Structural checks applied after deserialization.
    fn validate(&self) -> Result<(), MessageError> {
        Ok(())
    }

    /// Serialize the body alone (used when the body is sealed in a frame).
    fn to_body(&self) -> Result<Vec<u8>, MessageError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize and validate a body.
    fn from_body(body: &[u8]) -> Result<Self, MessageError> {
        let msg: Self = serde_json::from_slice(body)?;
        msg.validate()?;
        Ok(msg)
    }

    /// Encode as a plaintext message: tag byte followed by the body.
    fn encode(&self) -> Result<Vec<u8>, MessageError> {
        Ok(attach_tag(Self::TAG, &self.to_body()?))
    }

    /// Decode a plaintext message, checking its tag.
    fn decode(msg: &[u8]) -> Result<Self, MessageError> {
        let (tag, body) = detach_tag(msg)?;
        if tag != Self::TAG.as_u8() {
            return Err(MessageError::UnexpectedTag {
                expected: Self::TAG,
                actual: tag,
            });
        }
        Self::from_body(body)
    }
}

fn check_len(field: &'static str, value: &[u8], expected: usize) -> Result<(), MessageError> {
    if value.len() != expected {
        return Err(MessageError::FieldLength {
            field,
            expected,
            actual: value.len(),
        });
    }
    Ok(())
}

/// First message from the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientHello {
    #[serde(with = "b64")]
    pub random: Vec<u8>,
    #[serde(with = "b64")]
    pub ecdh_pubkey: Vec<u8>,
    /// Address cookie echoed back from a previous `Cookie` reply.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "b64_opt")]
    pub cookie: Option<Vec<u8>>,
}

impl HandshakeMessage for ClientHello {
    const TAG: Tag = Tag::ClientHello;

    fn validate(&self) -> Result<(), MessageError> {
        check_len("random", &self.random, RANDOM_SIZE)?;
        check_len("ecdh_pubkey", &self.ecdh_pubkey, PUBLIC_KEY_SIZE)
    }
}

/// Stateless challenge sent to a client whose hello lacks a valid cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    #[serde(with = "b64")]
    pub cookie: Vec<u8>,
}

impl HandshakeMessage for Cookie {
    const TAG: Tag = Tag::Cookie;
}

/// Signed server reply carrying the server's half of the key agreement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerHello {
    #[serde(with = "b64")]
    pub random: Vec<u8>,
    #[serde(with = "b64")]
    pub ecdh_pubkey: Vec<u8>,
    /// The server's long-term verifying key. Clients verify against their
    /// pinned copy, never against this field.
    #[serde(with = "b64")]
    pub sign_pubkey: Vec<u8>,
    /// Signature over `server random || client random`.
    #[serde(with = "b64")]
    pub signature: Vec<u8>,
}

impl HandshakeMessage for ServerHello {
    const TAG: Tag = Tag::ServerHello;

    fn validate(&self) -> Result<(), MessageError> {
        check_len("random", &self.random, RANDOM_SIZE)
    }
}

/// Membership proof sent by the client over the encrypted channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(with = "b64")]
    pub pairing_code: Vec<u8>,
}

impl HandshakeMessage for Entry {
    const TAG: Tag = Tag::Entry;
}

mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, T>(bytes: T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[u8]>,
    {
        serializer.serialize_str(&STANDARD.encode(bytes.as_ref()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

mod b64_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match bytes {
            Some(bytes) => super::b64::serialize(bytes, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Wrapper(#[serde(with = "super::b64")] Vec<u8>);

        let wrapper = Option::<Wrapper>::deserialize(deserializer)?;
        Ok(wrapper.map(|Wrapper(bytes)| bytes))
    }
}
