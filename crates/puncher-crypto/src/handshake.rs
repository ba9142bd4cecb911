//! Client and server handshake state machines.
//!
//! Both machines are sans-IO: feed them datagrams with `handle` and send
//! whatever [`Transition`] they return. Timers and retransmission of the
//! initial hello belong to the caller.
//!
//! ```text
//! client                                   server
//!   ClientHello{random, ecdh_pubkey}  ->
//!                                     <-   Cookie{cookie}            (stateless)
//!   ClientHello{.., cookie}           ->
//!                                     <-   ServerHello{random, ecdh_pubkey,
//!                                                      sign_pubkey, signature}
//!   [Entry{pairing_code}]             ->
//!                                     <-   [Ack]
//!                                     <-   [Ping]
//!   [Pong]                            ->
//! ```
//!
//! Frames in brackets are sealed with the session keys. A datagram whose tag
//! is not the one the current step waits for is dropped without being
//! opened, so it never moves the receive counter.

use rand::{CryptoRng, RngCore};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use puncher_core::{
    detach_tag, ClientHello, Cookie, Entry, HandshakeMessage, MessageError, ServerHello, Tag,
    RANDOM_SIZE,
};

use crate::cipher::{frame_tag, CipherError, SecureChannel};
use crate::ecdh::{EcdhError, KeyPair};
use crate::identity::{ServerPublicKey, SigningIdentity};
use crate::kdf::{handshake_salt, KdfError, SessionKeys};

/// Cookie challenges a client accepts before giving up.
pub const DEFAULT_MAX_COOKIE_ROUNDS: u32 = 4;

/// Fatal handshake errors. The attempt must be abandoned.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("server signature verification failed")]
    ServerVerificationFailed,

    #[error("{0}")]
    InvalidPublicKey(#[from] EcdhError),

    #[error("send counter exhausted")]
    CounterExhausted,

    #[error("handshake is not accepting messages in state {0}")]
    UnexpectedState(String),

    #[error("server sent {0} cookie challenges")]
    CookieLoop(u32),

    #[error("key derivation failed: {0}")]
    Kdf(#[from] KdfError),

    #[error("cipher error: {0}")]
    Cipher(CipherError),

    #[error("message encoding failed: {0}")]
    Message(#[from] MessageError),
}

impl From<CipherError> for HandshakeError {
    fn from(e: CipherError) -> Self {
        match e {
            CipherError::CounterExhausted => Self::CounterExhausted,
            other => Self::Cipher(other),
        }
    }
}

/// Why a datagram was dropped without changing state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Tag does not belong to the current step.
    UnexpectedTag(u8),
    /// Body could not be decoded.
    Malformed(String),
    /// Frame was short, replayed or failed authentication.
    Cipher(CipherError),
    /// A second, different `ClientHello` from the same peer.
    ConflictingHello,
}

/// Result of feeding one datagram to a handshake machine.
#[derive(Debug, PartialEq, Eq)]
pub enum Transition {
    /// Progress was made; send these datagrams (possibly none).
    Send(Vec<Vec<u8>>),
    /// Datagram dropped; state unchanged.
    Ignored(IgnoreReason),
    /// Handshake finished; send these final datagrams.
    Complete(Vec<Vec<u8>>),
}

fn malformed(e: MessageError) -> Transition {
    Transition::Ignored(IgnoreReason::Malformed(e.to_string()))
}

fn to_random(bytes: &[u8]) -> Option<[u8; RANDOM_SIZE]> {
    bytes.try_into().ok()
}

/// Open a sealed frame, mapping per-frame failures to an ignore.
fn open_step(
    channel: &mut SecureChannel,
    datagram: &[u8],
    expected: Tag,
) -> Result<Vec<u8>, Transition> {
    match frame_tag(datagram) {
        Some(tag) if tag == expected.as_u8() => {}
        other => {
            return Err(Transition::Ignored(IgnoreReason::UnexpectedTag(
                other.unwrap_or_default(),
            )))
        }
    }
    match channel.open(datagram) {
        Ok((plaintext, _)) => Ok(plaintext),
        Err(e) => {
            debug!("dropping {:?} frame: {}", expected, e);
            Err(Transition::Ignored(IgnoreReason::Cipher(e)))
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// Client handshake states.
///
/// A machine left in `Verified` or `KeysDerived` failed partway through
/// processing the server hello.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    SentHello,
    /// Resent the hello with a cookie and waiting again.
    AwaitingHello,
    Verified,
    KeysDerived,
    SentEntry,
    /// The `Ack` arrived; the channel is established and the `Ping` is next.
    AwaitingPing,
    SentPong,
}

/// Client side of the handshake.
pub struct ClientHandshake<R> {
    rng: R,
    state: ClientState,
    server_key: ServerPublicKey,
    pairing_code: [u8; 32],
    random: [u8; RANDOM_SIZE],
    keypair: Option<KeyPair>,
    cookie: Option<Vec<u8>>,
    cookie_rounds: u32,
    max_cookie_rounds: u32,
    keys: Option<SessionKeys>,
    channel: Option<SecureChannel>,
}

impl<R: RngCore + CryptoRng> ClientHandshake<R> {
    /// Create a client that trusts `server_key` and proves membership with
    /// `pairing_code`.
    pub fn new(rng: R, server_key: ServerPublicKey, pairing_code: [u8; 32]) -> Self {
        Self {
            rng,
            state: ClientState::Idle,
            server_key,
            pairing_code,
            random: [0u8; RANDOM_SIZE],
            keypair: None,
            cookie: None,
            cookie_rounds: 0,
            max_cookie_rounds: DEFAULT_MAX_COOKIE_ROUNDS,
            keys: None,
            channel: None,
        }
    }

    pub fn with_max_cookie_rounds(mut self, rounds: u32) -> Self {
        self.max_cookie_rounds = rounds;
        self
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Keys derived from the verified `ServerHello`, if any.
    pub fn session_keys(&self) -> Option<&SessionKeys> {
        self.keys.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.state == ClientState::SentPong
    }

    /// The secure channel, once the handshake is complete.
    pub fn into_channel(self) -> Option<SecureChannel> {
        if self.is_complete() {
            self.channel
        } else {
            None
        }
    }

    /// Generate the ephemeral key and random and build the first hello.
    pub fn start(&mut self) -> Result<Vec<u8>, HandshakeError> {
        if self.state != ClientState::Idle {
            return Err(HandshakeError::UnexpectedState(format!("{:?}", self.state)));
        }
        self.rng.fill_bytes(&mut self.random);
        let keypair = KeyPair::generate(&mut self.rng);
        debug!("client ecdh pubkey {}", hex::encode(keypair.public_key()));
        self.keypair = Some(keypair);
        self.state = ClientState::SentHello;
        self.hello()
    }

    /// Re-encode the current hello (with the latest cookie) for retransmission.
    pub fn hello(&self) -> Result<Vec<u8>, HandshakeError> {
        let keypair = match (self.state, &self.keypair) {
            (ClientState::SentHello | ClientState::AwaitingHello, Some(keypair)) => keypair,
            _ => return Err(HandshakeError::UnexpectedState(format!("{:?}", self.state))),
        };
        let hello = ClientHello {
            random: self.random.to_vec(),
            ecdh_pubkey: keypair.public_key().to_vec(),
            cookie: self.cookie.clone(),
        };
        Ok(hello.encode()?)
    }

    /// Feed one datagram from the server.
    pub fn handle(&mut self, datagram: &[u8]) -> Result<Transition, HandshakeError> {
        match self.state {
            ClientState::SentHello | ClientState::AwaitingHello => self.on_hello_reply(datagram),
            ClientState::SentEntry => self.on_ack(datagram),
            ClientState::AwaitingPing => self.on_ping(datagram),
            state => Err(HandshakeError::UnexpectedState(format!("{:?}", state))),
        }
    }

    fn on_hello_reply(&mut self, datagram: &[u8]) -> Result<Transition, HandshakeError> {
        let tag = match detach_tag(datagram) {
            Ok((tag, _)) => tag,
            Err(e) => return Ok(malformed(e.into())),
        };

        if tag == Tag::Cookie.as_u8() {
            let challenge = match Cookie::decode(datagram) {
                Ok(challenge) => challenge,
                Err(e) => return Ok(malformed(e)),
            };
            self.cookie_rounds += 1;
            if self.cookie_rounds > self.max_cookie_rounds {
                return Err(HandshakeError::CookieLoop(self.cookie_rounds));
            }
            debug!("received cookie challenge (round {})", self.cookie_rounds);
            self.cookie = Some(challenge.cookie);
            self.state = ClientState::AwaitingHello;
            return Ok(Transition::Send(vec![self.hello()?]));
        }

        if tag != Tag::ServerHello.as_u8() {
            return Ok(Transition::Ignored(IgnoreReason::UnexpectedTag(tag)));
        }

        let reply = match ServerHello::decode(datagram) {
            Ok(reply) => reply,
            Err(e) => return Ok(malformed(e)),
        };
        let server_random = match to_random(&reply.random) {
            Some(random) => random,
            None => return Ok(Transition::Ignored(IgnoreReason::Malformed("random".into()))),
        };

        let salt = handshake_salt(&server_random, &self.random);
        if !self.server_key.verify(&salt, &reply.signature) {
            return Err(HandshakeError::ServerVerificationFailed);
        }
        if reply.sign_pubkey.as_slice() != self.server_key.as_bytes() {
            debug!(
                "server advertised sign key {}, verified against pinned {}",
                hex::encode(&reply.sign_pubkey),
                self.server_key
            );
        }
        self.state = ClientState::Verified;

        let keypair = self
            .keypair
            .take()
            .ok_or_else(|| HandshakeError::UnexpectedState(format!("{:?}", self.state)))?;
        let secret = keypair.compute_secret(&reply.ecdh_pubkey)?;
        let keys = SessionKeys::derive(secret.as_slice(), &salt)?;
        let mut channel = SecureChannel::client(&keys)?;
        self.keys = Some(keys);
        self.state = ClientState::KeysDerived;

        let entry = Entry {
            pairing_code: self.pairing_code.to_vec(),
        };
        let frame = channel.seal(&entry.to_body()?, Tag::Entry.as_u8())?;
        self.channel = Some(channel);
        self.state = ClientState::SentEntry;

        Ok(Transition::Send(vec![frame]))
    }

    fn on_ack(&mut self, datagram: &[u8]) -> Result<Transition, HandshakeError> {
        let channel = self.channel_mut()?;
        if let Err(ignored) = open_step(channel, datagram, Tag::Ack) {
            return Ok(ignored);
        }
        self.state = ClientState::AwaitingPing;
        Ok(Transition::Send(Vec::new()))
    }

    fn on_ping(&mut self, datagram: &[u8]) -> Result<Transition, HandshakeError> {
        let channel = self.channel_mut()?;
        if let Err(ignored) = open_step(channel, datagram, Tag::Ping) {
            return Ok(ignored);
        }
        let pong = channel.seal(&[], Tag::Pong.as_u8())?;
        self.state = ClientState::SentPong;
        Ok(Transition::Complete(vec![pong]))
    }

    fn channel_mut(&mut self) -> Result<&mut SecureChannel, HandshakeError> {
        let state = self.state;
        self.channel
            .as_mut()
            .ok_or_else(|| HandshakeError::UnexpectedState(format!("{:?}", state)))
    }
}

impl<R> std::fmt::Debug for ClientHandshake<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandshake")
            .field("state", &self.state)
            .field("cookie_rounds", &self.cookie_rounds)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Server
// ============================================================================

/// Server handshake states.
///
/// A machine left in `SentHello` or `KeysDerived` failed partway through
/// processing the client hello.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    AwaitingHello,
    SentHello,
    KeysDerived,
    AwaitingEntry,
    /// `Ack` and `Ping` went out together in reply to the `Entry`.
    AwaitingPong,
    Done,
}

/// Server side of the handshake for one peer.
///
/// The cookie check happens before this machine exists; the first datagram
/// it sees is a `ClientHello` that already carried a valid cookie.
pub struct ServerHandshake<R> {
    rng: R,
    identity: Arc<SigningIdentity>,
    state: ServerState,
    client_hello: Option<ClientHello>,
    server_hello: Option<Vec<u8>>,
    keys: Option<SessionKeys>,
    channel: Option<SecureChannel>,
    pairing_code: Option<Vec<u8>>,
}

impl<R: RngCore + CryptoRng> ServerHandshake<R> {
    pub fn new(rng: R, identity: Arc<SigningIdentity>) -> Self {
        Self {
            rng,
            identity,
            state: ServerState::AwaitingHello,
            client_hello: None,
            server_hello: None,
            keys: None,
            channel: None,
            pairing_code: None,
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn session_keys(&self) -> Option<&SessionKeys> {
        self.keys.as_ref()
    }

    /// Pairing code the client presented in its `Entry`.
    pub fn pairing_code(&self) -> Option<&[u8]> {
        self.pairing_code.as_deref()
    }

    pub fn is_complete(&self) -> bool {
        self.state == ServerState::Done
    }

    /// The secure channel and pairing code, once the handshake is complete.
    pub fn into_parts(self) -> Option<(SecureChannel, Vec<u8>)> {
        if !self.is_complete() {
            return None;
        }
        match (self.channel, self.pairing_code) {
            (Some(channel), Some(code)) => Some((channel, code)),
            _ => None,
        }
    }

    /// Feed one datagram from the client.
    pub fn handle(&mut self, datagram: &[u8]) -> Result<Transition, HandshakeError> {
        match self.state {
            ServerState::AwaitingHello => self.on_client_hello(datagram),
            ServerState::AwaitingEntry => self.on_entry(datagram),
            ServerState::AwaitingPong => self.on_pong(datagram),
            state => Err(HandshakeError::UnexpectedState(format!("{:?}", state))),
        }
    }

    fn on_client_hello(&mut self, datagram: &[u8]) -> Result<Transition, HandshakeError> {
        let hello = match ClientHello::decode(datagram) {
            Ok(hello) => hello,
            Err(MessageError::UnexpectedTag { actual, .. }) => {
                return Ok(Transition::Ignored(IgnoreReason::UnexpectedTag(actual)))
            }
            Err(e) => return Ok(malformed(e)),
        };
        let client_random = match to_random(&hello.random) {
            Some(random) => random,
            None => return Ok(Transition::Ignored(IgnoreReason::Malformed("random".into()))),
        };

        let mut server_random = [0u8; RANDOM_SIZE];
        self.rng.fill_bytes(&mut server_random);
        let keypair = KeyPair::generate(&mut self.rng);
        let salt = handshake_salt(&server_random, &client_random);

        let reply = ServerHello {
            random: server_random.to_vec(),
            ecdh_pubkey: keypair.public_key().to_vec(),
            sign_pubkey: self.identity.public_key_bytes().to_vec(),
            signature: self.identity.sign(&salt).to_vec(),
        };
        let encoded = reply.encode()?;
        self.state = ServerState::SentHello;

        let secret = keypair.compute_secret(&hello.ecdh_pubkey)?;
        let keys = SessionKeys::derive(secret.as_slice(), &salt)?;
        self.channel = Some(SecureChannel::server(&keys)?);
        self.keys = Some(keys);
        self.state = ServerState::KeysDerived;

        debug!("server ecdh pubkey {}", hex::encode(keypair.public_key()));
        self.client_hello = Some(hello);
        self.server_hello = Some(encoded.clone());
        self.state = ServerState::AwaitingEntry;

        Ok(Transition::Send(vec![encoded]))
    }

    /// A repeat of the accepted hello means our `ServerHello` was lost.
    fn on_repeated_hello(&self, datagram: &[u8]) -> Transition {
        let hello = match ClientHello::decode(datagram) {
            Ok(hello) => hello,
            Err(e) => return malformed(e),
        };
        match (&self.client_hello, &self.server_hello) {
            (Some(first), Some(reply))
                if first.random == hello.random && first.ecdh_pubkey == hello.ecdh_pubkey =>
            {
                debug!("retransmitting ServerHello");
                Transition::Send(vec![reply.clone()])
            }
            _ => Transition::Ignored(IgnoreReason::ConflictingHello),
        }
    }

    fn on_entry(&mut self, datagram: &[u8]) -> Result<Transition, HandshakeError> {
        if frame_tag(datagram) == Some(Tag::ClientHello.as_u8()) {
            return Ok(self.on_repeated_hello(datagram));
        }

        let channel = self.channel_mut()?;
        let body = match open_step(channel, datagram, Tag::Entry) {
            Ok(body) => body,
            Err(ignored) => return Ok(ignored),
        };
        let entry = match Entry::from_body(&body) {
            Ok(entry) => entry,
            Err(e) => return Ok(malformed(e)),
        };

        let ack = channel.seal(&[], Tag::Ack.as_u8())?;
        let ping = channel.seal(&[], Tag::Ping.as_u8())?;
        debug!("entry pairing code {}", hex::encode(&entry.pairing_code));
        self.pairing_code = Some(entry.pairing_code);
        self.state = ServerState::AwaitingPong;

        Ok(Transition::Send(vec![ack, ping]))
    }

    fn on_pong(&mut self, datagram: &[u8]) -> Result<Transition, HandshakeError> {
        let channel = self.channel_mut()?;
        if let Err(ignored) = open_step(channel, datagram, Tag::Pong) {
            return Ok(ignored);
        }
        self.state = ServerState::Done;
        Ok(Transition::Complete(Vec::new()))
    }

    fn channel_mut(&mut self) -> Result<&mut SecureChannel, HandshakeError> {
        let state = self.state;
        self.channel
            .as_mut()
            .ok_or_else(|| HandshakeError::UnexpectedState(format!("{:?}", state)))
    }
}

impl<R> std::fmt::Debug for ServerHandshake<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandshake")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::pairing_code;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn identity() -> Arc<SigningIdentity> {
        Arc::new(SigningIdentity::from_bytes(&[0x5e; 32]))
    }

    fn machines(seed: u64) -> (ClientHandshake<StdRng>, ServerHandshake<StdRng>) {
        let identity = identity();
        let client = ClientHandshake::new(
            StdRng::seed_from_u64(seed),
            identity.public_key(),
            pairing_code(b"client secret", "example.site").unwrap(),
        );
        let server = ServerHandshake::new(StdRng::seed_from_u64(seed + 1000), identity);
        (client, server)
    }

    fn sent(transition: Transition) -> Vec<Vec<u8>> {
        match transition {
            Transition::Send(datagrams) | Transition::Complete(datagrams) => datagrams,
            Transition::Ignored(reason) => panic!("unexpectedly ignored: {:?}", reason),
        }
    }

    #[test]
    fn test_full_handshake() {
        let (mut client, mut server) = machines(1);

        let hello = client.start().unwrap();
        assert_eq!(client.state(), ClientState::SentHello);

        let reply = sent(server.handle(&hello).unwrap());
        assert_eq!(server.state(), ServerState::AwaitingEntry);

        let entry = sent(client.handle(&reply[0]).unwrap());
        assert_eq!(client.state(), ClientState::SentEntry);
        assert_eq!(client.session_keys(), server.session_keys());

        let ack_ping = sent(server.handle(&entry[0]).unwrap());
        assert_eq!(ack_ping.len(), 2);
        assert_eq!(server.state(), ServerState::AwaitingPong);

        assert_eq!(client.handle(&ack_ping[0]).unwrap(), Transition::Send(vec![]));
        assert_eq!(client.state(), ClientState::AwaitingPing);

        let pong = match client.handle(&ack_ping[1]).unwrap() {
            Transition::Complete(datagrams) => datagrams,
            other => panic!("expected completion, got {:?}", other),
        };
        assert_eq!(client.state(), ClientState::SentPong);

        assert_eq!(server.handle(&pong[0]).unwrap(), Transition::Complete(vec![]));
        assert_eq!(server.state(), ServerState::Done);
        assert_eq!(
            server.pairing_code().unwrap(),
            &pairing_code(b"client secret", "example.site").unwrap()[..]
        );

        // Finished machines refuse further input
        assert!(matches!(
            client.handle(&pong[0]),
            Err(HandshakeError::UnexpectedState(_))
        ));
        assert!(matches!(
            server.handle(&pong[0]),
            Err(HandshakeError::UnexpectedState(_))
        ));

        let mut client_channel = client.into_channel().unwrap();
        let (mut server_channel, _) = server.into_parts().unwrap();
        let frame = client_channel.seal(b"app data", Tag::TunnelDatagram.as_u8()).unwrap();
        assert_eq!(
            server_channel.open(&frame).unwrap(),
            (b"app data".to_vec(), Tag::TunnelDatagram.as_u8())
        );
    }

    #[test]
    fn test_cookie_round_keeps_key_and_random() {
        let (mut client, _) = machines(2);
        let first = ClientHello::decode(&client.start().unwrap()).unwrap();
        assert_eq!(first.cookie, None);

        let challenge = Cookie {
            cookie: vec![0xc0; 32],
        }
        .encode()
        .unwrap();
        let resent = sent(client.handle(&challenge).unwrap());
        assert_eq!(client.state(), ClientState::AwaitingHello);

        let second = ClientHello::decode(&resent[0]).unwrap();
        assert_eq!(second.random, first.random);
        assert_eq!(second.ecdh_pubkey, first.ecdh_pubkey);
        assert_eq!(second.cookie, Some(vec![0xc0; 32]));
        assert_eq!(client.hello().unwrap(), resent[0]);
    }

    #[test]
    fn test_cookie_loop_bounded() {
        let (client, _) = machines(3);
        let mut client = client.with_max_cookie_rounds(2);
        client.start().unwrap();

        let challenge = Cookie {
            cookie: vec![1; 32],
        }
        .encode()
        .unwrap();
        client.handle(&challenge).unwrap();
        client.handle(&challenge).unwrap();
        assert!(matches!(
            client.handle(&challenge),
            Err(HandshakeError::CookieLoop(3))
        ));
    }

    #[test]
    fn test_wrong_tag_is_not_consumed() {
        let (mut client, mut server) = machines(4);
        let hello = client.start().unwrap();
        let reply = sent(server.handle(&hello).unwrap());
        let entry = sent(client.handle(&reply[0]).unwrap());
        let ack_ping = sent(server.handle(&entry[0]).unwrap());

        // Ping arrives while the client waits for Ack: dropped unopened
        assert_eq!(
            client.handle(&ack_ping[1]).unwrap(),
            Transition::Ignored(IgnoreReason::UnexpectedTag(Tag::Ping.as_u8()))
        );
        assert_eq!(client.state(), ClientState::SentEntry);

        // Ack still opens since the counter did not move
        assert_eq!(client.handle(&ack_ping[0]).unwrap(), Transition::Send(vec![]));
    }

    #[test]
    fn test_replayed_entry_ignored() {
        let (mut client, mut server) = machines(5);
        let hello = client.start().unwrap();
        let reply = sent(server.handle(&hello).unwrap());
        let entry = sent(client.handle(&reply[0]).unwrap());
        sent(server.handle(&entry[0]).unwrap());

        // Server moved on to AwaitingPong, so a replayed Entry is a wrong tag
        assert_eq!(
            server.handle(&entry[0]).unwrap(),
            Transition::Ignored(IgnoreReason::UnexpectedTag(Tag::Entry.as_u8()))
        );
    }

    #[test]
    fn test_tampered_entry_ignored() {
        let (mut client, mut server) = machines(6);
        let hello = client.start().unwrap();
        let reply = sent(server.handle(&hello).unwrap());
        let entry = sent(client.handle(&reply[0]).unwrap());

        let mut tampered = entry[0].clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 0xff;
        assert_eq!(
            server.handle(&tampered).unwrap(),
            Transition::Ignored(IgnoreReason::Cipher(CipherError::Authentication))
        );
        assert_eq!(server.state(), ServerState::AwaitingEntry);
        assert_eq!(sent(server.handle(&entry[0]).unwrap()).len(), 2);
    }

    #[test]
    fn test_duplicate_hello_retransmits_server_hello() {
        let (mut client, mut server) = machines(7);
        let hello = client.start().unwrap();
        let reply = sent(server.handle(&hello).unwrap());

        let again = sent(server.handle(&hello).unwrap());
        assert_eq!(again, reply);
        assert_eq!(server.state(), ServerState::AwaitingEntry);

        let (mut other, _) = machines(8);
        let foreign = other.start().unwrap();
        assert_eq!(
            server.handle(&foreign).unwrap(),
            Transition::Ignored(IgnoreReason::ConflictingHello)
        );
    }

    #[test]
    fn test_short_client_pubkey_ignored() {
        let (_, mut server) = machines(9);
        let hello = ClientHello {
            random: vec![0; 16],
            ecdh_pubkey: vec![0; 31],
            cookie: Some(vec![0; 32]),
        }
        .encode()
        .unwrap();
        assert!(matches!(
            server.handle(&hello).unwrap(),
            Transition::Ignored(IgnoreReason::Malformed(_))
        ));
        assert_eq!(server.state(), ServerState::AwaitingHello);
    }

    #[test]
    fn test_ignore_reason_keeps_cipher_error() {
        let reason = IgnoreReason::Cipher(CipherError::Replay(7));
        let copy = reason.clone();
        assert_eq!(copy, IgnoreReason::Cipher(CipherError::Replay(7)));
        assert_eq!(copy, reason);
    }

    #[test]
    fn test_garbage_ignored_before_hello() {
        let (mut client, mut server) = machines(10);
        assert!(matches!(
            server.handle(&[0x00, 0xff, 0xfe]).unwrap(),
            Transition::Ignored(IgnoreReason::Malformed(_))
        ));
        assert_eq!(
            server.handle(&[0x80; 40]).unwrap(),
            Transition::Ignored(IgnoreReason::UnexpectedTag(0x80))
        );
        assert_eq!(server.state(), ServerState::AwaitingHello);

        client.start().unwrap();
        assert_eq!(
            client.handle(&[0x10; 30]).unwrap(),
            Transition::Ignored(IgnoreReason::UnexpectedTag(0x10))
        );
        assert_eq!(client.state(), ClientState::SentHello);
    }

    #[test]
    fn test_start_twice_rejected() {
        let (mut client, _) = machines(11);
        client.start().unwrap();
        assert!(matches!(
            client.start(),
            Err(HandshakeError::UnexpectedState(_))
        ));
    }
}
