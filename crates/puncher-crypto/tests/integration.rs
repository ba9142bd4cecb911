//! Integration tests for the handshake over UDP.

use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use rand::rngs::StdRng;
use rand::SeedableRng;

use puncher_core::{HandshakeMessage, ServerHello, Tag};
use puncher_crypto::{
    pairing_code, ClientHandshake, ClientState, HandshakeError, ServerHandshake, ServerState,
    SigningIdentity, Transition,
};

const SERVER_SEED: [u8; 32] = [0x11; 32];

fn datagrams(transition: Transition) -> Vec<Vec<u8>> {
    match transition {
        Transition::Send(d) | Transition::Complete(d) => d,
        Transition::Ignored(reason) => panic!("ignored: {:?}", reason),
    }
}

/// Full handshake between two sockets with fixed seeds on both sides
#[tokio::test]
async fn test_handshake_over_udp_with_fixed_seeds() {
    let server_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server_addr = server_socket.local_addr().unwrap();
    let client_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let identity = Arc::new(SigningIdentity::from_bytes(&SERVER_SEED));
    let pinned = identity.public_key();

    let server_handle = tokio::spawn(async move {
        let mut server = ServerHandshake::new(StdRng::seed_from_u64(200), identity);
        let mut buf = vec![0u8; 1500];

        while !server.is_complete() {
            let (len, peer) = server_socket.recv_from(&mut buf).await.unwrap();
            for datagram in datagrams(server.handle(&buf[..len]).unwrap()) {
                server_socket.send_to(&datagram, peer).await.unwrap();
            }
        }

        assert_eq!(server.state(), ServerState::Done);
        let keys = server.session_keys().cloned().unwrap();
        let (mut channel, code) = server.into_parts().unwrap();

        // Application frame after the handshake
        let (len, _) = server_socket.recv_from(&mut buf).await.unwrap();
        let (plaintext, tag) = channel.open(&buf[..len]).unwrap();
        assert_eq!(plaintext, b"Hello from client!");
        assert_eq!(tag, Tag::TunnelDatagram.as_u8());

        (keys, code)
    });

    let code = pairing_code(b"shared client secret", "site-a").unwrap();
    let mut client = ClientHandshake::new(StdRng::seed_from_u64(100), pinned, code);
    let hello = client.start().unwrap();
    client_socket.send_to(&hello, server_addr).await.unwrap();

    let mut buf = vec![0u8; 1500];
    while !client.is_complete() {
        let (len, _) = timeout(Duration::from_secs(5), client_socket.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        for datagram in datagrams(client.handle(&buf[..len]).unwrap()) {
            client_socket.send_to(&datagram, server_addr).await.unwrap();
        }
    }
    assert_eq!(client.state(), ClientState::SentPong);

    let client_keys = client.session_keys().cloned().unwrap();
    let mut channel = client.into_channel().unwrap();
    let frame = channel
        .seal(b"Hello from client!", Tag::TunnelDatagram.as_u8())
        .unwrap();
    client_socket.send_to(&frame, server_addr).await.unwrap();

    let (server_keys, server_code) = timeout(Duration::from_secs(5), server_handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(client_keys, server_keys);
    assert_eq!(server_code, code.to_vec());
}

/// Same seeds give the same transcript and keys
#[test]
fn test_seeded_handshake_is_reproducible() {
    fn run() -> (Vec<u8>, Vec<u8>, puncher_crypto::SessionKeys) {
        let identity = Arc::new(SigningIdentity::from_bytes(&SERVER_SEED));
        let mut client =
            ClientHandshake::new(StdRng::seed_from_u64(1), identity.public_key(), [7u8; 32]);
        let mut server = ServerHandshake::new(StdRng::seed_from_u64(2), identity);

        let hello = client.start().unwrap();
        let reply = datagrams(server.handle(&hello).unwrap()).remove(0);
        datagrams(client.handle(&reply).unwrap());
        (hello, reply, client.session_keys().cloned().unwrap())
    }

    let (hello_a, reply_a, keys_a) = run();
    let (hello_b, reply_b, keys_b) = run();
    assert_eq!(hello_a, hello_b);
    assert_eq!(reply_a, reply_b);
    assert_eq!(keys_a, keys_b);
}

/// Every single corrupted signature byte is rejected before key derivation
#[test]
fn test_corrupted_signature_rejected() {
    let identity = Arc::new(SigningIdentity::from_bytes(&SERVER_SEED));

    let mut server = ServerHandshake::new(StdRng::seed_from_u64(9), identity.clone());
    let mut probe = ClientHandshake::new(StdRng::seed_from_u64(8), identity.public_key(), [0; 32]);
    let hello = probe.start().unwrap();
    let reply = datagrams(server.handle(&hello).unwrap()).remove(0);
    let server_hello = ServerHello::decode(&reply).unwrap();

    for idx in 0..server_hello.signature.len() {
        let mut corrupted = server_hello.clone();
        corrupted.signature[idx] ^= 0x01;

        // Same seed, so the client random matches the one the server signed
        let mut client =
            ClientHandshake::new(StdRng::seed_from_u64(8), identity.public_key(), [0; 32]);
        client.start().unwrap();

        let result = client.handle(&corrupted.encode().unwrap());
        assert!(
            matches!(result, Err(HandshakeError::ServerVerificationFailed)),
            "signature byte {} accepted",
            idx
        );
        assert!(client.session_keys().is_none());
        assert_eq!(client.state(), ClientState::SentHello);
    }

    // The untouched reply still verifies
    assert!(matches!(
        probe.handle(&reply).unwrap(),
        Transition::Send(_)
    ));
    assert_eq!(probe.state(), ClientState::SentEntry);
}

/// A server key other than the pinned one is rejected
#[test]
fn test_impostor_server_rejected() {
    let real = SigningIdentity::from_bytes(&SERVER_SEED);
    let impostor = Arc::new(SigningIdentity::from_bytes(&[0x22; 32]));

    let mut client = ClientHandshake::new(StdRng::seed_from_u64(3), real.public_key(), [0; 32]);
    let mut server = ServerHandshake::new(StdRng::seed_from_u64(4), impostor);

    let hello = client.start().unwrap();
    let reply = datagrams(server.handle(&hello).unwrap()).remove(0);
    assert!(matches!(
        client.handle(&reply),
        Err(HandshakeError::ServerVerificationFailed)
    ));
    assert!(client.session_keys().is_none());
}
