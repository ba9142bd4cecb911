//! Per-peer handshake worker.
//!
//! A worker owns its inbox, its handshake machine and, once derived, the
//! session keys. Nothing else touches them. The worker ends on success,
//! on a fatal handshake error, or when a step does not progress before the
//! step timeout; in every case the keys are dropped with it.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rand::{CryptoRng, RngCore};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use puncher_core::DatagramTransport;
use puncher_crypto::{HandshakeError, SecureChannel, ServerHandshake, ServerState, Transition};

/// Reasons a session worker stops without establishing a channel.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no progress within {timeout:?} in state {state:?}")]
    Timeout {
        timeout: Duration,
        state: ServerState,
    },

    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    #[error("inbox closed")]
    InboxClosed,
}

/// An established session handed back by a worker.
#[derive(Debug)]
pub struct SessionOutcome {
    pub peer: SocketAddr,
    /// Pairing code the client presented in its `Entry`.
    pub pairing_code: Vec<u8>,
    pub channel: SecureChannel,
}

/// Drive one server handshake to completion.
///
/// Each step must make progress (a reply sent or the handshake finished)
/// within `step_timeout`. Ignored datagrams do not extend the deadline.
pub async fn run_session<T, R>(
    peer: SocketAddr,
    transport: Arc<T>,
    mut handshake: ServerHandshake<R>,
    mut inbox: mpsc::Receiver<Bytes>,
    step_timeout: Duration,
) -> Result<SessionOutcome, SessionError>
where
    T: DatagramTransport,
    R: RngCore + CryptoRng,
{
    let mut deadline = Instant::now() + step_timeout;

    loop {
        let datagram = match timeout_at(deadline, inbox.recv()).await {
            Ok(Some(datagram)) => datagram,
            Ok(None) => return Err(SessionError::InboxClosed),
            Err(_) => {
                return Err(SessionError::Timeout {
                    timeout: step_timeout,
                    state: handshake.state(),
                })
            }
        };

        match handshake.handle(&datagram)? {
            Transition::Send(replies) => {
                for reply in &replies {
                    transport.send_to(reply, peer).await?;
                }
                debug!("{}: now {:?}", peer, handshake.state());
                deadline = Instant::now() + step_timeout;
            }
            Transition::Ignored(reason) => {
                debug!("{}: ignored datagram in {:?}: {:?}", peer, handshake.state(), reason);
            }
            Transition::Complete(replies) => {
                for reply in &replies {
                    transport.send_to(reply, peer).await?;
                }
                break;
            }
        }
    }

    let state = handshake.state();
    let (channel, pairing_code) = handshake
        .into_parts()
        .ok_or_else(|| HandshakeError::UnexpectedState(format!("{:?}", state)))?;

    Ok(SessionOutcome {
        peer,
        pairing_code,
        channel,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use puncher_crypto::SigningIdentity;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tokio::net::UdpSocket;

    async fn loopback() -> (Arc<UdpSocket>, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer_addr = peer.local_addr().unwrap();
        (Arc::new(socket), peer_addr)
    }

    fn handshake() -> ServerHandshake<StdRng> {
        ServerHandshake::new(
            StdRng::seed_from_u64(1),
            Arc::new(SigningIdentity::from_bytes(&[4u8; 32])),
        )
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let (transport, peer) = loopback().await;
        let (_tx, rx) = mpsc::channel(4);

        let result = run_session(peer, transport, handshake(), rx, Duration::from_millis(50)).await;
        assert!(matches!(
            result,
            Err(SessionError::Timeout {
                state: ServerState::AwaitingHello,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_garbage_does_not_extend_deadline() {
        let (transport, peer) = loopback().await;
        let (tx, rx) = mpsc::channel(64);

        let worker = tokio::spawn(run_session(
            peer,
            transport,
            handshake(),
            rx,
            Duration::from_millis(200),
        ));
        for _ in 0..10 {
            if tx.send(Bytes::from_static(&[0x80, 0, 0])).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let result = tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(SessionError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_closed_inbox() {
        let (transport, peer) = loopback().await;
        let (tx, rx) = mpsc::channel(1);
        drop(tx);

        let result = run_session(peer, transport, handshake(), rx, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(SessionError::InboxClosed)));
    }
}
