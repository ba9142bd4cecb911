use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info};

use puncher_core::{DatagramTransport, MAX_DATAGRAM_SIZE};
use puncher_crypto::{
    pairing_code, ClientHandshake, ClientState, HandshakeError, SecureChannel, Transition,
};

use crate::types::{ClientConfig, RetryPolicy};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no response from {server} after {attempts} hello attempts")]
    HelloTimeout { server: SocketAddr, attempts: u32 },

    #[error("timed out after {timeout:?} waiting in state {state:?}")]
    StepTimeout {
        timeout: Duration,
        state: ClientState,
    },

    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

/// An established secure channel to the server.
#[derive(Debug)]
pub struct Connection {
    pub socket: UdpSocket,
    pub server: SocketAddr,
    pub channel: SecureChannel,
}

/// Bind a socket and run the handshake described by `config`.
pub async fn connect(config: &ClientConfig) -> Result<Connection, ClientError> {
    let socket = UdpSocket::bind(config.bind_addr).await?;
    let code =
        pairing_code(&config.client_secret, &config.site).map_err(HandshakeError::from)?;
    debug!("pairing code for {}: {}", config.site, hex::encode(code));

    let handshake = ClientHandshake::new(OsRng, config.server_key, code)
        .with_max_cookie_rounds(config.retry.max_cookie_rounds);

    info!("starting handshake with {}", config.server_addr);
    let channel = drive(&socket, config.server_addr, handshake, &config.retry).await?;
    info!("secure channel established with {}", config.server_addr);

    Ok(Connection {
        socket,
        server: config.server_addr,
        channel,
    })
}

fn awaiting_hello(state: ClientState) -> bool {
    matches!(state, ClientState::SentHello | ClientState::AwaitingHello)
}

/// Drive a client handshake over `transport` until it completes or fails.
///
/// The hello is retransmitted every `hello_interval` until the server
/// answers or `hello_attempts` hellos have gone unanswered. Once the server
/// hello is verified, each later step gets `step_timeout`.
pub async fn drive<T, R>(
    transport: &T,
    server: SocketAddr,
    mut handshake: ClientHandshake<R>,
    policy: &RetryPolicy,
) -> Result<SecureChannel, ClientError>
where
    T: DatagramTransport,
    R: RngCore + CryptoRng,
{
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    let attempts = policy.hello_attempts.max(1);

    transport.send_to(&handshake.start()?, server).await?;
    let mut attempt = 1;
    let mut deadline = Instant::now() + policy.hello_interval;

    loop {
        let (len, src) = match timeout_at(deadline, transport.recv_from(&mut buf)).await {
            Ok(received) => received?,
            Err(_) => {
                let state = handshake.state();
                if !awaiting_hello(state) {
                    return Err(ClientError::StepTimeout {
                        timeout: policy.step_timeout,
                        state,
                    });
                }
                if attempt >= attempts {
                    return Err(ClientError::HelloTimeout {
                        server,
                        attempts: attempt,
                    });
                }
                attempt += 1;
                transport.send_to(&handshake.hello()?, server).await?;
                debug!("resent hello (attempt {}/{})", attempt, attempts);
                deadline = Instant::now() + policy.hello_interval;
                continue;
            }
        };

        if src != server {
            debug!("ignoring datagram from unexpected peer {}", src);
            continue;
        }

        match handshake.handle(&buf[..len])? {
            Transition::Send(replies) => {
                for reply in &replies {
                    transport.send_to(reply, server).await?;
                }
                debug!("handshake now {:?}", handshake.state());
                deadline = if awaiting_hello(handshake.state()) {
                    // Cookie round: the server is reachable, start counting again
                    attempt = 1;
                    Instant::now() + policy.hello_interval
                } else {
                    Instant::now() + policy.step_timeout
                };
            }
            Transition::Ignored(reason) => {
                debug!("ignored datagram in {:?}: {:?}", handshake.state(), reason);
            }
            Transition::Complete(replies) => {
                for reply in &replies {
                    transport.send_to(reply, server).await?;
                }
                break;
            }
        }
    }

    let state = handshake.state();
    handshake
        .into_channel()
        .ok_or_else(|| HandshakeError::UnexpectedState(format!("{:?}", state)).into())
}
