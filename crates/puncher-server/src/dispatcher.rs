//! Datagram dispatcher.
//!
//! A single receive loop owns the session table and the cookie jar. Datagrams
//! from known peers go straight into that peer's inbox; the loop never looks
//! at cipher state. Datagrams from unknown peers are only considered if they
//! are a `ClientHello`, and only a hello carrying a valid cookie for its
//! source address allocates anything.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use rand::rngs::OsRng;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

use puncher_core::{
    ClientHello, Cookie, DatagramTransport, HandshakeMessage, MessageError, MAX_DATAGRAM_SIZE,
};
use puncher_crypto::{CookieJar, ServerHandshake, SigningIdentity};

use crate::config::ServerConfig;
use crate::session::{run_session, SessionOutcome};

/// What the dispatcher did with one datagram.
#[derive(Debug, PartialEq, Eq)]
pub enum Route {
    /// Queued for an existing session.
    Delivered,
    /// Unknown peer without a valid cookie; send this `Cookie` reply.
    Challenge(Vec<u8>),
    /// New session created and the hello handed to its worker.
    Admitted,
    /// Dropped without a reply.
    Dropped(DropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Unknown peer sent something other than a `ClientHello`.
    NotAHello,
    /// Unknown peer sent an undecodable hello.
    Malformed,
    /// Session table is full.
    SessionLimit,
    /// Known peer's inbox is full.
    InboxFull,
}

struct SessionEntry {
    id: u64,
    inbox: mpsc::Sender<Bytes>,
}

/// Server-side session dispatcher.
pub struct Dispatcher<T> {
    transport: Arc<T>,
    identity: Arc<SigningIdentity>,
    config: ServerConfig,
    cookies: CookieJar,
    sessions: HashMap<SocketAddr, SessionEntry>,
    next_id: u64,
    closed_tx: mpsc::UnboundedSender<(SocketAddr, u64)>,
    closed_rx: mpsc::UnboundedReceiver<(SocketAddr, u64)>,
    outcomes: Option<mpsc::UnboundedSender<SessionOutcome>>,
}

impl<T: DatagramTransport> Dispatcher<T> {
    pub fn new(transport: Arc<T>, identity: Arc<SigningIdentity>, config: ServerConfig) -> Self {
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            identity,
            config,
            cookies: CookieJar::new(&mut OsRng),
            sessions: HashMap::new(),
            next_id: 0,
            closed_tx,
            closed_rx,
            outcomes: None,
        }
    }

    /// Forward every established session to `tx`.
    pub fn with_outcomes(mut self, tx: mpsc::UnboundedSender<SessionOutcome>) -> Self {
        self.outcomes = Some(tx);
        self
    }

    /// Number of live sessions in the table.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Replace the cookie key. Every cookie issued so far stops verifying.
    pub fn rotate_cookie_key(&mut self) {
        self.cookies.rotate(&mut OsRng);
        debug!("cookie key rotated (generation {})", self.cookies.generation());
    }

    /// Route one inbound datagram.
    pub fn handle_datagram(&mut self, datagram: Bytes, src: SocketAddr) -> Route {
        let datagram = match self.sessions.get(&src) {
            Some(entry) => match entry.inbox.try_send(datagram) {
                Ok(()) => return Route::Delivered,
                Err(TrySendError::Full(_)) => {
                    debug!("{}: inbox full, dropping datagram", src);
                    return Route::Dropped(DropReason::InboxFull);
                }
                Err(TrySendError::Closed(datagram)) => {
                    // Worker is gone but its close event is still queued
                    self.sessions.remove(&src);
                    datagram
                }
            },
            None => datagram,
        };

        self.handle_unknown(datagram, src)
    }

    fn handle_unknown(&mut self, datagram: Bytes, src: SocketAddr) -> Route {
        let hello = match ClientHello::decode(&datagram) {
            Ok(hello) => hello,
            Err(MessageError::UnexpectedTag { .. }) | Err(MessageError::Wire(_)) => {
                return Route::Dropped(DropReason::NotAHello)
            }
            Err(e) => {
                debug!("{}: bad hello: {}", src, e);
                return Route::Dropped(DropReason::Malformed);
            }
        };

        let cookie_ok = hello
            .cookie
            .as_deref()
            .map_or(false, |cookie| self.cookies.verify(src, cookie));
        if !cookie_ok {
            let challenge = Cookie {
                cookie: self.cookies.issue(src).to_vec(),
            };
            return match challenge.encode() {
                Ok(reply) => Route::Challenge(reply),
                Err(e) => {
                    warn!("failed to encode cookie for {}: {}", src, e);
                    Route::Dropped(DropReason::Malformed)
                }
            };
        }

        if self.sessions.len() >= self.config.max_sessions {
            warn!(
                "{}: session limit ({}) reached",
                src, self.config.max_sessions
            );
            return Route::Dropped(DropReason::SessionLimit);
        }

        self.admit(datagram, src);
        Route::Admitted
    }

    fn admit(&mut self, hello: Bytes, src: SocketAddr) {
        let id = self.next_id;
        self.next_id += 1;

        let (inbox, rx) = mpsc::channel(self.config.inbox_capacity.max(1));
        if inbox.try_send(hello).is_err() {
            return;
        }
        self.sessions.insert(src, SessionEntry { id, inbox });
        info!("{}: session {} started", src, id);

        let handshake = ServerHandshake::new(OsRng, self.identity.clone());
        let transport = self.transport.clone();
        let step_timeout = self.config.step_timeout;
        let closed = self.closed_tx.clone();
        let outcomes = self.outcomes.clone();

        tokio::spawn(async move {
            match run_session(src, transport, handshake, rx, step_timeout).await {
                Ok(outcome) => {
                    info!(
                        "{}: session {} established, pairing code {}",
                        src,
                        id,
                        hex::encode(&outcome.pairing_code)
                    );
                    if let Some(tx) = outcomes {
                        let _ = tx.send(outcome);
                    }
                }
                Err(e) => warn!("{}: session {} ended: {}", src, id, e),
            }
            let _ = closed.send((src, id));
        });
    }

    /// Remove a finished session, unless the address already belongs to a
    /// newer one.
    fn on_closed(&mut self, src: SocketAddr, id: u64) {
        if self.sessions.get(&src).map(|entry| entry.id) == Some(id) {
            self.sessions.remove(&src);
            debug!("{}: session {} removed", src, id);
        }
    }

    /// Run the receive loop until the transport fails.
    pub async fn run(mut self) -> io::Result<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let period = self.config.cookie_rotation;
        let mut rotation = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                result = self.transport.recv_from(&mut buf) => {
                    let (len, src) = result?;
                    let datagram = Bytes::copy_from_slice(&buf[..len]);

                    match self.handle_datagram(datagram, src) {
                        Route::Challenge(reply) => {
                            if let Err(e) = self.transport.send_to(&reply, src).await {
                                warn!("failed to send cookie to {}: {}", src, e);
                            }
                        }
                        Route::Dropped(reason) => debug!("{}: dropped ({:?})", src, reason),
                        Route::Delivered | Route::Admitted => {}
                    }
                }
                Some((src, id)) = self.closed_rx.recv() => {
                    self.on_closed(src, id);
                }
                _ = rotation.tick() => {
                    self.rotate_cookie_key();
                }
            }
        }
    }
}
