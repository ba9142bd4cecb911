#![forbid(unsafe_code)]

//! Puncher rendezvous server.
//!
//! The server:
//! 1. Answers hellos without a valid address cookie with a stateless `Cookie`
//! 2. Spawns one handshake worker per admitted peer address
//! 3. Reports each established session with the peer's pairing code

pub mod config;
pub mod dispatcher;
pub mod session;

pub use config::ServerConfig;
pub use dispatcher::{Dispatcher, DropReason, Route};
pub use session::{run_session, SessionError, SessionOutcome};
