use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use puncher_crypto::handshake::DEFAULT_MAX_COOKIE_ROUNDS;
use puncher_crypto::ServerPublicKey;
use zeroize::Zeroizing;

pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:1111";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:0";
pub const DEFAULT_HELLO_ATTEMPTS: u32 = 5;
pub const DEFAULT_HELLO_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Retransmission and timeout settings for one connection attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Hellos sent (first one included) before giving up on the server.
    pub hello_attempts: u32,
    /// Wait between hello retransmissions.
    pub hello_interval: Duration,
    /// Wait for each encrypted step once the server hello is verified.
    pub step_timeout: Duration,
    /// Cookie challenges accepted before giving up.
    pub max_cookie_rounds: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            hello_attempts: DEFAULT_HELLO_ATTEMPTS,
            hello_interval: DEFAULT_HELLO_INTERVAL,
            step_timeout: DEFAULT_STEP_TIMEOUT,
            max_cookie_rounds: DEFAULT_MAX_COOKIE_ROUNDS,
        }
    }
}

#[derive(Clone)]
pub struct ClientConfig {
    pub server_addr: SocketAddr,
    pub bind_addr: SocketAddr,
    /// Pinned server verifying key.
    pub server_key: ServerPublicKey,
    /// Shared secret the pairing code is derived from.
    pub client_secret: Zeroizing<Vec<u8>>,
    /// Site the pairing code is bound to.
    pub site: String,
    pub retry: RetryPolicy,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("server_addr", &self.server_addr)
            .field("bind_addr", &self.bind_addr)
            .field("server_key", &self.server_key)
            .field("site", &self.site)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
