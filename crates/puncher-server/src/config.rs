//! Server configuration.

use std::time::Duration;

/// Default cookie key rotation period in seconds
pub const DEFAULT_COOKIE_ROTATION_SECS: u64 = 60;
/// Default per-step handshake timeout in seconds
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 10;
/// Default maximum concurrent handshakes
pub const DEFAULT_MAX_SESSIONS: usize = 1024;
/// Datagrams buffered per session before new ones are dropped
pub const DEFAULT_INBOX_CAPACITY: usize = 16;

/// Dispatcher and session worker settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// How often the cookie key is replaced.
    pub cookie_rotation: Duration,
    /// How long a worker waits for the next handshake message.
    pub step_timeout: Duration,
    /// Live sessions allowed at once.
    pub max_sessions: usize,
    /// Capacity of each session inbox.
    pub inbox_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cookie_rotation: Duration::from_secs(DEFAULT_COOKIE_ROTATION_SECS),
            step_timeout: Duration::from_secs(DEFAULT_STEP_TIMEOUT_SECS),
            max_sessions: DEFAULT_MAX_SESSIONS,
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
        }
    }
}
