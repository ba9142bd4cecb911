//! Puncher client binary.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::info;
use zeroize::Zeroizing;

use puncher_client::types::{
    DEFAULT_BIND_ADDR, DEFAULT_HELLO_ATTEMPTS, DEFAULT_SERVER_ADDR, DEFAULT_STEP_TIMEOUT,
};
use puncher_client::{connect, ClientConfig, RetryPolicy};
use puncher_common::init_tracing_with_default;
use puncher_crypto::ServerPublicKey;

#[derive(Parser, Debug)]
#[command(name = "puncher-client")]
#[command(about = "Establish a secure channel with a Puncher server")]
struct Args {
    /// Site name the pairing code is bound to
    site: String,

    /// Server address
    #[arg(long, env = "PUNCHER_SERVER", default_value = DEFAULT_SERVER_ADDR)]
    connect: SocketAddr,

    /// Local bind address
    #[arg(long, default_value = DEFAULT_BIND_ADDR)]
    listen: SocketAddr,

    /// Pinned server public key (hex)
    #[arg(long, env = "PUNCHER_SERVER_KEY")]
    server_key: String,

    /// Client shared secret (hex)
    #[arg(long = "client-key", env = "PUNCHER_KEY", hide_env_values = true)]
    client_key: String,

    /// Hellos to send before giving up
    #[arg(long, default_value_t = DEFAULT_HELLO_ATTEMPTS,
          value_parser = clap::value_parser!(u32).range(1..))]
    hello_attempts: u32,

    /// Timeout for each encrypted step in seconds
    #[arg(long, default_value_t = DEFAULT_STEP_TIMEOUT.as_secs(),
          value_parser = clap::value_parser!(u64).range(1..))]
    step_timeout_secs: u64,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing_with_default(&args.log_level);

    let server_key = ServerPublicKey::from_hex(&args.server_key).context("invalid server key")?;
    let client_secret = Zeroizing::new(
        hex::decode(args.client_key.trim()).context("PUNCHER_KEY must be hex")?,
    );
    if client_secret.is_empty() {
        return Err(anyhow!("PUNCHER_KEY must not be empty"));
    }

    let config = ClientConfig {
        server_addr: args.connect,
        bind_addr: args.listen,
        server_key,
        client_secret,
        site: args.site,
        retry: RetryPolicy {
            hello_attempts: args.hello_attempts,
            step_timeout: Duration::from_secs(args.step_timeout_secs),
            ..RetryPolicy::default()
        },
    };

    let connection = connect(&config)
        .await
        .with_context(|| format!("handshake with {} failed", config.server_addr))?;
    info!(
        "connected to {} from {}",
        connection.server,
        connection.socket.local_addr()?
    );

    Ok(())
}
