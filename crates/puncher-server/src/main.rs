#![forbid(unsafe_code)]

//! Puncher server binary.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::UdpSocket;
use tracing::{info, warn};

use puncher_common::init_tracing_with_default;
use puncher_crypto::SigningIdentity;
use puncher_server::config::{
    DEFAULT_COOKIE_ROTATION_SECS, DEFAULT_MAX_SESSIONS, DEFAULT_STEP_TIMEOUT_SECS,
};
use puncher_server::{Dispatcher, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "puncher-server")]
#[command(about = "Puncher rendezvous server - authenticated, encrypted UDP handshakes")]
struct Args {
    /// UDP listen address
    #[arg(long, default_value = "127.0.0.1:1111")]
    listen: SocketAddr,

    /// File holding the 32-byte Ed25519 signing seed
    #[arg(long, conflicts_with = "sign_key_hex")]
    sign_key: Option<PathBuf>,

    /// Hex-encoded Ed25519 signing seed
    #[arg(long = "sign-key-hex", env = "PUNCHER_SIGN_KEY", hide_env_values = true)]
    sign_key_hex: Option<String>,

    /// Generate a throwaway signing key (development only)
    #[arg(long, default_value_t = false)]
    ephemeral_sign_key: bool,

    /// Cookie key rotation period in seconds
    #[arg(long, default_value_t = DEFAULT_COOKIE_ROTATION_SECS,
          value_parser = clap::value_parser!(u64).range(1..))]
    cookie_rotation_secs: u64,

    /// Per-step handshake timeout in seconds
    #[arg(long, default_value_t = DEFAULT_STEP_TIMEOUT_SECS,
          value_parser = clap::value_parser!(u64).range(1..))]
    step_timeout_secs: u64,

    /// Maximum concurrent sessions
    #[arg(long, default_value_t = DEFAULT_MAX_SESSIONS)]
    max_sessions: usize,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn load_identity(args: &Args) -> Result<SigningIdentity> {
    if let Some(path) = &args.sign_key {
        return SigningIdentity::load(path)
            .with_context(|| format!("failed to load signing key from {}", path.display()));
    }
    if let Some(seed_hex) = &args.sign_key_hex {
        return SigningIdentity::from_hex(seed_hex).context("invalid PUNCHER_SIGN_KEY");
    }
    if args.ephemeral_sign_key {
        warn!("using an ephemeral signing key; clients cannot pin it across restarts");
        return Ok(SigningIdentity::generate());
    }
    Err(anyhow::anyhow!(
        "signing key is required; pass --sign-key, set PUNCHER_SIGN_KEY, or use --ephemeral-sign-key"
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing_with_default(&args.log_level);

    info!("Starting puncher-server v{}", env!("CARGO_PKG_VERSION"));

    let identity = load_identity(&args)?;
    info!("Server signing key: {}", identity.public_key());

    let config = ServerConfig {
        cookie_rotation: Duration::from_secs(args.cookie_rotation_secs),
        step_timeout: Duration::from_secs(args.step_timeout_secs),
        max_sessions: args.max_sessions,
        ..ServerConfig::default()
    };

    let socket = UdpSocket::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    info!("Listening on {}", socket.local_addr()?);

    let dispatcher = Dispatcher::new(Arc::new(socket), Arc::new(identity), config);

    tokio::select! {
        result = dispatcher.run() => result.context("receive loop failed")?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    Ok(())
}
