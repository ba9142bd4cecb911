//! Puncher CLI tools: key generation, pairing codes, diagnostics.

#![forbid(unsafe_code)]

use std::net::SocketAddr;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use rand::RngCore;
use zeroize::Zeroizing;

use puncher_core::{ClientHello, Cookie, HandshakeMessage, RANDOM_SIZE};
use puncher_crypto::{pairing_code, KeyPair, ServerPublicKey, SigningIdentity};

#[derive(Parser, Debug)]
#[command(name = "punchctl")]
#[command(about = "Puncher CLI tools")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new server signing key
    Keygen {
        /// Output file path (without extension)
        #[arg(short, long, default_value = "puncher")]
        output: String,
    },

    /// Print the hex public key from a key file (.key or .pub)
    ShowKey {
        /// Key file path
        #[arg(short, long)]
        key: String,

        /// The file holds a signing seed rather than a public key
        #[arg(long, default_value_t = false)]
        private: bool,
    },

    /// Print the pairing code for a site
    PairingCode {
        /// Site name
        site: String,

        /// Client shared secret (hex)
        #[arg(long = "client-key", env = "PUNCHER_KEY", hide_env_values = true)]
        client_key: String,
    },

    /// Check that a server answers hellos with a cookie
    Probe {
        /// Server address (host:port)
        #[arg(short, long)]
        server: SocketAddr,
    },

    /// Show version information
    Version,
}

fn main() -> Result<()> {
    puncher_common::init_tracing();

    let args = Args::parse();

    match args.command {
        Command::Keygen { output } => {
            println!("Generating Ed25519 signing key...");

            let identity = SigningIdentity::generate();
            let private_path = format!("{}.key", output);
            let public_path = format!("{}.pub", output);

            identity.save(&private_path, &public_path)?;

            println!("Private key: {}", private_path);
            println!("Public key:  {}", public_path);
            println!("PUNCHER_SERVER_KEY={}", identity.public_key());
        }
        Command::ShowKey { key, private } => {
            let public = if private {
                SigningIdentity::load(&key)?.public_key()
            } else {
                ServerPublicKey::load(&key)?
            };
            println!("{}", public);
        }
        Command::PairingCode { site, client_key } => {
            let secret = Zeroizing::new(
                hex::decode(client_key.trim()).context("PUNCHER_KEY must be hex")?,
            );
            println!("{}", hex::encode(pairing_code(&secret, &site)?));
        }
        Command::Probe { server } => {
            println!("Probing {}...", server);

            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;

            rt.block_on(async {
                use tokio::net::UdpSocket;
                use tokio::time::{timeout, Duration, Instant};

                let socket = UdpSocket::bind("0.0.0.0:0").await?;
                socket.connect(server).await?;

                let mut rng = rand::rngs::OsRng;
                let mut random = [0u8; RANDOM_SIZE];
                rng.fill_bytes(&mut random);
                let hello = ClientHello {
                    random: random.to_vec(),
                    ecdh_pubkey: KeyPair::generate(&mut rng).public_key().to_vec(),
                    cookie: None,
                };

                let start_time = Instant::now();
                socket.send(&hello.encode()?).await?;

                let mut buf = [0u8; 1500];
                match timeout(Duration::from_secs(2), socket.recv(&mut buf)).await {
                    Ok(Ok(len)) => {
                        let rtt = start_time.elapsed();
                        match Cookie::decode(&buf[..len]) {
                            Ok(_) => println!("Cookie from {}: RTT={:?}", server, rtt),
                            Err(e) => println!("Unexpected reply from {}: {}", server, e),
                        }
                        Ok(())
                    }
                    Ok(Err(e)) => Err(anyhow!("error receiving from {}: {}", server, e)),
                    Err(_) => Err(anyhow!("probe timeout for {}", server)),
                }
            })?;
        }
        Command::Version => {
            println!("punchctl {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
