//! Rendezvous terminal client.
//!
//! # Usage
//!
//! ```bash
//! # Open conversation 42, storing a token first
//! rendezvous --conversation 42 --token "$TOKEN"
//!
//! # Open the one-to-one conversation with user 7 on a remote server
//! rendezvous --with-user 7 --api-url https://chat.example.com --ws-url wss://chat.example.com
//! ```

use clap::Parser;
use rendezvous_cli::{Args, ClientConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    // stdout belongs to the chat transcript.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = ClientConfig::from_args(args)?;
    Ok(rendezvous_cli::run(config).await?)
}
