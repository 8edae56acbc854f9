//! Switchboard server binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default port
//! switchboard-server
//!
//! # Custom bind address and connection limit
//! switchboard-server --bind 0.0.0.0:3000 --max-connections 5000
//! ```

use clap::Parser;
use switchboard_server::{DriverConfig, Server, ServerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Switchboard matchmaking and relay server
#[derive(Parser, Debug)]
#[command(name = "switchboard-server")]
#[command(about = "WebSocket matchmaking and relay hub")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:3000")]
    bind: String,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("switchboard server starting");
    tracing::info!("binding to {}", args.bind);

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        driver: DriverConfig { max_connections: args.max_connections },
    };

    let server = Server::bind(config).await?;

    server.run().await?;

    Ok(())
}
