//! Edgevault server binary.
//!
//! # Usage
//!
//! ```bash
//! # In-memory storage (development)
//! edgevault-server --bind 127.0.0.1:7878
//!
//! # Durable storage, one-hour sessions
//! edgevault-server --db-path edgevault.redb --session-window-ms 3600000
//! ```

use std::path::PathBuf;

use clap::Parser;
use edgevault_core::{EdgeConfig, config};
use edgevault_server::ServerRuntimeConfig;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Edgevault session and prekey server
#[derive(Parser, Debug)]
#[command(name = "edgevault-server")]
#[command(about = "Per-identity sessions and one-time prekeys")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:7878")]
    bind: String,

    /// Redb database file (in-memory storage when omitted)
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Session lifetime in milliseconds
    #[arg(long, default_value_t = config::DEFAULT_SESSION_WINDOW_MS)]
    session_window_ms: u64,

    /// Prekeys per batch when a request omits the count
    #[arg(long, default_value_t = config::DEFAULT_BATCH_SIZE)]
    default_batch_size: u32,

    /// First key id when a request omits it
    #[arg(long, default_value_t = config::DEFAULT_START_ID)]
    default_start_id: u32,

    /// Largest batch a single request may ask for
    #[arg(long, default_value_t = config::DEFAULT_MAX_BATCH_SIZE)]
    max_batch_size: u32,

    /// Period of the background expiry sweep in milliseconds
    #[arg(long, default_value_t = config::DEFAULT_SWEEP_INTERVAL_MS)]
    sweep_interval_ms: u64,

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

    tracing::info!(bind = %args.bind, "edgevault server starting");

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        db_path: args.db_path,
        edge: EdgeConfig {
            session_window_ms: args.session_window_ms,
            default_batch_size: args.default_batch_size,
            default_start_id: args.default_start_id,
            max_batch_size: args.max_batch_size,
            sweep_interval_ms: args.sweep_interval_ms,
        },
    };

    edgevault_server::run(config).await?;

    Ok(())
}
