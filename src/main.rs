//! LineKV - An In-Memory Key-Value Store With Expiring Keys
//!
//! This is the main entry point for the LineKV server.
//! It reads the command line, sets up logging, and runs the server until
//! Ctrl+C.

use clap::Parser;
use linekv::server::{Server, ServerConfig};
use linekv::storage::ExpiryConfig;
use linekv::{DEFAULT_HOST, DEFAULT_PORT};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "linekv", version, about = "LineKV - in-memory key-value store")]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Port to listen on (0 picks a free port)
    #[arg(long, short, env = "LINEKV_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Starting interval of the expiry sweeper, in milliseconds
    #[arg(long, default_value_t = 100)]
    sweep_interval_ms: u64,

    /// Disable the background expiry sweeper
    #[arg(long)]
    no_sweep: bool,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        let defaults = ExpiryConfig::default();
        let base_interval = Duration::from_millis(self.sweep_interval_ms.max(1));

        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            expiry: ExpiryConfig {
                base_interval,
                min_interval: defaults.min_interval.min(base_interval),
                max_interval: defaults.max_interval.max(base_interval),
                ..defaults
            },
            sweeper_enabled: !self.no_sweep,
        }
    }
}

fn print_banner(addr: &str) {
    println!(
        r#"
LineKV v{} - In-Memory Key-Value Store
──────────────────────────────────────────────────────────────
Server started on {}
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        linekv::VERSION,
        addr
    );
}

/// Resolves on Ctrl+C. If the handler cannot be installed, never resolves.
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine, flags and the real environment still apply
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Set up logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let server = Server::bind(args.server_config()).await?;
    print_banner(&server.local_addr()?.to_string());

    let storage = server.storage();
    let stats = server.stats();

    server.run_until(shutdown_signal()).await;

    let storage_stats = storage.stats();
    info!(
        keys = storage_stats.keys,
        get_ops = storage_stats.get_ops,
        set_ops = storage_stats.set_ops,
        del_ops = storage_stats.del_ops,
        expired = storage_stats.expired,
        "Final storage statistics"
    );
    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        bytes_read = stats.bytes_read.load(Ordering::Relaxed),
        bytes_written = stats.bytes_written.load(Ordering::Relaxed),
        "Final connection statistics"
    );

    info!("Server shutdown complete");
    Ok(())
}
