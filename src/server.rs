//! TCP Server
//!
//! Owns the listener, the storage engine, and the expiry sweeper. Every
//! accepted connection gets its own task; all of them share one engine.
//!
//! ```ignore
//! use linekv::server::{Server, ServerConfig};
//!
//! let server = Server::bind(ServerConfig::default()).await?;
//! println!("listening on {}", server.local_addr()?);
//! server.run_until(tokio::signal::ctrl_c()).await;
//! ```

use crate::commands::CommandHandler;
use crate::connection::{handle_connection, ConnectionStats};
use crate::storage::{ExpiryConfig, ExpirySweeper, StorageEngine};
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on, `0` for an ephemeral port
    pub port: u16,
    /// Expiry sweeper tuning
    pub expiry: ExpiryConfig,
    /// Whether to run the background expiry sweeper at all
    pub sweeper_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            expiry: ExpiryConfig::default(),
            sweeper_enabled: true,
        }
    }
}

impl ServerConfig {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A bound LineKV server.
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    storage: Arc<StorageEngine>,
    stats: Arc<ConnectionStats>,
}

impl Server {
    /// Creates the storage engine and binds the listener.
    pub async fn bind(config: ServerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind_address()).await?;

        let storage = Arc::new(StorageEngine::new());
        info!(
            shards = storage.shard_count(),
            "Storage engine initialized"
        );
        info!(addr = %listener.local_addr()?, "Listening");

        Ok(Self {
            listener,
            config,
            storage,
            stats: Arc::new(ConnectionStats::new()),
        })
    }

    /// The address actually bound, useful with port `0`.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The shared storage engine.
    pub fn storage(&self) -> Arc<StorageEngine> {
        Arc::clone(&self.storage)
    }

    /// The shared connection statistics.
    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    /// Serves connections until `shutdown` completes.
    ///
    /// The sweeper, if enabled, runs for exactly as long as this call.
    /// Connection tasks already spawned are left to finish on their own.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let _sweeper = if self.config.sweeper_enabled {
            Some(ExpirySweeper::start(
                Arc::clone(&self.storage),
                self.config.expiry.clone(),
            ))
        } else {
            info!("Background expiry sweeper disabled");
            None
        };

        tokio::select! {
            _ = accept_loop(self.listener, self.storage, self.stats) => {}
            _ = shutdown => {
                info!("Shutdown signal received, stopping server...");
            }
        }
    }

    /// Serves connections forever.
    pub async fn run(self) {
        self.run_until(std::future::pending()).await
    }
}

/// Main loop that accepts incoming connections
async fn accept_loop(
    listener: TcpListener,
    storage: Arc<StorageEngine>,
    stats: Arc<ConnectionStats>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                // Create a command handler for this connection
                let handler = CommandHandler::new(Arc::clone(&storage));
                let stats = Arc::clone(&stats);

                // Spawn a task to handle this connection
                tokio::spawn(async move {
                    handle_connection(stream, addr, handler, stats).await;
                });
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}
