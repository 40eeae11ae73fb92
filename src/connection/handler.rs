//! Connection Handler Module
//!
//! This module handles individual client connections to LineKV.
//! Each client gets its own handler task that runs in a loop,
//! reading request lines and sending responses.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Read bytes from socket  │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Split off a line, parse │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Execute command         │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Send response           │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. Client disconnects / I/O error
//!        │
//!        ▼
//! 5. Handler task ends
//! ```
//!
//! A bad request never gets this far: it is answered with an `ERR` line and
//! the loop carries on. Only the transport ends a session.
//!
//! ## Buffer Management
//!
//! Incoming data accumulates in a BytesMut buffer. TCP is a stream protocol,
//! so one read may hold half a line or several lines at once. Every complete
//! line in the buffer is answered, in order, before the next read.

use crate::commands::CommandHandler;
use crate::protocol::{Command, LineReader, Response};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, trace, warn};

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total requests processed, including rejected ones
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Handles a single client connection.
///
/// This struct manages the read buffer, line framing, and response sending
/// for one connected client. It works over any bidirectional byte stream, a
/// `TcpStream` in the server.
pub struct ConnectionHandler<S> {
    /// The stream for this connection
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// Request line framing
    lines: LineReader,

    /// The command handler (shared across connections)
    command_handler: CommandHandler,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The stream for this connection
    /// * `addr` - The client's socket address
    /// * `command_handler` - The command handler for executing commands
    /// * `stats` - Shared connection statistics
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            lines: LineReader::new(),
            command_handler,
            stats,
        }
    }

    /// Replaces the line framing, e.g. to use a different length limit.
    pub fn with_line_reader(mut self, lines: LineReader) -> Self {
        self.lines = lines;
        self
    }

    /// Runs the main connection loop.
    ///
    /// This method reads requests from the client, executes them,
    /// and sends back responses until the client disconnects or an I/O
    /// error occurs.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(ConnectionError::ClientDisconnected) => {
                debug!(client = %self.addr, "Client disconnected")
            }
            Err(e) if e.is_reset() => {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        self.stats.connection_closed();
        result
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            let mut pending_flush = false;

            // Answer every complete line already buffered
            while let Some(response) = self.next_response() {
                self.send_response(&response).await?;
                pending_flush = true;
            }

            if pending_flush {
                self.stream.flush().await?;
            }

            // Need more data - read from the socket
            self.read_more_data().await?;
        }
    }

    /// Takes the next request line from the buffer and executes it.
    ///
    /// Returns `None` when no complete line is buffered.
    fn next_response(&mut self) -> Option<Response> {
        let parsed = match self.lines.next_line(&mut self.buffer) {
            Ok(Some(line)) => {
                trace!(
                    client = %self.addr,
                    remaining = self.buffer.len(),
                    "Parsed line"
                );
                Command::parse(&line)
            }
            Ok(None) => {
                trace!(
                    client = %self.addr,
                    buffered = self.buffer.len(),
                    "Incomplete line, need more data"
                );
                return None;
            }
            Err(e) => {
                debug!(client = %self.addr, error = %e, "Unreadable line");
                Err(e)
            }
        };

        self.stats.command_processed();
        Some(self.command_handler.execute_parsed(parsed))
    }

    /// Reads more data from the socket into the buffer.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        // Ensure we have some capacity
        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            // Connection closed by client
            if self.buffer.is_empty() && !self.lines.is_discarding() {
                return Err(ConnectionError::ClientDisconnected);
            } else {
                // Unterminated line in buffer
                return Err(ConnectionError::UnexpectedEof);
            }
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(())
    }

    /// Writes a response into the outgoing buffer.
    async fn send_response(&mut self, response: &Response) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.stream.write_all(&bytes).await?;
        self.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            bytes = bytes.len(),
            "Sent response"
        );
        Ok(())
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Stream ended in the middle of a line
    #[error("Unexpected end of stream")]
    UnexpectedEof,
}

impl ConnectionError {
    /// Returns true if the peer reset or abandoned the socket.
    pub fn is_reset(&self) -> bool {
        matches!(
            self,
            ConnectionError::Io(e) if matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::BrokenPipe
            )
        )
    }
}

/// Handles a client connection.
///
/// This is a convenience function that creates a ConnectionHandler
/// and runs it to completion.
///
/// # Arguments
///
/// * `stream` - The stream for this connection
/// * `addr` - The client's socket address
/// * `command_handler` - The command handler for executing commands
/// * `stats` - Shared connection statistics
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, addr, command_handler, stats);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ref e if e.is_reset() => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageEngine;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_test::io::Builder;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    fn mock_handler<S>(stream: S) -> (ConnectionHandler<S>, Arc<StorageEngine>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let storage = Arc::new(StorageEngine::new());
        let handler = CommandHandler::new(Arc::clone(&storage));
        let stats = Arc::new(ConnectionStats::new());
        (
            ConnectionHandler::new(stream, test_addr(), handler, stats),
            storage,
        )
    }

    async fn create_test_server() -> (SocketAddr, Arc<StorageEngine>, Arc<ConnectionStats>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let storage = Arc::new(StorageEngine::new());
        let stats = Arc::new(ConnectionStats::new());

        let storage_clone = Arc::clone(&storage);
        let stats_clone = Arc::clone(&stats);

        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                let handler = CommandHandler::new(Arc::clone(&storage_clone));
                let stats = Arc::clone(&stats_clone);
                tokio::spawn(handle_connection(stream, client_addr, handler, stats));
            }
        });

        (addr, storage, stats)
    }

    /// Reads until `expected` bytes arrived or the server goes quiet.
    async fn read_response(client: &mut TcpStream, expected: usize) -> String {
        let mut buf = vec![0u8; 4096];
        let mut total = 0;

        while total < expected {
            match tokio::time::timeout(
                tokio::time::Duration::from_millis(500),
                client.read(&mut buf[total..]),
            )
            .await
            {
                Ok(Ok(n)) if n > 0 => total += n,
                _ => break,
            }
        }

        String::from_utf8_lossy(&buf[..total]).into_owned()
    }

    #[tokio::test]
    async fn test_mock_ping_pong() {
        let stream = Builder::new().read(b"PING\n").write(b"PONG\n").build();
        let (handler, _) = mock_handler(stream);

        let result = handler.run().await;
        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
    }

    #[tokio::test]
    async fn test_mock_crlf_and_case() {
        let stream = Builder::new()
            .read(b"set name Ariz\r\n")
            .write(b"OK\n")
            .read(b"get name\r\n")
            .write(b"Ariz\n")
            .build();
        let (handler, storage) = mock_handler(stream);

        let _ = handler.run().await;
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_mock_pipelined_in_order() {
        let stream = Builder::new()
            .read(b"SET k1 v1\nSET k2 v2\nGET k1\nDEL k1\nGET k1\nGET k2\n")
            .write(b"OK\nOK\nv1\n1\n(nil)\nv2\n")
            .build();
        let (handler, _) = mock_handler(stream);

        let _ = handler.run().await;
    }

    #[tokio::test]
    async fn test_mock_line_split_across_reads() {
        let stream = Builder::new()
            .read(b"SET greeting hel")
            .read(b"lo\nGET gree")
            .write(b"OK\n")
            .read(b"ting\n")
            .write(b"hello\n")
            .build();
        let (handler, _) = mock_handler(stream);

        let _ = handler.run().await;
    }

    #[tokio::test]
    async fn test_mock_errors_keep_connection_open() {
        let stream = Builder::new()
            .read(b"BOGUS\n")
            .write(b"ERR unknown command\n")
            .read(b"GET\n")
            .write(b"ERR wrong number of arguments for 'get' command\n")
            .read(b"\n")
            .write(b"ERR empty command\n")
            .read(b"SET k v EX 0\n")
            .write(b"ERR invalid expire time in 'set' command\n")
            .read(b"PING\n")
            .write(b"PONG\n")
            .build();
        let (handler, _) = mock_handler(stream);

        let result = handler.run().await;
        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
    }

    #[tokio::test]
    async fn test_mock_invalid_utf8() {
        let stream = Builder::new()
            .read(b"GET \xff\xfe\n")
            .write(b"ERR invalid UTF-8 in request\n")
            .read(b"PING\n")
            .write(b"PONG\n")
            .build();
        let (handler, _) = mock_handler(stream);

        let _ = handler.run().await;
    }

    #[tokio::test]
    async fn test_mock_line_too_long() {
        let mut long_line = b"SET big ".to_vec();
        long_line.extend(std::iter::repeat(b'a').take(100));
        long_line.extend_from_slice(b"\nPING\n");

        let stream = Builder::new()
            .read(&long_line)
            .write(b"ERR line too long (max 32 bytes)\nPONG\n")
            .build();
        let (handler, storage) = mock_handler(stream);
        let handler = handler.with_line_reader(LineReader::with_max_line(32));

        let _ = handler.run().await;
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_mock_empty_keys_writes_nothing() {
        let stream = Builder::new()
            .read(b"KEYS nothing*\nPING\n")
            .write(b"PONG\n")
            .build();
        let (handler, _) = mock_handler(stream);

        let _ = handler.run().await;
    }

    #[tokio::test]
    async fn test_mock_partial_line_at_eof() {
        let stream = Builder::new().read(b"PING\nGET ha").write(b"PONG\n").build();
        let (handler, _) = mock_handler(stream);

        let result = handler.run().await;
        assert!(matches!(result, Err(ConnectionError::UnexpectedEof)));
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"PING\n").await.unwrap();

        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).await.unwrap();

        assert_eq!(&buf[..n], b"PONG\n");
    }

    #[tokio::test]
    async fn test_set_get() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"SET name Ariz\n").await.unwrap();
        assert_eq!(read_response(&mut client, 3).await, "OK\n");

        client.write_all(b"GET name\n").await.unwrap();
        assert_eq!(read_response(&mut client, 5).await, "Ariz\n");
    }

    #[tokio::test]
    async fn test_multiple_commands() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();

        // Several requests in one write
        client
            .write_all(b"SET k1 v1\nSET k2 v2\nGET k1\nGET k2\n")
            .await
            .unwrap();

        let expected = "OK\nOK\nv1\nv2\n";
        let response = read_response(&mut client, expected.len()).await;
        assert_eq!(response, expected);
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let (addr, _, stats) = create_test_server().await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);

        let mut client = TcpStream::connect(addr).await.unwrap();

        // Give the server time to accept the connection
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);

        // Send a command
        client.write_all(b"PING\n").await.unwrap();
        let mut buf = [0u8; 64];
        let _ = client.read(&mut buf).await.unwrap();

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert!(stats.commands_processed.load(Ordering::Relaxed) >= 1);
        assert!(stats.bytes_read.load(Ordering::Relaxed) > 0);
        assert!(stats.bytes_written.load(Ordering::Relaxed) > 0);

        // Close connection
        drop(client);

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }
}
