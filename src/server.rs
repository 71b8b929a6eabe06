//! Server builder and accept loop.
//!
//! The [`ServerBuilder`] configures the listening socket, the board size, and
//! per-peer queue depth. [`Server::run`] accepts connections forever and runs
//! each one as its own task:
//!
//! 1. Split the stream into read and write halves
//! 2. Spawn the writer task for the write half
//! 3. Register the session and send `SESSION_ESTABLISHED`
//! 4. Read and apply frames until the peer leaves
//!
//! # Example
//!
//! ```ignore
//! use shared_board::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::builder()
//!         .port(9999)
//!         .min_board_size(5, 5)
//!         .bind()
//!         .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::Instrument;

use crate::board::{Board, BoardConfig};
use crate::error::Result;
use crate::registry::Registry;
use crate::session::serve_connection;
use crate::writer::WriterConfig;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 9999;

/// Default bind address (all interfaces).
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

/// Builder for configuring and binding a server.
#[derive(Debug, Clone)]
pub struct ServerBuilder {
    bind_address: String,
    port: u16,
    board_config: BoardConfig,
    writer_config: WriterConfig,
}

impl ServerBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            board_config: BoardConfig::default(),
            writer_config: WriterConfig::default(),
        }
    }

    /// Set the address to listen on.
    ///
    /// Default: `0.0.0.0`
    pub fn bind_address(mut self, address: impl Into<String>) -> Self {
        self.bind_address = address.into();
        self
    }

    /// Set the listening port. `0` picks a free port.
    ///
    /// Default: 9999
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the board's starting size and growth floor.
    ///
    /// Default: 5×5
    pub fn min_board_size(mut self, rows: usize, cols: usize) -> Self {
        self.board_config = BoardConfig {
            min_rows: rows,
            min_cols: cols,
        };
        self
    }

    /// Set how many outbound frames may queue per peer.
    ///
    /// Default: 256
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.writer_config.channel_capacity = capacity;
        self
    }

    /// Bind the listening socket.
    ///
    /// This is the only fallible step of server startup.
    pub async fn bind(self) -> Result<Server> {
        let listener = TcpListener::bind((self.bind_address.as_str(), self.port)).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "server listening");

        Ok(Server {
            listener,
            local_addr,
            board: Arc::new(Board::new(self.board_config)),
            registry: Arc::new(Registry::new()),
            writer_config: self.writer_config,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound server.
///
/// Owns the board and the registry shared by all sessions.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    board: Arc<Board>,
    registry: Arc<Registry>,
    writer_config: WriterConfig,
}

impl Server {
    /// Create a new server builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn board(&self) -> Arc<Board> {
        self.board.clone()
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Accept connections until the task is dropped.
    ///
    /// A failed accept is logged and the loop keeps going.
    pub async fn run(self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => self.spawn_session(stream, peer),
                Err(e) => {
                    tracing::error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%peer, "failed to set TCP_NODELAY: {}", e);
        }

        let board = self.board.clone();
        let registry = self.registry.clone();
        let config = self.writer_config.clone();
        let span = tracing::info_span!("session", %peer, id = tracing::field::Empty);

        tokio::spawn(
            async move {
                tracing::info!("client connected");
                let (read_half, write_half) = stream.into_split();
                let state = serve_connection(read_half, write_half, board, registry, config).await;
                tracing::info!(%state, "client disconnected");
            }
            .instrument(span),
        );
    }
}
