//! # shared-board
//!
//! TCP shared board speaking the SBP framed protocol.
//!
//! Clients connect, post short texts, and every other connected client gets
//! each text relayed as it arrives. The server also keeps the texts in a
//! growable grid that any client can fetch.
//!
//! ## Architecture
//!
//! - **Protocol**: 4-byte header (version, code, big-endian length) + payload
//! - **Session**: one task per connection, driving its lifecycle
//! - **Board** and **Registry**: shared state, each behind its own lock
//! - **Writer**: one task per connection owning the socket's write half
//!
//! ## Example
//!
//! ```ignore
//! use shared_board::{Client, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::builder().port(0).bind().await?;
//!     let port = server.local_addr().port();
//!     tokio::spawn(server.run());
//!
//!     let client = Client::connect("127.0.0.1", port).await?;
//!     client.wait_established().await?;
//!     client.post_text("(ana) hello").await?;
//!     Ok(())
//! }
//! ```

pub mod board;
pub mod client;
pub mod console;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod writer;

pub use board::{Board, BoardConfig, BoardSnapshot};
pub use client::{Client, ClientState};
pub use error::{Result, SbpError};
pub use protocol::{Frame, ProtocolCode};
pub use registry::{Registry, SessionId};
pub use server::{Server, ServerBuilder};
pub use session::{Session, SessionState};
