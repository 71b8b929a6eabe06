//! Client side of a board connection.
//!
//! [`Client::connect`] opens the TCP connection and starts two tasks: the
//! writer task that owns the write half, and a reader task that decodes
//! inbound frames and hands them out through [`Client::next_frame`]. The
//! reader also tracks the session lifecycle:
//!
//! ```text
//! Connecting ──(SESSION_ESTABLISHED)──► Ready ──(DISCONNECT / EOF)──► Closed
//! ```
//!
//! # Example
//!
//! ```ignore
//! use shared_board::client::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::connect("127.0.0.1", 9999).await?;
//!     client.comm_test().await?;
//!     client.wait_established().await?;
//!
//!     client.post_text("(ana) hello").await?;
//!     client.get_board().await?;
//!
//!     while let Some(frame) = client.next_frame().await {
//!         println!("{:?}", frame);
//!     }
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::net::SocketAddr;

use bytes::Bytes;
use tokio::io::AsyncRead;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::{Result, SbpError};
use crate::protocol::{read_frame, Frame, ProtocolCode};
use crate::writer::{spawn_writer_task, WriterConfig, WriterHandle, DEFAULT_CHANNEL_CAPACITY};

/// Lifecycle of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Connected, waiting for `SESSION_ESTABLISHED`.
    Connecting,
    /// Session established, posts allowed.
    Ready,
    /// Server said goodbye or the stream ended.
    Closed,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClientState::Connecting => "CONNECTING",
            ClientState::Ready => "READY",
            ClientState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// A connected client.
pub struct Client {
    writer: WriterHandle,
    writer_task: JoinHandle<Result<()>>,
    inbound: mpsc::Receiver<Frame>,
    state: watch::Receiver<ClientState>,
    local_addr: SocketAddr,
}

impl Client {
    /// Connect to a server.
    ///
    /// Nothing is sent yet; call [`Client::comm_test`] to open the session.
    pub async fn connect(address: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((address, port)).await?;
        stream.set_nodelay(true)?;
        let local_addr = stream.local_addr()?;
        tracing::debug!(%local_addr, address, port, "connected");

        let (read_half, write_half) = stream.into_split();
        let (writer, writer_task) = spawn_writer_task(write_half, WriterConfig::default());

        let (frame_tx, inbound) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
        let (state_tx, state) = watch::channel(ClientState::Connecting);
        tokio::spawn(read_loop(read_half, frame_tx, state_tx));

        Ok(Self {
            writer,
            writer_task,
            inbound,
            state,
            local_addr,
        })
    }

    /// Local address of the connection.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        *self.state.borrow()
    }

    /// Send one frame.
    ///
    /// Fails with `PayloadTooLarge` before anything is written if the
    /// payload exceeds 65535 bytes.
    pub async fn send(&self, code: ProtocolCode, payload: impl Into<Bytes>) -> Result<()> {
        let frame = Frame::new(code, payload.into())?;
        self.writer.send(frame).await
    }

    /// Ask the server to confirm the session.
    pub async fn comm_test(&self) -> Result<()> {
        self.send(ProtocolCode::CommTest, Bytes::new()).await
    }

    /// Post text to the board.
    ///
    /// Only allowed once the session is established.
    pub async fn post_text(&self, text: &str) -> Result<()> {
        match self.state() {
            ClientState::Ready => {}
            ClientState::Connecting => return Err(SbpError::SessionNotEstablished),
            ClientState::Closed => return Err(SbpError::ConnectionClosed),
        }
        self.writer.send(Frame::text(ProtocolCode::PostText, text)?).await
    }

    /// Request the board snapshot. The reply arrives as a `GET_BOARD` frame.
    pub async fn get_board(&self) -> Result<()> {
        self.send(ProtocolCode::GetBoard, Bytes::new()).await
    }

    /// Wait until the server confirms the session.
    ///
    /// Fails with `ConnectionClosed` if the connection ends first.
    pub async fn wait_established(&self) -> Result<()> {
        let mut state = self.state.clone();
        let reached = state
            .wait_for(|s| *s != ClientState::Connecting)
            .await
            .map(|s| *s)
            .unwrap_or(ClientState::Closed);

        match reached {
            ClientState::Ready => Ok(()),
            _ => Err(SbpError::ConnectionClosed),
        }
    }

    /// Next inbound frame, or `None` once the connection has ended.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        self.inbound.recv().await
    }

    /// Send `DISCONNECT` and close the write side.
    ///
    /// Waits for queued frames to be flushed.
    pub async fn disconnect(self) -> Result<()> {
        let Client {
            writer,
            writer_task,
            ..
        } = self;

        let sent = writer.send(Frame::empty(ProtocolCode::Disconnect)).await;
        drop(writer);

        match writer_task.await {
            Ok(result) => result?,
            Err(e) => tracing::warn!("writer task panicked: {}", e),
        }
        sent
    }
}

/// Decode frames until the stream ends, updating the lifecycle state.
async fn read_loop<R>(
    mut reader: R,
    frames: mpsc::Sender<Frame>,
    state: watch::Sender<ClientState>,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(frame) => frame,
            Err(e) if e.is_disconnect() => {
                tracing::debug!("server closed the connection");
                break;
            }
            Err(e) => {
                tracing::warn!("read error: {}", e);
                break;
            }
        };

        let code = frame.code();
        tracing::debug!(code = %code, len = frame.payload_len(), "frame received");

        if code == ProtocolCode::SessionEstablished {
            state.send_if_modified(|s| {
                let changed = *s == ClientState::Connecting;
                if changed {
                    *s = ClientState::Ready;
                }
                changed
            });
        }

        // A dropped receiver only means nobody is listening
        let _ = frames.send(frame).await;

        if code == ProtocolCode::Disconnect {
            break;
        }
    }

    state.send_replace(ClientState::Closed);
}
