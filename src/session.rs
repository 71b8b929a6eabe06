//! Per-connection session state machine.
//!
//! A session is created when a connection is accepted and lives until the
//! peer sends `DISCONNECT` or the transport ends:
//!
//! ```text
//! Establishing ──(send SESSION_ESTABLISHED)──► Active ──► Closing ──► Closed
//!                                               │  ▲
//!                                               └──┘ COMM_TEST, POST_TEXT,
//!                                                    GET_BOARD, unknown codes
//! ```
//!
//! Failures local to one session (truncated frames, unknown codes, a dead
//! socket) only ever end that session.

use std::fmt;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;

use crate::board::Board;
use crate::error::{Result, SbpError};
use crate::protocol::{read_frame, Frame, ProtocolCode, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION};
use crate::registry::{Registry, SessionId};
use crate::writer::{spawn_writer_task, WriterConfig, WriterHandle};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, `SESSION_ESTABLISHED` not yet sent.
    Establishing,
    /// Normal operation.
    Active,
    /// Deregistered, waiting for the writer to drain.
    Closing,
    /// Terminal.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Establishing => "ESTABLISHING",
            SessionState::Active => "ACTIVE",
            SessionState::Closing => "CLOSING",
            SessionState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// What the read loop should do after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

/// Server side of one connection.
pub struct Session {
    id: SessionId,
    state: SessionState,
    writer: Option<WriterHandle>,
    writer_task: Option<JoinHandle<Result<()>>>,
    board: Arc<Board>,
    registry: Arc<Registry>,
}

impl Session {
    /// Create a session with a fresh identity.
    ///
    /// The session starts in `Establishing` and is not yet registered for
    /// broadcasts; call [`Session::establish`] before handling frames.
    pub fn new(
        writer: WriterHandle,
        writer_task: Option<JoinHandle<Result<()>>>,
        board: Arc<Board>,
        registry: Arc<Registry>,
    ) -> Self {
        let id = registry.allocate_id();
        tracing::Span::current().record("id", id.as_u64());
        Self {
            id,
            state: SessionState::Establishing,
            writer: Some(writer),
            writer_task,
            board,
            registry,
        }
    }

    #[inline]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Send `SESSION_ESTABLISHED`, register for broadcasts, and move to
    /// `Active`.
    ///
    /// The ACK is queued before registration, so it is always the first
    /// frame the peer sees.
    pub async fn establish(&mut self) -> Result<()> {
        if self.state != SessionState::Establishing {
            return Err(SbpError::Protocol(format!(
                "Cannot establish session in state {}",
                self.state
            )));
        }
        let writer = self.writer.clone().ok_or(SbpError::ConnectionClosed)?;
        writer
            .send(Frame::empty(ProtocolCode::SessionEstablished))
            .await?;
        self.registry.insert(self.id, writer);
        self.state = SessionState::Active;
        tracing::debug!("session established");
        Ok(())
    }

    /// Apply one inbound frame.
    ///
    /// Errors returned here are transport failures on this session's own
    /// writer; protocol problems are answered with `ERROR` frames instead.
    pub async fn handle_frame(&mut self, frame: Frame) -> Result<Flow> {
        if self.state != SessionState::Active {
            return Err(SbpError::Protocol(format!(
                "Frame {} received in state {}",
                frame.code(),
                self.state
            )));
        }

        tracing::debug!(code = %frame.code(), len = frame.payload_len(), "frame received");
        if frame.version() != PROTOCOL_VERSION {
            tracing::debug!(version = frame.version(), "frame carries a different protocol version");
        }

        match frame.code() {
            ProtocolCode::CommTest => {
                self.reply(Frame::empty(ProtocolCode::SessionEstablished))
                    .await?;
            }
            ProtocolCode::PostText => self.post_text(frame).await?,
            ProtocolCode::GetBoard => self.send_board().await?,
            ProtocolCode::Disconnect => {
                tracing::info!("client requested disconnect");
                return Ok(Flow::Close);
            }
            code @ (ProtocolCode::SessionEstablished | ProtocolCode::Error) => {
                tracing::warn!(code = %code, "unexpected code from client");
                self.reply_error(&format!("Unexpected code {} from client", code.as_u8()))
                    .await?;
            }
            ProtocolCode::Unknown(raw) => {
                let err = SbpError::UnknownCode(raw);
                tracing::warn!("{}", err);
                self.reply_error(&err.to_string()).await?;
            }
        }

        Ok(Flow::Continue)
    }

    /// Store the text and relay it to every other session.
    async fn post_text(&mut self, frame: Frame) -> Result<()> {
        let text = match frame.payload_str() {
            Ok(text) => text.to_owned(),
            Err(e) => {
                tracing::warn!("rejecting post: {}", e);
                return self.reply_error(&e.to_string()).await;
            }
        };

        let (row, col) = self.board.post(text);
        tracing::debug!(row, col, "text posted");

        let relay = Frame::new(ProtocolCode::PostText, frame.payload_bytes())?;
        self.registry.broadcast(&relay, Some(self.id));
        Ok(())
    }

    /// Reply with the serialized board.
    async fn send_board(&mut self) -> Result<()> {
        let payload = self.board.snapshot().to_payload()?;
        if payload.len() > MAX_PAYLOAD_SIZE {
            tracing::warn!(len = payload.len(), "board snapshot does not fit one frame");
            return self
                .reply_error(&format!(
                    "Board snapshot of {} bytes exceeds maximum of {}",
                    payload.len(),
                    MAX_PAYLOAD_SIZE
                ))
                .await;
        }
        self.reply(Frame::new(ProtocolCode::GetBoard, payload.into())?)
            .await
    }

    async fn reply(&self, frame: Frame) -> Result<()> {
        match &self.writer {
            Some(writer) => writer.send(frame).await,
            None => Err(SbpError::ConnectionClosed),
        }
    }

    async fn reply_error(&self, message: &str) -> Result<()> {
        self.reply(Frame::text(ProtocolCode::Error, message)?).await
    }

    /// Read and apply frames until the peer leaves.
    ///
    /// Always ends in `Closed`, whatever the reason.
    pub async fn run<R>(mut self, mut reader: R) -> SessionState
    where
        R: AsyncRead + Unpin,
    {
        if let Err(e) = self.establish().await {
            tracing::warn!("failed to establish session: {}", e);
            self.close().await;
            return self.state;
        }

        loop {
            let frame = match read_frame(&mut reader).await {
                Ok(frame) => frame,
                Err(e) if e.is_disconnect() => {
                    tracing::info!("connection closed by peer");
                    break;
                }
                Err(e) => {
                    tracing::warn!("read error: {}", e);
                    break;
                }
            };

            match self.handle_frame(frame).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Close) => break,
                Err(e) => {
                    tracing::warn!("session error: {}", e);
                    break;
                }
            }
        }

        self.close().await;
        self.state
    }

    /// Deregister and release the connection.
    ///
    /// Safe to call more than once.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closing;
        self.registry.unregister(self.id);

        // Dropping the last handle lets the writer flush and shut the socket down
        self.writer = None;
        if let Some(task) = self.writer_task.take() {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!("writer ended with error: {}", e),
                Err(e) => tracing::warn!("writer task panicked: {}", e),
            }
        }

        self.state = SessionState::Closed;
        tracing::debug!("session closed");
    }
}

/// Run a full session over a split connection.
///
/// Spawns the writer task for `writer`, registers the session, and drives it
/// until it is closed.
pub async fn serve_connection<R, W>(
    reader: R,
    writer: W,
    board: Arc<Board>,
    registry: Arc<Registry>,
    config: WriterConfig,
) -> SessionState
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (handle, task) = spawn_writer_task(writer, config);
    let session = Session::new(handle, Some(task), board, registry);
    session.run(reader).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::BoardSnapshot;
    use crate::protocol::encode;
    use crate::writer::spawn_writer_task_default;
    use tokio::io::{duplex, split, AsyncWriteExt, DuplexStream};

    struct Harness {
        board: Arc<Board>,
        registry: Arc<Registry>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                board: Arc::new(Board::default()),
                registry: Arc::new(Registry::new()),
            }
        }

        /// A session whose outbound frames can be read from the returned stream.
        fn session(&self) -> (Session, DuplexStream) {
            let (ours, theirs) = duplex(64 * 1024);
            let (handle, task) = spawn_writer_task_default(ours);
            let session = Session::new(handle, Some(task), self.board.clone(), self.registry.clone());
            (session, theirs)
        }

        /// A plain registered peer, to observe broadcasts.
        fn peer(&self) -> (SessionId, DuplexStream) {
            let (ours, theirs) = duplex(64 * 1024);
            let (handle, _task) = spawn_writer_task_default(ours);
            (self.registry.register(handle), theirs)
        }
    }

    async fn active(h: &Harness) -> (Session, DuplexStream) {
        let (mut session, mut out) = h.session();
        session.establish().await.unwrap();
        let ack = read_frame(&mut out).await.unwrap();
        assert_eq!(ack.code(), ProtocolCode::SessionEstablished);
        (session, out)
    }

    fn raw(code: u8, payload: &[u8]) -> Frame {
        Frame::decode(&encode(1, ProtocolCode::from(code), payload).unwrap())
            .unwrap()
            .0
    }

    #[tokio::test]
    async fn test_establish_sends_ack() {
        let h = Harness::new();
        let (session, _out) = active(&h).await;
        assert_eq!(session.state(), SessionState::Active);
        assert!(h.registry.contains(session.id()));
    }

    #[tokio::test]
    async fn test_ack_precedes_racing_broadcast() {
        let h = Harness::new();
        let (mut session, mut out) = h.session();
        let early = Frame::text(ProtocolCode::PostText, "early").unwrap();

        // Another session posts while this one is still establishing
        assert_eq!(h.registry.broadcast(&early, None), 0);
        assert!(!h.registry.contains(session.id()));

        session.establish().await.unwrap();
        let late = Frame::text(ProtocolCode::PostText, "late").unwrap();
        assert_eq!(h.registry.broadcast(&late, None), 1);

        let first = read_frame(&mut out).await.unwrap();
        assert_eq!(first.code(), ProtocolCode::SessionEstablished);
        assert_eq!(read_frame(&mut out).await.unwrap().payload(), b"late");
    }

    #[tokio::test]
    async fn test_comm_test_answered() {
        let h = Harness::new();
        let (mut session, mut out) = active(&h).await;

        let flow = session
            .handle_frame(Frame::empty(ProtocolCode::CommTest))
            .await
            .unwrap();
        assert_eq!(flow, Flow::Continue);

        let reply = read_frame(&mut out).await.unwrap();
        assert_eq!(reply.code(), ProtocolCode::SessionEstablished);
        assert_eq!(reply.payload_len(), 0);
    }

    #[tokio::test]
    async fn test_post_text_stores_and_relays() {
        let h = Harness::new();
        let (mut session, mut out) = active(&h).await;
        let (_peer_id, mut peer) = h.peer();

        session
            .handle_frame(Frame::text(ProtocolCode::PostText, "hello").unwrap())
            .await
            .unwrap();

        let relayed = read_frame(&mut peer).await.unwrap();
        assert_eq!(relayed.code(), ProtocolCode::PostText);
        assert_eq!(relayed.payload(), b"hello");
        assert!(h.board.snapshot().contains("hello"));

        // The poster gets no echo: its next frame is the COMM_TEST reply
        session
            .handle_frame(Frame::empty(ProtocolCode::CommTest))
            .await
            .unwrap();
        assert_eq!(
            read_frame(&mut out).await.unwrap().code(),
            ProtocolCode::SessionEstablished
        );
    }

    #[tokio::test]
    async fn test_empty_post_is_stored() {
        let h = Harness::new();
        let (mut session, _out) = active(&h).await;

        session
            .handle_frame(Frame::empty(ProtocolCode::PostText))
            .await
            .unwrap();
        assert_eq!(h.board.occupied(), 1);
    }

    #[tokio::test]
    async fn test_invalid_utf8_post_rejected() {
        let h = Harness::new();
        let (mut session, mut out) = active(&h).await;

        session
            .handle_frame(raw(5, &[0xff, 0xfe, 0xfd]))
            .await
            .unwrap();

        assert_eq!(read_frame(&mut out).await.unwrap().code(), ProtocolCode::Error);
        assert_eq!(h.board.occupied(), 0);
    }

    #[tokio::test]
    async fn test_get_board_reply() {
        let h = Harness::new();
        h.board.post("hello");
        let (mut session, mut out) = active(&h).await;

        session
            .handle_frame(Frame::empty(ProtocolCode::GetBoard))
            .await
            .unwrap();

        let reply = read_frame(&mut out).await.unwrap();
        assert_eq!(reply.code(), ProtocolCode::GetBoard);
        let snapshot = BoardSnapshot::from_payload(reply.payload()).unwrap();
        assert_eq!(snapshot.get(0, 0), Some("hello"));
        assert_eq!(snapshot.get(4, 4), Some(""));
    }

    #[tokio::test]
    async fn test_unknown_code_keeps_session_active() {
        let h = Harness::new();
        let (mut session, mut out) = active(&h).await;

        let flow = session.handle_frame(raw(99, b"")).await.unwrap();
        assert_eq!(flow, Flow::Continue);
        assert_eq!(session.state(), SessionState::Active);

        let reply = read_frame(&mut out).await.unwrap();
        assert_eq!(reply.code(), ProtocolCode::Error);
        assert!(reply.payload_str().unwrap().contains("99"));
    }

    #[tokio::test]
    async fn test_server_only_code_rejected() {
        let h = Harness::new();
        let (mut session, mut out) = active(&h).await;

        session.handle_frame(raw(3, b"oops")).await.unwrap();

        let reply = read_frame(&mut out).await.unwrap();
        assert_eq!(reply.code(), ProtocolCode::Error);
        assert_eq!(session.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn test_disconnect_closes_and_unregisters() {
        let h = Harness::new();
        let (mut session, mut out) = active(&h).await;
        let id = session.id();

        let flow = session
            .handle_frame(Frame::empty(ProtocolCode::Disconnect))
            .await
            .unwrap();
        assert_eq!(flow, Flow::Close);

        session.close().await;
        assert_eq!(session.state(), SessionState::Closed);
        assert!(!h.registry.contains(id));

        // Writer shut the stream down
        assert!(read_frame(&mut out).await.unwrap_err().is_disconnect());

        // Closing twice is harmless
        session.close().await;
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_frames_rejected_before_establish() {
        let h = Harness::new();
        let (mut session, _out) = h.session();
        assert_eq!(session.state(), SessionState::Establishing);
        assert!(session
            .handle_frame(Frame::empty(ProtocolCode::CommTest))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_run_until_eof() {
        let h = Harness::new();
        let (client, server) = duplex(64 * 1024);
        let (server_read, server_write) = split(server);
        let (mut client_read, mut client_write) = split(client);

        let task = tokio::spawn(serve_connection(
            server_read,
            server_write,
            h.board.clone(),
            h.registry.clone(),
            WriterConfig::default(),
        ));

        let ack = read_frame(&mut client_read).await.unwrap();
        assert_eq!(ack.code(), ProtocolCode::SessionEstablished);
        assert_eq!(h.registry.len(), 1);

        client_write
            .write_all(&encode(1, ProtocolCode::PostText, b"bye soon").unwrap())
            .await
            .unwrap();
        // Truncated frame: header promises 10 bytes, then EOF
        client_write.write_all(&[1, 5, 0, 10, b'x']).await.unwrap();
        client_write.shutdown().await.unwrap();

        assert_eq!(task.await.unwrap(), SessionState::Closed);
        assert!(h.registry.is_empty());
        assert!(h.board.snapshot().contains("bye soon"));
        assert_eq!(h.board.occupied(), 1);
    }
}
