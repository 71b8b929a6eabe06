//! Error types for shared-board.

use thiserror::Error;

/// Main error type for all shared-board operations.
#[derive(Debug, Error)]
pub enum SbpError {
    /// I/O error during socket operations (accept, connect, read, write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (board snapshots).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload does not fit the 16-bit length field.
    #[error("Payload of {len} bytes exceeds maximum of 65535")]
    PayloadTooLarge { len: usize },

    /// Stream closed before a full frame was read.
    #[error("Truncated frame: expected {expected} bytes, received {received}")]
    TruncatedFrame { expected: usize, received: usize },

    /// Frame code outside the protocol enumeration.
    #[error("Unknown protocol code: {0}")]
    UnknownCode(u8),

    /// Protocol error (unexpected code, invalid text, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A peer's outbound queue is full; it is not reading fast enough.
    #[error("Outbound queue is full")]
    QueueFull,

    /// Connection closed; the outbound writer is gone.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Client tried to use the session before `SESSION_ESTABLISHED` arrived.
    #[error("Session not established")]
    SessionNotEstablished,
}

impl SbpError {
    /// Whether this error just means the peer went away.
    ///
    /// Truncation, EOF-like I/O errors and a closed writer all end a session
    /// the same way a `DISCONNECT` would.
    pub fn is_disconnect(&self) -> bool {
        match self {
            SbpError::TruncatedFrame { .. } | SbpError::ConnectionClosed => true,
            SbpError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

/// Result type alias using SbpError.
pub type Result<T> = std::result::Result<T, SbpError>;
