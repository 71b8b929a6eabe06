//! Wire format encoding and decoding.
//!
//! Implements the 4-byte SBP header:
//! ```text
//! ┌─────────┬───────┬──────────────────┐
//! │ Version │ Code  │ Length           │
//! │ 1 byte  │ 1 byte│ 2 bytes uint16 BE│
//! └─────────┴───────┴──────────────────┘
//! ```
//!
//! The length is always Big Endian: byte 2 holds the high 8 bits,
//! byte 3 the low 8 bits.

use std::fmt;

use crate::error::{Result, SbpError};

/// Header size in bytes (fixed, exactly 4).
pub const HEADER_SIZE: usize = 4;

/// Maximum payload size (limited by the 16-bit length field).
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Protocol version stamped on every outgoing frame.
pub const PROTOCOL_VERSION: u8 = 1;

/// Frame purpose, carried in header byte 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolCode {
    /// Liveness probe; answered with `SessionEstablished`.
    CommTest,
    /// Ends the session.
    Disconnect,
    /// ACK: the session is usable.
    SessionEstablished,
    /// Error description (UTF-8 payload).
    Error,
    /// Text posted to the board and relayed to peers.
    PostText,
    /// Board snapshot request (empty) or response (serialized grid).
    GetBoard,
    /// Any byte outside the enumeration.
    Unknown(u8),
}

impl ProtocolCode {
    /// Raw byte value on the wire.
    #[inline]
    pub fn as_u8(self) -> u8 {
        match self {
            ProtocolCode::CommTest => 0,
            ProtocolCode::Disconnect => 1,
            ProtocolCode::SessionEstablished => 2,
            ProtocolCode::Error => 3,
            ProtocolCode::PostText => 5,
            ProtocolCode::GetBoard => 6,
            ProtocolCode::Unknown(raw) => raw,
        }
    }
}

impl From<u8> for ProtocolCode {
    fn from(raw: u8) -> Self {
        match raw {
            0 => ProtocolCode::CommTest,
            1 => ProtocolCode::Disconnect,
            2 => ProtocolCode::SessionEstablished,
            3 => ProtocolCode::Error,
            5 => ProtocolCode::PostText,
            6 => ProtocolCode::GetBoard,
            other => ProtocolCode::Unknown(other),
        }
    }
}

impl From<ProtocolCode> for u8 {
    fn from(code: ProtocolCode) -> Self {
        code.as_u8()
    }
}

impl fmt::Display for ProtocolCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolCode::CommTest => f.write_str("COMM_TEST"),
            ProtocolCode::Disconnect => f.write_str("DISCONNECT"),
            ProtocolCode::SessionEstablished => f.write_str("SESSION_ESTABLISHED"),
            ProtocolCode::Error => f.write_str("ERROR"),
            ProtocolCode::PostText => f.write_str("POST_TEXT"),
            ProtocolCode::GetBoard => f.write_str("GET_BOARD"),
            ProtocolCode::Unknown(raw) => write!(f, "UNKNOWN({})", raw),
        }
    }
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Protocol version byte.
    pub version: u8,
    /// Frame code.
    pub code: ProtocolCode,
    /// Payload length in bytes.
    pub payload_length: u16,
}

impl Header {
    /// Create a new header.
    pub fn new(version: u8, code: ProtocolCode, payload_length: u16) -> Self {
        Self {
            version,
            code,
            payload_length,
        }
    }

    /// Create a header for a payload, checking the 16-bit bound.
    pub fn for_payload(version: u8, code: ProtocolCode, payload: &[u8]) -> Result<Self> {
        let len = checked_length(payload.len())?;
        Ok(Self::new(version, code, len))
    }

    /// Encode header to bytes (Big Endian length).
    ///
    /// # Example
    ///
    /// ```
    /// use shared_board::protocol::{Header, ProtocolCode};
    ///
    /// let header = Header::new(1, ProtocolCode::PostText, 0x0102);
    /// assert_eq!(header.encode(), [1, 5, 0x01, 0x02]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let len = self.payload_length.to_be_bytes();
        [self.version, self.code.as_u8(), len[0], len[1]]
    }

    /// Decode header from bytes.
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            version: buf[0],
            code: ProtocolCode::from(buf[1]),
            payload_length: u16::from_be_bytes([buf[2], buf[3]]),
        })
    }

    /// Payload length as `usize`.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload_length as usize
    }
}

/// Check that a payload length fits the 16-bit field.
#[inline]
pub fn checked_length(len: usize) -> Result<u16> {
    u16::try_from(len).map_err(|_| SbpError::PayloadTooLarge { len })
}
