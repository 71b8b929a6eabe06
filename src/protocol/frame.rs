//! Frame struct with typed accessors.
//!
//! Represents a complete protocol frame with header and payload.
//! Uses `bytes::Bytes` so a broadcast payload is shared, not copied,
//! across every peer it is sent to.
//!
//! # Example
//!
//! ```
//! use shared_board::protocol::{Frame, ProtocolCode};
//!
//! let frame = Frame::text(ProtocolCode::PostText, "hello").unwrap();
//! assert_eq!(frame.code(), ProtocolCode::PostText);
//! assert_eq!(frame.payload(), b"hello");
//! assert_eq!(frame.encode().len(), 4 + 5);
//! ```

use bytes::Bytes;

use super::wire_format::{Header, ProtocolCode, HEADER_SIZE, PROTOCOL_VERSION};
use crate::error::{Result, SbpError};

/// A complete protocol frame.
///
/// The payload length always equals `header.payload_length`; the
/// constructors enforce it and there are no mutators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    header: Header,
    payload: Bytes,
}

impl Frame {
    /// Create a frame with an explicit version.
    ///
    /// Fails with `PayloadTooLarge` if the payload exceeds 65535 bytes.
    pub fn with_version(version: u8, code: ProtocolCode, payload: Bytes) -> Result<Self> {
        let header = Header::for_payload(version, code, &payload)?;
        Ok(Self { header, payload })
    }

    /// Create a frame stamped with the current protocol version.
    pub fn new(code: ProtocolCode, payload: Bytes) -> Result<Self> {
        Self::with_version(PROTOCOL_VERSION, code, payload)
    }

    /// Create a frame with empty payload.
    pub fn empty(code: ProtocolCode) -> Self {
        Self {
            header: Header::new(PROTOCOL_VERSION, code, 0),
            payload: Bytes::new(),
        }
    }

    /// Create a frame carrying UTF-8 text.
    pub fn text(code: ProtocolCode, text: &str) -> Result<Self> {
        Self::new(code, Bytes::copy_from_slice(text.as_bytes()))
    }

    /// Reassemble a frame from a decoded header and its payload.
    pub(crate) fn from_parts(header: Header, payload: Bytes) -> Result<Self> {
        if payload.len() != header.payload_len() {
            return Err(SbpError::Protocol(format!(
                "Payload is {} bytes, header declares {}",
                payload.len(),
                header.payload_length
            )));
        }
        Ok(Self { header, payload })
    }

    /// Decode one frame from the front of a byte slice.
    ///
    /// Returns the frame and the number of bytes consumed. Bytes after the
    /// frame are left untouched.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let header = Header::decode(buf).ok_or(SbpError::TruncatedFrame {
            expected: HEADER_SIZE,
            received: buf.len(),
        })?;

        let total = HEADER_SIZE + header.payload_len();
        if buf.len() < total {
            return Err(SbpError::TruncatedFrame {
                expected: total,
                received: buf.len(),
            });
        }

        let payload = Bytes::copy_from_slice(&buf[HEADER_SIZE..total]);
        Ok((Self { header, payload }, total))
    }

    /// Encode header and payload into one contiguous buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Get the decoded header.
    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Get the protocol version.
    #[inline]
    pub fn version(&self) -> u8 {
        self.header.version
    }

    /// Get the frame code.
    #[inline]
    pub fn code(&self) -> ProtocolCode {
        self.header.code
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get a clone of the payload as Bytes (cheap, zero-copy).
    #[inline]
    pub fn payload_bytes(&self) -> Bytes {
        self.payload.clone()
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Interpret the payload as UTF-8 text.
    pub fn payload_str(&self) -> Result<&str> {
        std::str::from_utf8(&self.payload).map_err(|e| {
            SbpError::Protocol(format!("{} payload is not valid UTF-8: {}", self.code(), e))
        })
    }

    /// Lossy text view of the payload, for display.
    pub fn payload_text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Encode a `(version, code, payload)` triple into wire bytes.
///
/// Produces exactly `4 + payload.len()` bytes, or fails with
/// `PayloadTooLarge` before anything is built.
pub fn encode(version: u8, code: ProtocolCode, payload: &[u8]) -> Result<Vec<u8>> {
    let header = Header::for_payload(version, code, payload)?;
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MAX_PAYLOAD_SIZE;

    #[test]
    fn test_encode_layout() {
        let bytes = encode(1, ProtocolCode::PostText, b"hello").unwrap();
        assert_eq!(bytes, vec![1, 5, 0, 5, b'h', b'e', b'l', b'l', b'o']);
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let cases: [(u8, ProtocolCode, &[u8]); 4] = [
            (1, ProtocolCode::CommTest, b""),
            (1, ProtocolCode::PostText, "olá mundo".as_bytes()),
            (7, ProtocolCode::Unknown(99), b"\x00\xff\x10"),
            (0, ProtocolCode::GetBoard, br#"[["a",""]]"#),
        ];

        for (version, code, payload) in cases {
            let bytes = encode(version, code, payload).unwrap();
            let (frame, consumed) = Frame::decode(&bytes).unwrap();
            assert_eq!(consumed, bytes.len());
            assert_eq!(frame.version(), version);
            assert_eq!(frame.code(), code);
            assert_eq!(frame.payload(), payload);
        }
    }

    #[test]
    fn test_max_payload_boundary() {
        let max = vec![b'x'; MAX_PAYLOAD_SIZE];
        let bytes = encode(1, ProtocolCode::PostText, &max).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + MAX_PAYLOAD_SIZE);
        assert_eq!(&bytes[2..4], &[0xFF, 0xFF]);

        let (frame, _) = Frame::decode(&bytes).unwrap();
        assert_eq!(frame.payload_len(), MAX_PAYLOAD_SIZE);

        let too_big = vec![b'x'; MAX_PAYLOAD_SIZE + 1];
        assert!(matches!(
            encode(1, ProtocolCode::PostText, &too_big),
            Err(SbpError::PayloadTooLarge { len: 65536 })
        ));
        assert!(Frame::new(ProtocolCode::PostText, Bytes::from(too_big)).is_err());
    }

    #[test]
    fn test_decode_leaves_trailing_bytes() {
        let mut bytes = encode(1, ProtocolCode::PostText, b"one").unwrap();
        bytes.extend(encode(1, ProtocolCode::PostText, b"two").unwrap());

        let (first, consumed) = Frame::decode(&bytes).unwrap();
        assert_eq!(first.payload(), b"one");

        let (second, _) = Frame::decode(&bytes[consumed..]).unwrap();
        assert_eq!(second.payload(), b"two");
    }

    #[test]
    fn test_decode_truncated() {
        let bytes = encode(1, ProtocolCode::PostText, b"hello").unwrap();

        assert!(matches!(
            Frame::decode(&bytes[..2]),
            Err(SbpError::TruncatedFrame {
                expected: 4,
                received: 2
            })
        ));
        assert!(matches!(
            Frame::decode(&bytes[..6]),
            Err(SbpError::TruncatedFrame {
                expected: 9,
                received: 6
            })
        ));
    }

    #[test]
    fn test_frame_empty_payload() {
        let frame = Frame::empty(ProtocolCode::SessionEstablished);
        assert_eq!(frame.version(), PROTOCOL_VERSION);
        assert_eq!(frame.payload_len(), 0);
        assert_eq!(frame.encode(), vec![1, 2, 0, 0]);
    }

    #[test]
    fn test_from_parts_rejects_length_mismatch() {
        let header = Header::new(1, ProtocolCode::PostText, 10);
        assert!(Frame::from_parts(header, Bytes::from_static(b"short")).is_err());
    }

    #[test]
    fn test_payload_str() {
        let frame = Frame::text(ProtocolCode::Error, "boom").unwrap();
        assert_eq!(frame.payload_str().unwrap(), "boom");

        let bad = Frame::new(ProtocolCode::PostText, Bytes::from_static(&[0xff, 0xfe])).unwrap();
        assert!(bad.payload_str().is_err());
        assert_eq!(bad.payload_text_lossy(), "\u{fffd}\u{fffd}");
    }

    #[test]
    fn test_payload_bytes_zero_copy() {
        let original = Bytes::from_static(b"shared");
        let frame = Frame::new(ProtocolCode::PostText, original.clone()).unwrap();
        assert_eq!(frame.payload_bytes().as_ptr(), original.as_ptr());
    }
}
