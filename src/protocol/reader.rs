//! Blocking-style frame decoding from an async byte stream.
//!
//! [`read_frame`] reads exactly one header and then exactly the declared
//! payload, so the stream is left positioned at the start of the next frame.
//! Partial reads are accumulated until the frame is complete:
//! - Header phase: need 4 bytes
//! - Payload phase: header parsed, need N more bytes
//!
//! # Example
//!
//! ```ignore
//! use shared_board::protocol::read_frame;
//!
//! let (mut read_half, _write_half) = stream.into_split();
//! loop {
//!     let frame = read_frame(&mut read_half).await?;
//!     println!("Got {} frame", frame.code());
//! }
//! ```

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::wire_format::{Header, HEADER_SIZE};
use super::Frame;
use crate::error::{Result, SbpError};

/// Read one complete frame from the stream.
///
/// Waits until the full frame is available. Fails with `TruncatedFrame` if
/// the stream ends before the header or the payload is complete, including
/// a clean EOF before the first header byte.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header_buf = [0u8; HEADER_SIZE];
    let got = read_full(reader, &mut header_buf).await?;
    if got < HEADER_SIZE {
        return Err(SbpError::TruncatedFrame {
            expected: HEADER_SIZE,
            received: got,
        });
    }

    let header = Header::decode(&header_buf).ok_or(SbpError::TruncatedFrame {
        expected: HEADER_SIZE,
        received: got,
    })?;

    let len = header.payload_len();
    let mut payload = BytesMut::zeroed(len);
    let got = read_full(reader, &mut payload).await?;
    if got < len {
        return Err(SbpError::TruncatedFrame {
            expected: HEADER_SIZE + len,
            received: HEADER_SIZE + got,
        });
    }

    Frame::from_parts(header, payload.freeze())
}

/// Fill `buf` from the reader, stopping early only on EOF.
///
/// Returns the number of bytes actually read.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(SbpError::Io(e)),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode, ProtocolCode};
    use tokio::io::{duplex, AsyncWriteExt};

    #[tokio::test]
    async fn test_read_single_frame() {
        let bytes = encode(1, ProtocolCode::PostText, b"hello").unwrap();
        let mut stream = &bytes[..];

        let frame = read_frame(&mut stream).await.unwrap();
        assert_eq!(frame.version(), 1);
        assert_eq!(frame.code(), ProtocolCode::PostText);
        assert_eq!(frame.payload(), b"hello");
        assert!(stream.is_empty());
    }

    #[tokio::test]
    async fn test_does_not_over_read() {
        let mut bytes = encode(1, ProtocolCode::PostText, b"first").unwrap();
        bytes.extend(encode(1, ProtocolCode::GetBoard, b"").unwrap());
        bytes.extend(encode(1, ProtocolCode::PostText, b"third").unwrap());
        let mut stream = &bytes[..];

        let a = read_frame(&mut stream).await.unwrap();
        let b = read_frame(&mut stream).await.unwrap();
        let c = read_frame(&mut stream).await.unwrap();

        assert_eq!(a.payload(), b"first");
        assert_eq!(b.code(), ProtocolCode::GetBoard);
        assert_eq!(b.payload_len(), 0);
        assert_eq!(c.payload(), b"third");
    }

    #[tokio::test]
    async fn test_fragmented_frame() {
        let (mut tx, mut rx) = duplex(64);
        let bytes = encode(1, ProtocolCode::PostText, b"fragmented payload").unwrap();

        let writer = tokio::spawn(async move {
            for chunk in bytes.chunks(3) {
                tx.write_all(chunk).await.unwrap();
                tokio::task::yield_now().await;
            }
        });

        let frame = read_frame(&mut rx).await.unwrap();
        assert_eq!(frame.payload(), b"fragmented payload");
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_eof_before_header() {
        let mut stream: &[u8] = &[];
        let err = read_frame(&mut stream).await.unwrap_err();
        assert!(matches!(
            err,
            SbpError::TruncatedFrame {
                expected: 4,
                received: 0
            }
        ));
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn test_eof_mid_header() {
        let mut stream: &[u8] = &[1, 5];
        assert!(matches!(
            read_frame(&mut stream).await,
            Err(SbpError::TruncatedFrame {
                expected: 4,
                received: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_eof_mid_payload() {
        let bytes = encode(1, ProtocolCode::PostText, b"hello").unwrap();
        let mut stream = &bytes[..7];
        assert!(matches!(
            read_frame(&mut stream).await,
            Err(SbpError::TruncatedFrame {
                expected: 9,
                received: 7
            })
        ));
    }
}
