//! Dedicated writer task for each connection.
//!
//! Every connection gets one writer task that owns the socket's write half
//! and receives pre-encoded frames via an mpsc channel. The session replies
//! and every peer's broadcasts go through the same channel, so frames reach
//! the socket in the order they were queued and nothing else ever locks the
//! socket.
//!
//! # Architecture
//!
//! ```text
//! Own session ─┐
//! Broadcast A ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► TCP write half
//! Broadcast B ─┘
//! ```
//!
//! Multiple queued frames are batched into a single vectored write.

use std::io::IoSlice;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::error::{Result, SbpError};
use crate::protocol::{Frame, HEADER_SIZE};

/// Default channel capacity (frames queued per connection).
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// A frame ready to be written to the socket.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    /// Pre-encoded header (4 bytes).
    pub header: [u8; HEADER_SIZE],
    /// Payload bytes (empty for COMM_TEST, DISCONNECT, SESSION_ESTABLISHED).
    pub payload: Bytes,
}

impl OutboundFrame {
    /// Total size of this frame (header + payload).
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

impl From<&Frame> for OutboundFrame {
    fn from(frame: &Frame) -> Self {
        Self {
            header: frame.header().encode(),
            payload: frame.payload_bytes(),
        }
    }
}

impl From<Frame> for OutboundFrame {
    fn from(frame: Frame) -> Self {
        OutboundFrame::from(&frame)
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Channel capacity for frame queue.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for sending frames to the writer task.
///
/// This is cheaply cloneable; the registry keeps one clone per session.
#[derive(Clone, Debug)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
    abort: Arc<Notify>,
}

impl WriterHandle {
    /// Queue a frame for writing.
    ///
    /// Waits while the channel is full. Fails with `ConnectionClosed` once the
    /// writer task has stopped.
    pub async fn send(&self, frame: impl Into<OutboundFrame>) -> Result<()> {
        self.tx
            .send(frame.into())
            .await
            .map_err(|_| SbpError::ConnectionClosed)
    }

    /// Queue a frame without waiting.
    ///
    /// Fails with `QueueFull` when the peer is not draining its queue.
    pub fn try_send(&self, frame: impl Into<OutboundFrame>) -> Result<()> {
        self.tx.try_send(frame.into()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SbpError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SbpError::ConnectionClosed,
        })
    }

    /// Stop the writer task without flushing, even in the middle of a write.
    ///
    /// Queued frames are discarded and later sends fail with
    /// `ConnectionClosed`.
    pub fn abort(&self) {
        self.abort.notify_one();
    }

    /// Check whether the writer task is gone.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The task ends cleanly once every `WriterHandle` clone has been dropped,
/// after flushing whatever was still queued. It ends with an error if the
/// socket write fails.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let abort = Arc::new(Notify::new());
    let task = tokio::spawn(writer_loop(rx, writer, abort.clone()));
    (WriterHandle { tx, abort }, task)
}

/// Spawn the writer task with default configuration.
pub fn spawn_writer_task_default<W>(writer: W) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    spawn_writer_task(writer, WriterConfig::default())
}

/// Main writer loop - receives frames and writes them to the socket.
async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundFrame>,
    mut writer: W,
    abort: Arc<Notify>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = tokio::select! {
            biased;
            _ = abort.notified() => {
                rx.close();
                return Err(SbpError::ConnectionClosed);
            }
            frame = rx.recv() => match frame {
                Some(f) => f,
                None => {
                    // Channel closed, clean shutdown
                    let _ = writer.shutdown().await;
                    return Ok(());
                }
            },
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        let written = tokio::select! {
            biased;
            _ = abort.notified() => Err(SbpError::ConnectionClosed),
            result = write_batch(&mut writer, &batch) => result,
        };

        if let Err(e) = written {
            // Close the receiver so senders see ConnectionClosed right away
            rx.close();
            return Err(e);
        }
    }
}

/// Write a batch of frames using scatter/gather I/O (write_vectored).
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = batch.iter().map(|f| f.size()).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(SbpError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for the data not yet written.
fn build_remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 2);
    let mut offset = 0;

    for frame in batch {
        let header_end = offset + HEADER_SIZE;
        if skip_bytes < header_end {
            let start = skip_bytes.saturating_sub(offset);
            slices.push(IoSlice::new(&frame.header[start..]));
        }
        offset = header_end;

        if !frame.payload.is_empty() {
            let payload_end = offset + frame.payload.len();
            if skip_bytes < payload_end {
                let start = skip_bytes.saturating_sub(offset);
                slices.push(IoSlice::new(&frame.payload[start..]));
            }
            offset = payload_end;
        }
    }

    slices
}
