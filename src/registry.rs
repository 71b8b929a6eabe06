//! Connection registry and broadcast fan-out.
//!
//! The registry maps session identities to their outbound writer handles.
//! IDs are assigned sequentially starting from 1 and never reused.
//!
//! # Example
//!
//! ```ignore
//! use shared_board::registry::Registry;
//!
//! let registry = Registry::new();
//! let id = registry.register(writer_handle);
//!
//! let frame = Frame::text(ProtocolCode::PostText, "hi")?;
//! registry.broadcast(&frame, Some(id)); // everyone but `id`
//!
//! registry.unregister(id);
//! registry.unregister(id); // no-op
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::SbpError;
use crate::protocol::Frame;
use crate::writer::{OutboundFrame, WriterHandle};

/// Identity of a registered session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Registry of live sessions.
///
/// The sink map is only locked for the duration of a single insert, remove,
/// or copy; sends happen after the lock is released.
pub struct Registry {
    sinks: Mutex<HashMap<SessionId, WriterHandle>>,
    next_id: AtomicU64,
}

impl Registry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            sinks: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Hand out a fresh identity without registering anything yet.
    pub fn allocate_id(&self) -> SessionId {
        SessionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Add a session's outbound sink under an identity from `allocate_id`.
    ///
    /// From here on the session receives broadcasts.
    pub fn insert(&self, id: SessionId, sink: WriterHandle) {
        self.sinks.lock().insert(id, sink);
        tracing::debug!(session = %id, "registered session");
    }

    /// Add a session's outbound sink under a fresh identity.
    pub fn register(&self, sink: WriterHandle) -> SessionId {
        let id = self.allocate_id();
        self.insert(id, sink);
        id
    }

    /// Remove a session.
    ///
    /// Returns `false` if it was already gone.
    pub fn unregister(&self, id: SessionId) -> bool {
        let removed = self.sinks.lock().remove(&id).is_some();
        if removed {
            tracing::debug!(session = %id, "unregistered session");
        }
        removed
    }

    /// Check if a session is registered.
    pub fn contains(&self, id: SessionId) -> bool {
        self.sinks.lock().contains_key(&id)
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sinks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.lock().is_empty()
    }

    /// Copy of the current sinks, minus `exclude`.
    fn peers(&self, exclude: Option<SessionId>) -> Vec<(SessionId, WriterHandle)> {
        self.sinks
            .lock()
            .iter()
            .filter(|(id, _)| Some(**id) != exclude)
            .map(|(id, sink)| (*id, sink.clone()))
            .collect()
    }

    /// Queue `frame` for every registered session except `exclude`.
    ///
    /// Never waits on a peer. A peer whose writer is gone, or whose queue is
    /// full, is unregistered and its writer aborted so its session ends; the
    /// remaining peers still get the frame. Returns the number of peers
    /// reached.
    pub fn broadcast(&self, frame: &Frame, exclude: Option<SessionId>) -> usize {
        let outbound = OutboundFrame::from(frame);
        let mut delivered = 0;

        for (id, sink) in self.peers(exclude) {
            match sink.try_send(outbound.clone()) {
                Ok(()) => delivered += 1,
                Err(SbpError::QueueFull) => {
                    tracing::warn!(session = %id, "Dropping peer that is not keeping up");
                    self.unregister(id);
                    sink.abort();
                }
                Err(e) => {
                    tracing::warn!(session = %id, "Dropping peer after failed send: {}", e);
                    self.unregister(id);
                }
            }
        }

        tracing::debug!(code = %frame.code(), delivered, "broadcast complete");
        delivered
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
