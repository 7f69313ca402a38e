use std::fmt;

/// Errors returned by [`MessageQueue`](crate::MessageQueue) consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The queue was closed and every remaining item has been drained.
    #[error("queue closed")]
    Closed,

    /// A bounded queue is at capacity.
    #[error("queue full")]
    Full,
}

/// A rejected [`MessageQueue::put`](crate::MessageQueue::put); hands the item back.
#[derive(thiserror::Error)]
#[error("{kind}")]
pub struct PutError<T> {
    pub kind: QueueError,
    pub item: T,
}

impl<T> PutError<T> {
    pub fn into_inner(self) -> T {
        self.item
    }
}

impl<T> fmt::Debug for PutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PutError").field("kind", &self.kind).finish_non_exhaustive()
    }
}

/// Errors from [`ManagedWorker`](crate::ManagedWorker).
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The OS refused to start the thread.
    #[error("failed to spawn worker '{name}': {source}")]
    Spawn {
        name: String,
        source: std::io::Error,
    },

    /// The worker closure panicked.
    #[error("worker '{name}' panicked: {message}")]
    Panicked { name: String, message: String },

    /// `join` was already called on this worker.
    #[error("worker already joined")]
    AlreadyJoined,
}

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] framesync_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] framesync_frame::FrameError),

    /// The byte source ended or failed; any partial frame was discarded.
    #[error("transport closed: {reason} ({discarded} bytes of incomplete frame discarded)")]
    TransportClosed { reason: String, discarded: usize },

    /// The session was stopped before the operation completed.
    #[error("session stopped")]
    Cancelled,

    /// `start` was called twice.
    #[error("session already started")]
    AlreadyStarted,

    /// A connectionless transport needs a destination for this write.
    #[error("datagram session requires a destination address")]
    DestinationRequired,

    /// The reactor runtime could not be built.
    #[error("reactor runtime error: {0}")]
    Runtime(std::io::Error),

    /// Worker thread error.
    #[error("worker error: {0}")]
    Worker(#[from] WorkerError),
}

pub type Result<T> = std::result::Result<T, SessionError>;
