//! Transport sessions for framesync.
//!
//! A [`TransportSession`] owns one [`Transport`](framesync_transport::Transport),
//! runs its read and write tasks on a [`Reactor`] thread, and hands complete
//! frames to consumer threads through a [`MessageQueue`]. Consumers typically
//! run on a [`ManagedWorker`], which is joined when it goes out of scope.

pub mod error;
pub mod queue;
pub mod reactor;
pub mod session;
pub mod worker;

pub use error::{PutError, QueueError, Result, SessionError, WorkerError};
pub use queue::{Iter, MessageQueue};
pub use reactor::Reactor;
pub use session::{
    SessionOptions, SessionStats, SessionSummary, SessionTask, StopHandle, TransportSession,
    WriteHandle,
};
pub use worker::ManagedWorker;
