//! Named OS thread that is always joined.

use std::any::Any;
use std::thread::{self, JoinHandle, ThreadId};

use tracing::{debug, warn};

use crate::error::WorkerError;

/// A thread that starts on construction and is joined exactly once,
/// either by [`join`](Self::join) or on drop.
pub struct ManagedWorker<T> {
    name: String,
    handle: Option<JoinHandle<T>>,
}

impl<T: Send + 'static> ManagedWorker<T> {
    /// Start `f` on a new thread called `name`.
    pub fn spawn<F>(name: impl Into<String>, f: F) -> Result<Self, WorkerError>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let name = name.into();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(f)
            .map_err(|source| WorkerError::Spawn {
                name: name.clone(),
                source,
            })?;
        debug!(worker = %name, "worker started");
        Ok(Self {
            name,
            handle: Some(handle),
        })
    }
}

impl<T> ManagedWorker<T> {
    /// Wait for the thread and return what the closure returned.
    pub fn join(&mut self) -> Result<T, WorkerError> {
        let handle = self.handle.take().ok_or(WorkerError::AlreadyJoined)?;
        let result = handle.join().map_err(|payload| WorkerError::Panicked {
            name: self.name.clone(),
            message: panic_message(payload.as_ref()),
        });
        debug!(worker = %self.name, ok = result.is_ok(), "worker joined");
        result
    }

    /// True once the closure has returned (or panicked), or after `join`.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `None` once joined.
    pub fn thread_id(&self) -> Option<ThreadId> {
        self.handle.as_ref().map(|h| h.thread().id())
    }
}

impl<T> Drop for ManagedWorker<T> {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            warn!(worker = %self.name, "worker dropped on its own thread; not joining");
            return;
        }
        if let Err(payload) = handle.join() {
            warn!(
                worker = %self.name,
                panic = %panic_message(payload.as_ref()),
                "worker panicked"
            );
        }
    }
}

impl<T> std::fmt::Debug for ManagedWorker<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedWorker")
            .field("name", &self.name)
            .field("joined", &self.handle.is_none())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn join_returns_closure_result() {
        let input = vec![1, 2, 3];
        let mut worker = ManagedWorker::spawn("sum", move || input.iter().sum::<i32>()).unwrap();
        assert_eq!(worker.name(), "sum");
        assert!(worker.thread_id().is_some());
        assert_eq!(worker.join().unwrap(), 6);
        assert!(worker.is_finished());
        assert!(worker.thread_id().is_none());
    }

    #[test]
    fn second_join_is_rejected() {
        let mut worker = ManagedWorker::spawn("once", || ()).unwrap();
        worker.join().unwrap();
        assert!(matches!(worker.join(), Err(WorkerError::AlreadyJoined)));
    }

    #[test]
    fn panic_is_reported_by_join() {
        let mut worker = ManagedWorker::spawn("boom", || -> u8 { panic!("kaboom") }).unwrap();
        match worker.join() {
            Err(WorkerError::Panicked { name, message }) => {
                assert_eq!(name, "boom");
                assert_eq!(message, "kaboom");
            }
            other => panic!("expected panic error, got {other:?}"),
        }
    }

    #[test]
    fn drop_joins_the_thread() {
        let done = Arc::new(AtomicBool::new(false));
        {
            let done = Arc::clone(&done);
            let _worker = ManagedWorker::spawn("slow", move || {
                thread::sleep(Duration::from_millis(30));
                done.store(true, Ordering::SeqCst);
            })
            .unwrap();
        }
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn drop_swallows_panics() {
        let worker = ManagedWorker::spawn("quiet", || panic!("ignored")).unwrap();
        drop(worker);
    }

    #[test]
    fn thread_carries_the_name() {
        let mut worker =
            ManagedWorker::spawn("framesync-test", || thread::current().name().map(str::to_owned))
                .unwrap();
        assert_eq!(worker.join().unwrap().as_deref(), Some("framesync-test"));
    }
}
