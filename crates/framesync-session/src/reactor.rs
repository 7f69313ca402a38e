//! Single I/O thread that drives every session started on it.

use std::future::Future;
use std::sync::mpsc;

use tokio::runtime::{Builder, Handle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Result, SessionError};
use crate::worker::ManagedWorker;

/// A current-thread tokio runtime running on its own [`ManagedWorker`].
///
/// Sessions spawn their read and write tasks onto [`handle`](Self::handle).
/// Dropping the reactor stops the runtime, which cancels every task still
/// running on it, and joins the thread.
pub struct Reactor {
    handle: Handle,
    shutdown: CancellationToken,
    worker: ManagedWorker<()>,
}

impl Reactor {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let shutdown = CancellationToken::new();
        let (handle_tx, handle_rx) = mpsc::channel();

        let token = shutdown.clone();
        let worker = ManagedWorker::spawn(name.clone(), move || {
            let runtime = match Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(err) => {
                    let _ = handle_tx.send(Err(err));
                    return;
                }
            };
            let _ = handle_tx.send(Ok(runtime.handle().clone()));
            runtime.block_on(token.cancelled());
            debug!("reactor loop exited");
        })?;

        let handle = match handle_rx.recv() {
            Ok(Ok(handle)) => handle,
            Ok(Err(err)) => return Err(SessionError::Runtime(err)),
            Err(_) => {
                let mut worker = worker;
                worker.join()?;
                return Err(SessionError::Cancelled);
            }
        };
        info!(reactor = %name, "reactor started");

        Ok(Self {
            handle,
            shutdown,
            worker,
        })
    }

    /// Handle for spawning tasks onto the reactor thread.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Run `future` on the reactor and block the calling thread for its output.
    ///
    /// Must not be called from the reactor thread itself.
    pub fn run<F>(&self, future: F) -> Result<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        self.handle.spawn(async move {
            let _ = tx.send(future.await);
        });
        rx.recv().map_err(|_| SessionError::Cancelled)
    }

    /// A token cancelled when the reactor shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    /// Stop the runtime and join the thread.
    pub fn shutdown(mut self) -> Result<()> {
        self.shutdown.cancel();
        self.worker.join()?;
        info!(reactor = %self.worker.name(), "reactor stopped");
        Ok(())
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor")
            .field("name", &self.worker.name())
            .field("stopped", &self.shutdown.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_futures_on_the_reactor_thread() {
        let reactor = Reactor::new("reactor-test").unwrap();
        let name = reactor
            .run(async { std::thread::current().name().map(str::to_owned) })
            .unwrap();
        assert_eq!(name.as_deref(), Some("reactor-test"));
        reactor.shutdown().unwrap();
    }

    #[test]
    fn shutdown_token_fires_on_drop() {
        let reactor = Reactor::new("reactor-drop").unwrap();
        let token = reactor.shutdown_token();
        assert!(!token.is_cancelled());
        drop(reactor);
        assert!(token.is_cancelled());
    }

    #[test]
    fn pending_tasks_are_dropped_with_the_runtime() {
        let reactor = Reactor::new("reactor-pending").unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel::<bool>();
        reactor.handle().spawn(async move {
            let finished = rx.await.is_ok();
            let _ = done_tx.send(finished);
        });
        reactor.shutdown().unwrap();
        drop(tx);
        assert!(done_rx.recv().is_err());
    }
}
