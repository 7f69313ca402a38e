//! Blocking FIFO handoff between the reactor and consumer threads.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};

use crate::error::{PutError, QueueError};

/// Multi-producer, multi-consumer FIFO with explicit close.
///
/// Cloning yields another handle onto the same queue. `put` never blocks:
/// a bounded queue rejects items when full instead of stalling the producer.
/// Closing drops the only sender, so consumers drain what is left and then
/// see [`QueueError::Closed`].
pub struct MessageQueue<T> {
    shared: Arc<Shared<T>>,
}

struct Shared<T> {
    tx: RwLock<Option<Sender<T>>>,
    rx: Receiver<T>,
}

impl<T> MessageQueue<T> {
    /// An unbounded queue.
    pub fn new() -> Self {
        Self::from_channel(crossbeam_channel::unbounded())
    }

    /// A queue holding at most `capacity` items (at least one).
    pub fn bounded(capacity: usize) -> Self {
        Self::from_channel(crossbeam_channel::bounded(capacity.max(1)))
    }

    fn from_channel((tx, rx): (Sender<T>, Receiver<T>)) -> Self {
        Self {
            shared: Arc::new(Shared {
                tx: RwLock::new(Some(tx)),
                rx,
            }),
        }
    }

    /// Append an item and wake one waiting consumer.
    pub fn put(&self, item: T) -> Result<(), PutError<T>> {
        let tx = self.shared.tx.read().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = tx.as_ref() else {
            return Err(PutError {
                kind: QueueError::Closed,
                item,
            });
        };
        tx.try_send(item).map_err(|err| match err {
            TrySendError::Full(item) => PutError {
                kind: QueueError::Full,
                item,
            },
            TrySendError::Disconnected(item) => PutError {
                kind: QueueError::Closed,
                item,
            },
        })
    }

    /// Block until an item is available.
    ///
    /// After [`close`](Self::close), remaining items are still returned;
    /// once drained this fails with [`QueueError::Closed`].
    pub fn get(&self) -> Result<T, QueueError> {
        self.shared.rx.recv().map_err(|_| QueueError::Closed)
    }

    /// Wait at most `timeout` for an item. A zero timeout polls.
    pub fn try_get(&self, timeout: Duration) -> Result<Option<T>, QueueError> {
        if timeout.is_zero() {
            return match self.shared.rx.try_recv() {
                Ok(item) => Ok(Some(item)),
                Err(TryRecvError::Empty) => Ok(None),
                Err(TryRecvError::Disconnected) => Err(QueueError::Closed),
            };
        }
        match self.shared.rx.recv_timeout(timeout) {
            Ok(item) => Ok(Some(item)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(QueueError::Closed),
        }
    }

    /// Reject further `put`s and wake every waiting consumer. Idempotent.
    pub fn close(&self) {
        self.shared
            .tx
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_closed(&self) -> bool {
        self.shared
            .tx
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    pub fn len(&self) -> usize {
        self.shared.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.rx.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.shared.rx.capacity()
    }

    /// Blocking iterator that ends once the queue is closed and drained.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter { queue: self }
    }
}

impl<T> Clone for MessageQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for MessageQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for MessageQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Iterator returned by [`MessageQueue::iter`].
pub struct Iter<'a, T> {
    queue: &'a MessageQueue<T>,
}

impl<T> Iterator for Iter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.queue.get().ok()
    }
}
