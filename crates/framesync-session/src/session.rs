use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use framesync_frame::{FieldValue, Frame, FrameAssembler, Protocol, Verdict};
use framesync_transport::{
    Transport, TransportError, TransportReader, TransportWriter, MAX_DATAGRAM_LEN,
};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};
use crate::queue::MessageQueue;

const DEFAULT_READ_BUFFER_SIZE: usize = 4096;
const DEFAULT_WRITE_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Session behavior configuration.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Size of each stream read. Datagram transports always read into a
    /// buffer that fits the largest UDP payload.
    pub read_buffer_size: usize,
    /// Close the frame queue when the read loop ends.
    pub close_queue_on_exit: bool,
    /// How long a write already on the wire may keep going after `stop()`.
    /// A write still unfinished after this is abandoned, which can leave a
    /// truncated frame on a stream transport.
    pub write_drain_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            close_queue_on_exit: true,
            write_drain_timeout: DEFAULT_WRITE_DRAIN_TIMEOUT,
        }
    }
}

/// Point-in-time session counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub bytes_received: u64,
    pub frames_delivered: u64,
    /// Frames lost to a full or closed queue, or completed after `stop()`.
    pub frames_dropped: u64,
    pub protocol_errors: u64,
    /// Bytes skipped while resynchronizing.
    pub resync_bytes: u64,
    pub bytes_written: u64,
    pub write_errors: u64,
}

/// Final report of a session that ended through [`TransportSession::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub stats: SessionStats,
    /// Bytes of the incomplete frame discarded at shutdown.
    pub discarded_partial: usize,
}

#[derive(Debug, Default)]
struct StatsCounters {
    bytes_received: AtomicU64,
    frames_delivered: AtomicU64,
    frames_dropped: AtomicU64,
    protocol_errors: AtomicU64,
    resync_bytes: AtomicU64,
    bytes_written: AtomicU64,
    write_errors: AtomicU64,
}

impl StatsCounters {
    fn snapshot(&self) -> SessionStats {
        SessionStats {
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            resync_bytes: self.resync_bytes.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }
}

struct Shared {
    stats: StatsCounters,
    cancel: CancellationToken,
    /// Open while frames may still be enqueued.
    gate: Mutex<bool>,
}

impl Shared {
    fn new() -> Self {
        Self {
            stats: StatsCounters::default(),
            cancel: CancellationToken::new(),
            gate: Mutex::new(true),
        }
    }

    /// Close the delivery gate and cancel both tasks. True on the first call.
    fn stop(&self) -> bool {
        let mut open = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        if !*open {
            return false;
        }
        *open = false;
        drop(open);
        self.cancel.cancel();
        true
    }
}

/// Stops a [`TransportSession`] from any thread.
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopHandle {
    pub fn stop(&self) {
        if self.shared.stop() {
            debug!("session stop requested");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }
}

impl std::fmt::Debug for StopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopHandle")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

struct WriteRequest {
    data: Bytes,
    dest: Option<SocketAddr>,
    done: oneshot::Sender<Result<usize>>,
}

/// Owns a transport, drives a [`FrameAssembler`] from its read side and
/// delivers complete frames into a [`MessageQueue`].
pub struct TransportSession {
    transport: Option<Transport>,
    kind: &'static str,
    requires_destination: bool,
    protocol: Protocol,
    queue: MessageQueue<Frame>,
    options: SessionOptions,
    shared: Arc<Shared>,
    write_tx: mpsc::UnboundedSender<WriteRequest>,
    write_rx: Option<mpsc::UnboundedReceiver<WriteRequest>>,
}

impl TransportSession {
    pub fn new(transport: Transport, protocol: Protocol, queue: MessageQueue<Frame>) -> Self {
        Self::with_options(transport, protocol, queue, SessionOptions::default())
    }

    pub fn with_options(
        transport: Transport,
        protocol: Protocol,
        queue: MessageQueue<Frame>,
        options: SessionOptions,
    ) -> Self {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        Self {
            kind: transport.kind(),
            requires_destination: transport.requires_destination(),
            transport: Some(transport),
            protocol,
            queue,
            options,
            shared: Arc::new(Shared::new()),
            write_tx,
            write_rx: Some(write_rx),
        }
    }

    /// Spawn the read and write tasks onto `handle`.
    ///
    /// Writes submitted before `start` are sent once the writer runs.
    pub fn start(&mut self, handle: &Handle) -> Result<SessionTask> {
        let (transport, write_rx) = match (self.transport.take(), self.write_rx.take()) {
            (Some(transport), Some(write_rx)) => (transport, write_rx),
            _ => return Err(SessionError::AlreadyStarted),
        };
        let (reader, writer) = transport.into_split();
        let (outcome_tx, outcome_rx) = oneshot::channel();

        let writer_task = handle.spawn(write_loop(
            writer,
            write_rx,
            Arc::clone(&self.shared),
            self.options.write_drain_timeout,
        ));
        let read = ReadLoop {
            assembler: FrameAssembler::new(self.protocol.clone()),
            queue: self.queue.clone(),
            shared: Arc::clone(&self.shared),
            buffer_size: self.options.read_buffer_size.max(1),
        };
        let close_queue = self.options.close_queue_on_exit;
        let queue = self.queue.clone();
        let shared = Arc::clone(&self.shared);

        handle.spawn(async move {
            let outcome = read.run(reader).await;
            if close_queue {
                queue.close();
            }
            shared.cancel.cancel();
            let _ = writer_task.await;
            // Writes drained after stop() belong in the final counters.
            let outcome = outcome.map(|summary| SessionSummary {
                stats: shared.stats.snapshot(),
                ..summary
            });
            let _ = outcome_tx.send(outcome);
        });

        info!(transport = self.kind, "session started");
        Ok(SessionTask {
            outcome: outcome_rx,
        })
    }

    /// Queue `data` for sending on a stream transport or a datagram transport
    /// with a default peer.
    pub fn write(&self, data: impl Into<Bytes>) -> Result<WriteHandle> {
        if self.requires_destination {
            return Err(SessionError::DestinationRequired);
        }
        self.submit(data.into(), None)
    }

    /// Queue `data` for sending to `dest` (ignored by stream transports).
    pub fn write_to(&self, data: impl Into<Bytes>, dest: SocketAddr) -> Result<WriteHandle> {
        self.submit(data.into(), Some(dest))
    }

    /// Encode one frame with the session protocol and queue it for sending.
    pub fn write_frame(&self, fields: &[(&str, FieldValue)], payload: &[u8]) -> Result<WriteHandle> {
        let mut buf = BytesMut::new();
        self.protocol.encode(fields, payload, &mut buf)?;
        self.write(buf.freeze())
    }

    /// Stop reading, stop delivering frames and cancel pending writes.
    ///
    /// Idempotent. Use [`stop_handle`](Self::stop_handle) to stop from another thread.
    pub fn stop(&self) {
        if self.shared.stop() {
            debug!(transport = self.kind, "session stop requested");
        }
    }

    /// A clonable handle that can stop this session from any thread.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    pub fn stats(&self) -> SessionStats {
        self.shared.stats.snapshot()
    }

    pub fn queue(&self) -> &MessageQueue<Frame> {
        &self.queue
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// Transport name for diagnostics.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    fn submit(&self, data: Bytes, dest: Option<SocketAddr>) -> Result<WriteHandle> {
        if self.shared.cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }
        let (done, rx) = oneshot::channel();
        self.write_tx
            .send(WriteRequest { data, dest, done })
            .map_err(|_| SessionError::Cancelled)?;
        Ok(WriteHandle { rx })
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSession")
            .field("transport", &self.kind)
            .field("started", &self.transport.is_none())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Completion of one outbound write.
#[derive(Debug)]
pub struct WriteHandle {
    rx: oneshot::Receiver<Result<usize>>,
}

impl WriteHandle {
    /// Block until the write finishes. Must not be called from an async context.
    pub fn wait(self) -> Result<usize> {
        self.rx.blocking_recv().unwrap_or(Err(SessionError::Cancelled))
    }

    /// Wait asynchronously for the write to finish.
    pub async fn completion(self) -> Result<usize> {
        self.rx.await.unwrap_or(Err(SessionError::Cancelled))
    }
}

/// Terminal outcome of a started session, surfaced once.
#[derive(Debug)]
pub struct SessionTask {
    outcome: oneshot::Receiver<Result<SessionSummary>>,
}

impl SessionTask {
    /// Block until the session ends. Must not be called from an async context.
    ///
    /// `Ok` after [`TransportSession::stop`];
    /// [`SessionError::TransportClosed`] when the byte source ended first.
    pub fn wait(self) -> Result<SessionSummary> {
        self.outcome
            .blocking_recv()
            .unwrap_or(Err(SessionError::Cancelled))
    }

    pub async fn finished(self) -> Result<SessionSummary> {
        self.outcome.await.unwrap_or(Err(SessionError::Cancelled))
    }
}

struct ReadLoop {
    assembler: FrameAssembler,
    queue: MessageQueue<Frame>,
    shared: Arc<Shared>,
    buffer_size: usize,
}

impl ReadLoop {
    async fn run(mut self, mut reader: TransportReader) -> Result<SessionSummary> {
        let datagram = reader.is_datagram();
        let size = if datagram {
            self.buffer_size.max(MAX_DATAGRAM_LEN)
        } else {
            self.buffer_size
        };
        let mut buf = vec![0u8; size];
        let cancel = self.shared.cancel.clone();
        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let discarded = self.assembler.pending_bytes();
                    debug!(discarded, "read loop cancelled");
                    return Ok(SessionSummary {
                        stats: self.shared.stats.snapshot(),
                        discarded_partial: discarded,
                    });
                }
                read = reader.read_some(&mut buf) => read,
            };

            match read {
                Ok(n) => self.process(&buf[..n], datagram),
                Err(err) => {
                    let discarded = self.assembler.pending_bytes();
                    let reason = match err {
                        TransportError::Closed => "end of stream".to_string(),
                        other => other.to_string(),
                    };
                    debug!(%reason, discarded, kind = reader.kind(), "transport closed");
                    return Err(SessionError::TransportClosed { reason, discarded });
                }
            }
        }
    }

    /// Feed one read. A datagram is self-contained: a frame left incomplete
    /// at its end is discarded rather than continued from the next one.
    fn process(&mut self, chunk: &[u8], datagram: bool) {
        let stats = &self.shared.stats;
        stats
            .bytes_received
            .fetch_add(chunk.len() as u64, Ordering::Relaxed);

        let discarded_before = self.assembler.discarded_bytes();
        for verdict in self.assembler.feed_slice(chunk) {
            match verdict {
                Verdict::FrameComplete(frame) => self.deliver(frame),
                Verdict::ProtocolError(kind) => {
                    stats.protocol_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %kind, "protocol error, resynchronizing");
                }
                Verdict::NeedMore | Verdict::Resynchronizing => {}
            }
        }
        if datagram {
            let partial = self.assembler.discard_partial();
            if partial > 0 {
                debug!(partial, "datagram ended inside a frame");
            }
        }
        let skipped = self.assembler.discarded_bytes() - discarded_before;
        if skipped > 0 {
            stats.resync_bytes.fetch_add(skipped, Ordering::Relaxed);
        }
    }

    fn deliver(&self, frame: Frame) {
        let stats = &self.shared.stats;
        let open = self.shared.gate.lock().unwrap_or_else(PoisonError::into_inner);
        if !*open {
            stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        match self.queue.put(frame) {
            Ok(()) => {
                stats.frames_delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                warn!(reason = %err.kind, "frame dropped");
            }
        }
    }
}

async fn write_loop(
    mut writer: TransportWriter,
    mut requests: mpsc::UnboundedReceiver<WriteRequest>,
    shared: Arc<Shared>,
    drain_timeout: Duration,
) {
    let cancel = shared.cancel.clone();
    let kind = writer.kind();
    loop {
        let request = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            request = requests.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        // A write in progress at stop() gets `drain_timeout` to finish so the
        // peer does not see half a frame.
        let result = {
            let write = writer.write_all(&request.data, request.dest);
            tokio::pin!(write);
            tokio::select! {
                biased;
                sent = &mut write => sent.map_err(SessionError::from),
                _ = cancel.cancelled() => {
                    match tokio::time::timeout(drain_timeout, &mut write).await {
                        Ok(sent) => sent.map_err(SessionError::from),
                        Err(_) => {
                            warn!(kind, "write abandoned at stop");
                            Err(SessionError::Cancelled)
                        }
                    }
                }
            }
        };
        match &result {
            Ok(n) => {
                shared.stats.bytes_written.fetch_add(*n as u64, Ordering::Relaxed);
            }
            Err(SessionError::Cancelled) => {}
            Err(err) => {
                shared.stats.write_errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, kind, "write failed");
            }
        }
        let _ = request.done.send(result);
    }

    requests.close();
    while let Ok(request) = requests.try_recv() {
        let _ = request.done.send(Err(SessionError::Cancelled));
    }
    debug!(kind, "write loop exited");
}
