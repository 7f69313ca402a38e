use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

use tracing::warn;

use crate::assembler::{FrameAssembler, Verdict};
use crate::codec::{Frame, Protocol};
use crate::error::{FrameError, Result};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from any blocking `Read` source.
///
/// Garbage between frames is skipped and protocol errors (such as oversized
/// frames) are logged and resynchronized past, so callers only ever see
/// complete frames, I/O errors or the end of the stream.
pub struct FrameReader<T> {
    inner: T,
    assembler: FrameAssembler,
    ready: VecDeque<Frame>,
    protocol_errors: u64,
}

impl<T: Read> FrameReader<T> {
    pub fn new(inner: T, protocol: Protocol) -> Self {
        Self {
            inner,
            assembler: FrameAssembler::new(protocol),
            ready: VecDeque::new(),
            protocol_errors: 0,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` at EOF; any partially
    /// assembled frame is discarded.
    pub fn read_frame(&mut self) -> Result<Frame> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(frame);
            }

            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                let discarded = self.assembler.pending_bytes();
                self.assembler.reset();
                return Err(FrameError::ConnectionClosed { discarded });
            }

            for verdict in self.assembler.feed_slice(&chunk[..read]) {
                match verdict {
                    Verdict::FrameComplete(frame) => self.ready.push_back(frame),
                    Verdict::ProtocolError(kind) => {
                        self.protocol_errors += 1;
                        warn!(error = %kind, "protocol error while reading frames");
                    }
                    Verdict::NeedMore | Verdict::Resynchronizing => {}
                }
            }
        }
    }

    /// Iterate over frames until EOF or the first error.
    pub fn frames(&mut self) -> Frames<'_, T> {
        Frames { reader: self }
    }

    /// Bytes skipped while looking for a signature or after a protocol error.
    pub fn discarded_bytes(&self) -> u64 {
        self.assembler.discarded_bytes()
    }

    pub fn protocol_errors(&self) -> u64 {
        self.protocol_errors
    }

    pub fn protocol(&self) -> &Protocol {
        self.assembler.protocol()
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

/// Iterator returned by [`FrameReader::frames`].
///
/// Ends quietly at EOF; other errors are yielded once and end iteration.
pub struct Frames<'a, T> {
    reader: &'a mut FrameReader<T>,
}

impl<T: Read> Iterator for Frames<'_, T> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_frame() {
            Ok(frame) => Some(Ok(frame)),
            Err(FrameError::ConnectionClosed { .. }) => None,
            Err(err) => Some(Err(err)),
        }
    }
}
