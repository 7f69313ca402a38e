//! Incremental frame recognition.
//!
//! A [`FrameAssembler`] consumes one byte at a time and walks
//! `Scanning → MatchingSignature → DecodingHeader → AccumulatingPayload → Complete`.
//! Bytes that cannot belong to a frame are dropped while resynchronizing, so a
//! noisy stream never splices bytes from two frames together.

use bytes::{BufMut, BytesMut};
use tracing::{debug, trace};

use crate::codec::{Frame, Protocol};
use crate::header::{HeaderDecoder, HeaderProgress};
use crate::signature::{SignatureChecker, SignatureMatch};

/// Where the assembler is within the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    /// No signature byte matched yet.
    Scanning,
    /// Part of the signature has matched.
    MatchingSignature,
    DecodingHeader,
    AccumulatingPayload,
    /// A frame was returned; `reset()` must be called before feeding again.
    Complete,
}

/// Why a byte could not advance the current frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolErrorKind {
    /// The header declared more payload than the protocol allows.
    /// The assembler has already reset itself.
    OversizedFrame { declared: usize, max: usize },
    /// The header could not be interpreted. The assembler has already reset itself.
    InvalidHeader(String),
    /// `feed` was called on a complete assembler. The byte was not consumed.
    NotReset,
}

impl std::fmt::Display for ProtocolErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolErrorKind::OversizedFrame { declared, max } => {
                write!(f, "oversized frame ({declared} bytes declared, max {max})")
            }
            ProtocolErrorKind::InvalidHeader(reason) => write!(f, "invalid header: {reason}"),
            ProtocolErrorKind::NotReset => write!(f, "assembler fed after completion without reset"),
        }
    }
}

/// Result of feeding one byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The byte was consumed; the frame is not complete yet.
    NeedMore,
    /// The byte did not continue a frame and one or more bytes were discarded.
    Resynchronizing,
    /// The byte completed a frame. Returned exactly once per frame.
    FrameComplete(Frame),
    ProtocolError(ProtocolErrorKind),
}

/// Byte-at-a-time frame recognizer for one [`Protocol`].
#[derive(Debug)]
pub struct FrameAssembler {
    protocol: Protocol,
    checker: SignatureChecker,
    header: HeaderDecoder,
    buf: BytesMut,
    payload_remaining: usize,
    state: AssemblerState,
    discarded: u64,
}

impl FrameAssembler {
    pub fn new(protocol: Protocol) -> Self {
        let checker = SignatureChecker::new(*protocol.signature());
        let header = HeaderDecoder::new(protocol.layout().clone());
        let buf = BytesMut::with_capacity(protocol.prefix_len());
        Self {
            protocol,
            checker,
            header,
            buf,
            payload_remaining: 0,
            state: AssemblerState::Scanning,
            discarded: 0,
        }
    }

    /// Advance the state machine by one byte.
    pub fn feed(&mut self, byte: u8) -> Verdict {
        match self.state {
            AssemblerState::Scanning | AssemblerState::MatchingSignature => {
                self.feed_signature(byte)
            }
            AssemblerState::DecodingHeader => {
                self.buf.put_u8(byte);
                match self.header.feed(byte) {
                    HeaderProgress::Accumulating => Verdict::NeedMore,
                    HeaderProgress::HeaderComplete => self.header_complete(),
                }
            }
            AssemblerState::AccumulatingPayload => {
                self.buf.put_u8(byte);
                self.payload_remaining -= 1;
                if self.payload_remaining == 0 {
                    self.complete()
                } else {
                    Verdict::NeedMore
                }
            }
            AssemblerState::Complete => Verdict::ProtocolError(ProtocolErrorKind::NotReset),
        }
    }

    /// Feed a chunk, resetting after every completed frame.
    ///
    /// Returns only the verdicts a caller has to act on:
    /// completed frames and protocol errors, in stream order.
    pub fn feed_slice(&mut self, data: &[u8]) -> Vec<Verdict> {
        let mut out = Vec::new();
        for &byte in data {
            if self.state == AssemblerState::Complete {
                self.reset();
            }
            match self.feed(byte) {
                Verdict::NeedMore | Verdict::Resynchronizing => {}
                verdict @ Verdict::FrameComplete(_) => {
                    out.push(verdict);
                    self.reset();
                }
                verdict @ Verdict::ProtocolError(_) => out.push(verdict),
            }
        }
        out
    }

    /// Drop any partial frame and return to `Scanning`. Idempotent.
    pub fn reset(&mut self) {
        self.checker.reset();
        self.header.reset();
        self.buf.clear();
        self.payload_remaining = 0;
        self.state = AssemblerState::Scanning;
    }

    /// Drop the incomplete frame, counting its bytes as discarded.
    ///
    /// Returns how many bytes were dropped. Used at boundaries no frame may
    /// cross, such as the end of a datagram.
    pub fn discard_partial(&mut self) -> usize {
        let pending = self.pending_bytes();
        self.discarded += pending as u64;
        self.reset();
        pending
    }

    pub fn state(&self) -> AssemblerState {
        self.state
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// Bytes of the current, incomplete frame (signature prefix included).
    pub fn pending_bytes(&self) -> usize {
        match self.state {
            AssemblerState::Scanning | AssemblerState::MatchingSignature => self.checker.cursor(),
            AssemblerState::Complete => 0,
            _ => self.buf.len(),
        }
    }

    /// Total bytes dropped while resynchronizing or after a protocol error.
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded
    }

    fn feed_signature(&mut self, byte: u8) -> Verdict {
        let matched = self.checker.cursor();
        match self.checker.feed(byte) {
            SignatureMatch::Matching => {
                self.state = AssemblerState::MatchingSignature;
                Verdict::NeedMore
            }
            SignatureMatch::MatchComplete => {
                self.buf.clear();
                self.buf.put_slice(self.protocol.signature().as_bytes());
                self.state = AssemblerState::DecodingHeader;
                trace!(signature = ?self.protocol.signature(), "signature matched");
                if self.header.is_complete() {
                    // Zero-width header.
                    self.header_complete()
                } else {
                    Verdict::NeedMore
                }
            }
            SignatureMatch::Mismatch => {
                let resumed = if matched > 0 {
                    self.checker.recover(matched, byte)
                } else {
                    SignatureMatch::Mismatch
                };
                let kept = self.checker.cursor();
                self.discarded += (matched + 1 - kept) as u64;
                self.state = if resumed == SignatureMatch::Matching {
                    AssemblerState::MatchingSignature
                } else {
                    AssemblerState::Scanning
                };
                Verdict::Resynchronizing
            }
        }
    }

    fn header_complete(&mut self) -> Verdict {
        let header = &self.buf[self.protocol.signature().len()..];
        let declared = match self.protocol.declared_payload_len(header) {
            Ok(len) => len,
            Err(err) => {
                self.abandon();
                return Verdict::ProtocolError(ProtocolErrorKind::InvalidHeader(err.to_string()));
            }
        };

        let max = self.protocol.max_frame_size();
        if declared > max {
            debug!(declared, max, "oversized frame, resynchronizing");
            self.abandon();
            return Verdict::ProtocolError(ProtocolErrorKind::OversizedFrame { declared, max });
        }

        if declared == 0 {
            return self.complete();
        }
        self.buf.reserve(declared);
        self.payload_remaining = declared;
        self.state = AssemblerState::AccumulatingPayload;
        Verdict::NeedMore
    }

    fn complete(&mut self) -> Verdict {
        self.state = AssemblerState::Complete;
        let bytes = self.buf.split().freeze();
        Verdict::FrameComplete(Frame::from_parts(bytes, &self.protocol))
    }

    fn abandon(&mut self) {
        self.discarded += self.buf.len() as u64;
        self.reset();
    }
}
