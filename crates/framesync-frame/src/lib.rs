//! Incremental frame recognition for noisy byte streams.
//!
//! Every frame on the wire is:
//! - A fixed signature of 1..=8 bytes used for synchronization
//! - A fixed-width header of named fields with explicit byte order
//! - A payload whose length is derived from the header (or fixed)
//!
//! The [`FrameAssembler`] consumes bytes one at a time, drops anything that
//! cannot start a frame, and hands back complete [`Frame`]s.

pub mod assembler;
pub mod codec;
pub mod config;
pub mod error;
pub mod header;
pub mod reader;
pub mod signature;

pub use assembler::{AssemblerState, FrameAssembler, ProtocolErrorKind, Verdict};
pub use codec::{
    Frame, PayloadLength, Protocol, DEFAULT_MAX_FRAME_SIZE, DEFAULT_SIGNATURE, LENGTH_FIELD,
};
pub use config::{FieldConfig, PayloadLengthConfig, ProtocolConfig};
pub use error::{FrameError, Result};
pub use header::{
    DecodedHeader, Endian, FieldKind, FieldSpec, FieldValue, FromField, HeaderDecoder,
    HeaderLayout, HeaderLayoutBuilder, HeaderProgress,
};
pub use reader::{FrameReader, Frames};
pub use signature::{Signature, SignatureChecker, SignatureMatch, MAX_SIGNATURE_LEN};
