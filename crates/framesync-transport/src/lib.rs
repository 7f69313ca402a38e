//! Byte source/sink abstraction for framesync.
//!
//! Wraps the transports a frame stream can arrive on:
//! - TCP streams
//! - UDP sockets (connectionless, per-write destination)
//! - Serial lines (Unix, termios captured at open and restored on drop)
//! - Any other `AsyncRead + AsyncWrite` byte stream
//!
//! This is the lowest layer of framesync. Sessions own a [`Transport`] and
//! split it into a [`TransportReader`] and a [`TransportWriter`].

pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod serial;

pub use error::{Result, TransportError};
pub use traits::{Transport, TransportReader, TransportWriter, MAX_DATAGRAM_LEN};

#[cfg(unix)]
pub use serial::{SerialOptions, SerialPort};
