//! Frame synchronization for noisy byte streams.
//!
//! framesync locks onto a signature, decodes a fixed header, and delivers
//! complete frames from TCP, UDP and serial links to a consumer queue.
//!
//! # Crate Structure
//!
//! - [`transport`] - Byte sources and sinks (TCP, UDP, serial)
//! - [`frame`] - Protocol description and the byte-at-a-time frame assembler
//! - [`session`] - Transport sessions, message queue and managed workers (behind `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use framesync_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use framesync_frame::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use framesync_session::*;
}
