use std::fmt;
use std::io;

use framesync_frame::FrameError;
use framesync_session::{SessionError, WorkerError};
use framesync_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Io(source) => io_error(context, source),
        TransportError::Serial { ref source, .. }
            if source.kind() == io::ErrorKind::PermissionDenied =>
        {
            CliError::new(PERMISSION_DENIED, format!("{context}: {err}"))
        }
        TransportError::DestinationRequired => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::Config(_)
        | FrameError::Json(_)
        | FrameError::InvalidSignature { .. }
        | FrameError::InvalidLayout(_)
        | FrameError::UnknownField(_) => CliError::new(USAGE, format!("{context}: {err}")),
        FrameError::PayloadTooLarge { .. }
        | FrameError::PayloadLength { .. }
        | FrameError::FieldOverflow { .. }
        | FrameError::FieldType { .. } => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        FrameError::ConnectionClosed { .. } => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn session_error(context: &str, err: SessionError) -> CliError {
    match err {
        SessionError::Transport(err) => transport_error(context, err),
        SessionError::Frame(err) => frame_error(context, err),
        SessionError::TransportClosed { .. } => CliError::new(FAILURE, format!("{context}: {err}")),
        SessionError::DestinationRequired => CliError::new(USAGE, format!("{context}: {err}")),
        SessionError::Worker(WorkerError::Spawn { source, .. }) | SessionError::Runtime(source) => {
            io_error(context, source)
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_io_kinds_to_exit_codes() {
        let denied = io_error("open", io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(denied.code, PERMISSION_DENIED);
        assert!(denied.message.starts_with("open: "));

        let refused = io_error("connect", io::Error::from(io::ErrorKind::ConnectionRefused));
        assert_eq!(refused.code, FAILURE);
    }

    #[test]
    fn config_errors_are_usage_errors() {
        let err = frame_error("protocol", FrameError::Config("bad".to_string()));
        assert_eq!(err.code, USAGE);

        let err = frame_error(
            "encode",
            FrameError::PayloadTooLarge { size: 10, max: 4 },
        );
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn session_errors_unwrap_inner_layers() {
        let err = session_error(
            "send",
            SessionError::Transport(TransportError::DestinationRequired),
        );
        assert_eq!(err.code, USAGE);

        let err = session_error(
            "listen",
            SessionError::TransportClosed {
                reason: "end of stream".to_string(),
                discarded: 0,
            },
        );
        assert_eq!(err.code, FAILURE);
        assert_eq!(session_error("x", SessionError::Cancelled).code, INTERNAL);
    }
}
