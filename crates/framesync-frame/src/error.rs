/// Errors that can occur while describing, decoding or encoding frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The signature is empty or longer than the supported maximum.
    #[error("invalid signature length {len} (expected 1..={max} bytes)")]
    InvalidSignature { len: usize, max: usize },

    /// The header layout or payload length rule is inconsistent.
    #[error("invalid header layout: {0}")]
    InvalidLayout(String),

    /// No header field with the given name exists in the layout.
    #[error("unknown header field '{0}'")]
    UnknownField(String),

    /// The field exists but cannot be read as the requested type.
    #[error("header field '{name}' cannot be read as {requested}")]
    FieldType {
        name: String,
        requested: &'static str,
    },

    /// A value does not fit in the width of its header field.
    #[error("value {value} does not fit header field '{name}' ({width} bytes)")]
    FieldOverflow {
        name: String,
        value: u64,
        width: usize,
    },

    /// A header field was accessed before the header was fully received.
    #[error("header incomplete ({received} of {width} bytes)")]
    IncompleteHeader { received: usize, width: usize },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The payload cannot be described by the protocol's length rule.
    #[error("payload length {size} not encodable: {reason}")]
    PayloadLength { size: usize, reason: String },

    /// An I/O error occurred while reading frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The byte source ended; any partially assembled frame was discarded.
    #[error("connection closed ({discarded} bytes of incomplete frame discarded)")]
    ConnectionClosed { discarded: usize },

    /// The protocol configuration is invalid.
    #[error("protocol config error: {0}")]
    Config(String),

    /// The protocol configuration is not valid JSON.
    #[error("protocol config json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
