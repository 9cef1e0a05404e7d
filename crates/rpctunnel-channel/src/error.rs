/// Errors that can occur while framing or moving channel messages.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The frame header contains an invalid magic number.
    #[error("invalid frame magic (expected 0x5254 \"RT\")")]
    InvalidMagic,

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred on the underlying stream.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A message could not be serialized to JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The channel has been closed.
    #[error("channel closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, ChannelError>;
