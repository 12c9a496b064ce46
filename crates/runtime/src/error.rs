//! Error types for the BiDi proxy runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the proxy runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// No chromedriver executable could be located.
    #[error("chromedriver not found. Set BIDI_CHROMEDRIVER or install chromedriver on PATH")]
    DriverNotFound,

    /// The browser engine process failed to start.
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    /// The engine started but its protocol endpoint could not be reached.
    #[error("Failed to connect to browser: {0}")]
    ConnectionFailed(String),

    /// The peer closed the channel. This is the normal end of a session,
    /// not a fault.
    #[error("channel closed")]
    ChannelClosed,

    /// The peer sent something the channel could not decode.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true if this error means the channel reached its normal end.
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::ChannelClosed)
    }
}
