//! Shared error type across pathlink crates.

use thiserror::Error;

/// Stable error kinds (reported in logs and ERROR replies).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Socket establishment failed.
    Connection,
    /// Outbound write failed.
    Write,
    /// A received frame is not a valid envelope.
    MalformedEnvelope,
    /// Stream ended with a partial frame buffered.
    IncompleteFrameAtClose,
    /// Length prefix above the configured ceiling.
    FrameTooLarge,
    /// Config rejected at load time.
    InvalidConfig,
    /// No handler registered for a requested path.
    UnknownPath,
    /// A path handler failed.
    Handler,
    /// Internal error.
    Internal,
}

impl ErrorKind {
    /// String representation used on the wire and in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Connection => "CONNECTION_ERROR",
            ErrorKind::Write => "WRITE_ERROR",
            ErrorKind::MalformedEnvelope => "MALFORMED_ENVELOPE",
            ErrorKind::IncompleteFrameAtClose => "INCOMPLETE_FRAME_AT_CLOSE",
            ErrorKind::FrameTooLarge => "FRAME_TOO_LARGE",
            ErrorKind::InvalidConfig => "INVALID_CONFIG",
            ErrorKind::UnknownPath => "UNKNOWN_PATH",
            ErrorKind::Handler => "HANDLER_ERROR",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, PathlinkError>;

/// Unified error type used by core and client.
#[derive(Debug, Error)]
pub enum PathlinkError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("write error: {0}")]
    Write(String),
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    #[error("stream closed with {buffered} bytes of an incomplete frame buffered")]
    IncompleteFrameAtClose { buffered: usize },
    #[error("frame of {len} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("no handler registered for path: {0}")]
    UnknownPath(String),
    #[error("handler failed: {0}")]
    Handler(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl PathlinkError {
    /// Map to the stable error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PathlinkError::Connection(_) => ErrorKind::Connection,
            PathlinkError::Write(_) => ErrorKind::Write,
            PathlinkError::MalformedEnvelope(_) => ErrorKind::MalformedEnvelope,
            PathlinkError::IncompleteFrameAtClose { .. } => ErrorKind::IncompleteFrameAtClose,
            PathlinkError::FrameTooLarge { .. } => ErrorKind::FrameTooLarge,
            PathlinkError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            PathlinkError::UnknownPath(_) => ErrorKind::UnknownPath,
            PathlinkError::Handler(_) => ErrorKind::Handler,
            PathlinkError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether this error ends the session.
    ///
    /// Per-frame and per-request failures are recoverable; the receive loop
    /// keeps going after them.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            PathlinkError::MalformedEnvelope(_)
                | PathlinkError::UnknownPath(_)
                | PathlinkError::Handler(_)
        )
    }
}
