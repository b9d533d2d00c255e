//! Control channel error types.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use super::protocol::MAX_LINE_LEN;

/// Errors from socket operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The server socket could not be bound.
    #[error("Failed to bind control socket at {path}: {source}")]
    Bind {
        /// Socket path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// IO error on an established connection.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A line exceeded the maximum length.
    #[error("Line exceeds {MAX_LINE_LEN} bytes")]
    LineTooLong,

    /// The peer stopped reading and its reply queue is full.
    #[error("Reply queue full, peer is not reading")]
    QueueFull,

    /// The peer closed the connection.
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Result type for socket operations.
pub type ControlResult<T> = Result<T, ControlError>;
