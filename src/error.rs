use std::io;

use thiserror::Error;

/// Errors surfaced by the HandlerSocket client.
///
/// `Connection` and `Protocol` are fatal: the connection that produced them is
/// closed before the error is returned. `Operation` and `InvalidArgument` are
/// local to a single call and leave the connection usable.
#[derive(Debug, Error)]
pub enum HsError {
    #[error("connection error: {0}")]
    Connection(#[from] io::Error),

    #[error("connection is not open")]
    NotOpen,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("operation failed with status {status}: {message}")]
    Operation { status: i32, message: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl HsError {
    /// Whether the error closed the connection it came from.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HsError::Connection(_) | HsError::Protocol(_))
    }
}

pub type Result<T> = std::result::Result<T, HsError>;
