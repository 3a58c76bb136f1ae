//! Error types for the connection layer.
//!
//! Two tiers: [`ConnectionError`] is what the executor and the wire
//! connection report, [`ToolingError`] is what callers of the facade see.
//! Every `ConnectionError` reaching a caller passes through an
//! [`ExceptionTransformer`](crate::handler::ExceptionTransformer) first.

use thiserror::Error;

/// Failure reported by the executor or the wire-level connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Executor has been stopped and accepts no new operations")]
    Stopped,

    #[error("Operation was dropped before a result was delivered")]
    Abandoned,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Daemon error: {0}")]
    Daemon(String),

    #[error("Unexpected result: {0}")]
    UnexpectedResult(String),

    /// The work function or the wire connection panicked.
    #[error("Operation panicked: {0}")]
    Panicked(String),
}

impl ConnectionError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ConnectionError::Cancelled)
    }
}

/// Error surfaced to callers of [`ProjectConnection`](crate::ProjectConnection)
/// and the operation builders.
#[derive(Error, Debug)]
pub enum ToolingError {
    /// Rejected locally, before anything was handed to the executor.
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{message}")]
    Cancelled {
        message: String,
        #[source]
        source: ConnectionError,
    },

    #[error("{message}")]
    Connection {
        message: String,
        #[source]
        source: ConnectionError,
    },
}

impl ToolingError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        ToolingError::InvalidArgument(message.into())
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, ToolingError::InvalidArgument(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ToolingError::Cancelled { .. })
    }

    /// The underlying collaborator failure, if this error wraps one.
    pub fn cause(&self) -> Option<&ConnectionError> {
        match self {
            ToolingError::InvalidArgument(_) => None,
            ToolingError::Cancelled { source, .. } | ToolingError::Connection { source, .. } => {
                Some(source)
            }
        }
    }
}
