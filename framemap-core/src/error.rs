//! Error types shared by every framemap crate.
//!
//! "No corresponding frame" is not an error: index lookups return the
//! [`NO_FRAME`](crate::NO_FRAME) sentinel instead.

use thiserror::Error;

/// Main error type for the framemap engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid zone boundary, cadence pattern or parameter combination.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid argument passed to an operation.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Node id does not name a live node.
    #[error("Node {0} not found")]
    NodeNotFound(usize),

    /// Nodes cannot be wired together as requested.
    #[error("Invalid connection: {0}")]
    InvalidConnection(String),

    /// Node exists but is not of the requested type.
    #[error("Node {node} is not a {expected}")]
    WrongNodeType {
        /// Offending node.
        node: usize,
        /// Expected node type.
        expected: &'static str,
    },

    /// Failure reported by an upstream frame source.
    #[error("Source error: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    /// Create an invalid parameter error.
    pub fn invalid_param(msg: impl Into<String>) -> Self {
        Error::InvalidParameter(msg.into())
    }

    /// Wrap an upstream decode failure.
    pub fn source<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Source(Box::new(err))
    }

    /// Check if this is a configuration error.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }

    /// Check if this error came from a cancelled operation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Result type alias for framemap operations.
pub type Result<T> = std::result::Result<T, Error>;
