//! Error types for the routing layer.

use thiserror::Error;

/// Errors raised while registering routes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MuxError {
    /// The path is empty or does not start with `/`.
    #[error("invalid command path '{path}': must be non-empty and start with '/'")]
    InvalidPath {
        /// The rejected path.
        path: String,
    },
}

impl MuxError {
    /// Creates a [`MuxError::InvalidPath`].
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath { path: path.into() }
    }
}

/// Result type for mux operations.
pub type MuxResult<T> = Result<T, MuxError>;

/// Returned by a [`filter`](crate::middleware::filter) predicate when a
/// message does **not** pass.
///
/// The handler bridge recognises this error and drops the message without a
/// warning. All other service errors are treated as genuine failures.
#[derive(Debug, Clone, Error)]
#[error("message skipped by filter")]
pub struct MessageSkipped;
