//! Error types for the adapter boundary.
//!
//! [`AdapterError`] covers everything that can go wrong while connecting to the
//! chat platform or while receiving updates from it. [`ApiError`] covers
//! outbound calls (replies). Framework-level errors live in `tbot-framework`.

use thiserror::Error;

// =============================================================================
// Adapter Errors
// =============================================================================

/// Errors raised by an adapter while connecting or streaming updates.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    /// The platform rejected the bot token.
    #[error("invalid bot token: {reason}")]
    InvalidToken {
        /// Reason reported by the adapter.
        reason: String,
    },

    /// The adapter could not establish its connection.
    #[error("connection failed: {reason}")]
    ConnectionFailed {
        /// Reason for failure.
        reason: String,
    },

    /// The update stream broke (dropped connection, webhook listener failure).
    #[error("update stream closed: {reason}")]
    StreamClosed {
        /// Reason for closure.
        reason: String,
    },

    /// Internal adapter error.
    #[error("adapter error: {0}")]
    Internal(String),
}

impl AdapterError {
    /// Creates an [`AdapterError::InvalidToken`].
    pub fn invalid_token(reason: impl Into<String>) -> Self {
        Self::InvalidToken {
            reason: reason.into(),
        }
    }

    /// Creates an [`AdapterError::ConnectionFailed`].
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            reason: reason.into(),
        }
    }

    /// Creates an [`AdapterError::StreamClosed`].
    pub fn stream_closed(reason: impl Into<String>) -> Self {
        Self::StreamClosed {
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for AdapterError {
    fn from(err: std::io::Error) -> Self {
        Self::ConnectionFailed {
            reason: err.to_string(),
        }
    }
}

// =============================================================================
// API Errors
// =============================================================================

/// Error type for outbound calls such as replies.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The adapter is no longer connected.
    #[error("bot is not connected")]
    NotConnected,

    /// The platform refused or failed to deliver the message.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// The originating update cannot be replied to.
    #[error("update does not support replies")]
    Unsupported,

    /// Other error.
    #[error("{0}")]
    Other(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Result type for API calls.
pub type ApiResult<T> = Result<T, ApiError>;
