//! Runtime error types.

use thiserror::Error;

pub use crate::config::{ConfigError, ConfigResult};

/// Errors that can occur while building or running a server.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// No bot token was supplied.
    #[error("No bot token configured")]
    MissingToken,

    /// The adapter failed to connect or the update stream failed.
    #[error("Adapter error: {0}")]
    Adapter(#[from] tbot_core::AdapterError),

    /// A route could not be registered.
    #[error("Routing error: {0}")]
    Mux(#[from] tbot_framework::MuxError),

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
