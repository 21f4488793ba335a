//! Configuration module for the tbot runtime.
//!
//! Layered loading (defaults, files, `TBOT_*` environment, code) and
//! validation of the server settings: token, webhook, drain timeout and
//! logging.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    LogFormat, LogLevel, LogOutput, LoggingConfig, SpanEventConfig, TbotConfig, WebhookConfig,
};
pub use validation::validate_config;
