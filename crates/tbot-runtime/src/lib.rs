//! tbot Runtime - the server layer of the tbot command router.
//!
//! This crate provides:
//! - The bot server (`Server`, `ServerBuilder`): connect, route, serve
//! - Layered configuration (`TbotConfig`, `ConfigLoader`)
//! - Logging setup (`LoggingBuilder`)
//!
//! ```ignore
//! use tbot_runtime::Server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let adapter = MyAdapter::new();
//!     let server = Server::new(&adapter, std::env::var("BOT_TOKEN")?).await?;
//!
//!     server.handle("/start", "hi", Some("Say hi"))?;
//!     server.listen_and_serve().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Configuration
//!
//! [`ServerBuilder::load`] reads `tbot.toml` (with the `toml-config` feature)
//! and `TBOT_*` environment variables, validates the result, installs the
//! configured logging and returns a builder:
//!
//! ```ignore
//! let server = ServerBuilder::load()?.build(&adapter).await?;
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod server;

// Re-exports
pub use config::{ConfigError, ConfigLoader, ConfigResult, TbotConfig, WebhookConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use server::{Server, ServerBuilder};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
