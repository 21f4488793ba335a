//! # tbot
//!
//! A small command router for chat bots.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌────────────┐     ┌─────────────────────────────────────┐
//! │   Adapter   │────▶│   Server   │────▶│ dispatch "/start" (own task)        │──▶ reply
//! │ (platform)  │     │ (one loop) │────▶│ dispatch "/help"  (own task)        │──▶ reply
//! └─────────────┘     └────────────┘────▶│ dispatch ...      (own task)        │──▶ reply
//!                                        └─────────────────────────────────────┘
//! ```
//!
//! - **Adapter**: the chat platform integration, passed to the server explicitly
//! - **Server**: reads updates and spawns one dispatch per update
//! - **Mux**: maps the command of a message to its handler
//! - **Middleware**: wraps every resolved handler, first added outermost
//! - **Handlers**: async functions of a [`Message`](core::Message)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tbot::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let adapter = MyAdapter::new();
//!     let mut server = Server::builder()
//!         .token(std::env::var("BOT_TOKEN")?)
//!         .build(&adapter)
//!         .await?;
//!
//!     server.add_middleware(log_requests());
//!     server.handle("/start", "hi", Some("Say hi"))?;
//!     server.handle_func("/echo", |m: Message| async move { m.payload().to_string() }, None)?;
//!     server.handle_default(reply_with("unknown"), None);
//!
//!     server.listen_and_serve().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: `tbot.toml` configuration files (default)
//! - `yaml-config`: `tbot.yaml` configuration files
//! - `json-log`: JSON log output
//! - `test-util`: in-memory adapter for tests

pub use tbot_core as core;
pub use tbot_framework as framework;
pub use tbot_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use tbot::prelude::*;
/// ```
pub mod prelude {
    // Server - main entry point
    pub use tbot_runtime::{RuntimeError, RuntimeResult, Server, ServerBuilder};

    // Adapter boundary
    pub use tbot_core::{Adapter, Attachment, Connection, Message, Update, Webhook};

    // Routing and handlers
    pub use tbot_framework::{
        BoxedHandler, DefaultMux, Handler, HandlerResponse, Layer, Middleware, Mux, filter,
        from_fn, from_layer, log_requests, reply_with,
    };
}
