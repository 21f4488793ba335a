//! # tbot Framework
//!
//! Routing, handlers and middleware for the tbot command router.
//!
//! This layer provides:
//! - [`Handler`]: async functions of a [`Message`](tbot_core::Message), stored
//!   type-erased as [`BoxedHandler`]
//! - [`Mux`] and [`DefaultMux`]: exact-match command routing with file and
//!   default handlers
//! - [`Middleware`] and [`MiddlewareChain`]: handler wrapping, including tower
//!   layers via [`from_layer`]
//! - The built-in `/help` listing ([`help`])

pub mod error;
pub mod handler;
pub mod help;
pub mod middleware;
pub mod mux;
pub mod service;

pub use error::{MessageSkipped, MuxError, MuxResult};
pub use handler::{BoxedHandler, Handler, HandlerResponse, IntoHandler, into_handler, reply_with};
pub use help::{help_handler, render_help};
pub use middleware::{
    FnMiddleware, LayerMiddleware, Middleware, MiddlewareChain, filter, from_fn, from_layer,
    log_requests,
};
pub use mux::{DefaultMux, Mux, RouteInfo, SharedMux};
pub use service::{HandlerService, ServiceHandler};

pub use tower::Layer;
