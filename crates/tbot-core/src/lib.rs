//! # tbot Core
//!
//! The adapter boundary of the tbot command router.
//!
//! This crate holds the types shared between the router and the chat
//! platform integration:
//!
//! - **Adapter boundary**: [`Adapter`], [`Connection`] and [`Update`], the only
//!   surface through which the router reaches a chat platform.
//! - **Message**: [`Message`], the per-dispatch wrapper handed to handlers.
//! - **Errors**: [`AdapterError`] and [`ApiError`].
//!
//! ```text
//! ┌─────────────┐  connect(token)  ┌────────────┐  updates(webhook)  ┌──────────────┐
//! │   Adapter   │─────────────────▶│ Connection │───────────────────▶│ UpdateStream │
//! └─────────────┘                  └────────────┘                    └──────┬───────┘
//!                                                                           │ Update
//!                                                                           ▼
//!                                                                     ┌───────────┐
//!                                                                     │  Message  │──▶ handler
//!                                                                     └───────────┘
//! ```
//!
//! With the `test-util` feature, [`testing`] provides an in-memory adapter.

pub mod adapter;
pub mod error;
pub mod message;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use adapter::{
    Adapter, Attachment, BoxedConnection, BoxedUpdate, Connection, Update, UpdateStream, Webhook,
    downcast_update,
};
pub use error::{AdapterError, AdapterResult, ApiError, ApiResult};
pub use message::Message;

/// Boxed future used across the handler boundary.
pub type BoxFuture<'a, T> = futures::future::BoxFuture<'a, T>;

/// Prelude for common imports.
pub mod prelude {
    pub use super::adapter::{Adapter, Attachment, BoxedUpdate, Connection, Update, Webhook};
    pub use super::error::{AdapterError, ApiError};
    pub use super::message::Message;
}
