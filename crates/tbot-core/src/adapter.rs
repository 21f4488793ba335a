//! Adapter boundary.
//!
//! The router never talks to a chat platform directly. Everything it needs is
//! expressed by three traits:
//!
//! - [`Adapter`]: creates a [`Connection`] from a bot token.
//! - [`Connection`]: opens the sequential stream of inbound updates, either by
//!   polling or through a webhook listener.
//! - [`Update`]: one inbound event. The router only reads its text and
//!   attachment marker; handlers use it to reply.
//!
//! ```rust,ignore
//! struct MyAdapter;
//!
//! #[async_trait]
//! impl Adapter for MyAdapter {
//!     async fn connect(&self, token: &str) -> AdapterResult<BoxedConnection> {
//!         let client = MyClient::login(token).await?;
//!         Ok(Arc::new(MyConnection::new(client)))
//!     }
//! }
//! ```

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::{AdapterResult, ApiResult};

// =============================================================================
// Adapter & Connection
// =============================================================================

/// Creates connections to a chat platform.
///
/// The adapter is handed to the server builder explicitly, which keeps the
/// server testable without any process-wide factory.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Validates `token` and establishes a connection.
    ///
    /// Failing here is fatal: the server is never constructed.
    async fn connect(&self, token: &str) -> AdapterResult<BoxedConnection>;
}

/// An established connection to the chat platform.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Opens the inbound update stream.
    ///
    /// With `Some(webhook)` the adapter registers `webhook.url` with the
    /// platform and listens on `webhook.listen_addr`; with `None` it polls.
    ///
    /// An `Err` item ends serving with that error. The end of the stream is a
    /// clean shutdown.
    async fn updates(&self, webhook: Option<&Webhook>) -> AdapterResult<UpdateStream>;
}

/// A shared connection trait object.
pub type BoxedConnection = Arc<dyn Connection>;

/// The stream of inbound updates produced by a [`Connection`].
pub type UpdateStream = BoxStream<'static, AdapterResult<BoxedUpdate>>;

/// Webhook settings passed to [`Connection::updates`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Webhook {
    /// Public URL registered with the platform.
    pub url: String,
    /// Local address the inbound HTTP listener binds to.
    pub listen_addr: String,
}

impl Webhook {
    /// Creates webhook settings.
    pub fn new(url: impl Into<String>, listen_addr: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            listen_addr: listen_addr.into(),
        }
    }
}

// =============================================================================
// Update
// =============================================================================

/// A file or media attachment carried by an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Platform-specific file identifier.
    pub file_id: String,
    /// Original file name, if the platform reports one.
    pub file_name: Option<String>,
    /// MIME type, if known.
    pub mime_type: Option<String>,
}

impl Attachment {
    /// Creates an attachment with only a file identifier.
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            file_name: None,
            mime_type: None,
        }
    }

    /// Sets the file name.
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Sets the MIME type.
    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }
}

/// One inbound event from the chat platform.
///
/// Opaque to the router except for its text, its attachment marker, and the
/// ability to reply to the chat it came from.
#[async_trait]
pub trait Update: Debug + Send + Sync {
    /// The message text (or caption). Empty when the update has none.
    fn text(&self) -> &str;

    /// The attachment carried by this update, if any.
    fn attachment(&self) -> Option<&Attachment> {
        None
    }

    /// Sends `text` back to the originating chat.
    async fn reply(&self, text: &str) -> ApiResult<()>;

    /// Returns self as an `Arc<dyn Any>` for downcasting to the platform type.
    ///
    /// Implementors should simply return `self`.
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// A shared update trait object.
pub type BoxedUpdate = Arc<dyn Update>;

/// Attempts to downcast a [`BoxedUpdate`] to its concrete platform type.
///
/// ```rust,ignore
/// if let Some(update) = downcast_update::<TelegramUpdate>(message.update().clone()) {
///     println!("chat id: {}", update.chat_id);
/// }
/// ```
pub fn downcast_update<T: Update + 'static>(update: BoxedUpdate) -> Option<Arc<T>> {
    Arc::downcast::<T>(update.as_any()).ok()
}
