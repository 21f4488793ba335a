//! In-memory adapter for tests.
//!
//! Enabled with the `test-util` feature. [`MockAdapter`] hands out a
//! [`MockConnection`] whose update stream is fed through an
//! [`UpdateSender`]; every [`MockUpdate`] records the replies sent to it.
//!
//! ```rust,ignore
//! let (adapter, updates) = MockAdapter::new();
//! let server = Server::builder().token("t").build(&adapter).await?;
//!
//! let start = updates.send_text("/start");
//! updates.close();
//! server.listen_and_serve().await?;
//!
//! assert_eq!(start.replies(), vec!["hi"]);
//! ```

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;
use parking_lot::Mutex;

use crate::adapter::{
    Adapter, Attachment, BoxedConnection, BoxedUpdate, Connection, Update, UpdateStream, Webhook,
};
use crate::error::{AdapterError, AdapterResult, ApiError, ApiResult};

// =============================================================================
// MockUpdate
// =============================================================================

/// An update whose replies are recorded instead of sent.
#[derive(Debug, Default)]
pub struct MockUpdate {
    text: String,
    attachment: Option<Attachment>,
    fail_replies: bool,
    replies: Mutex<Vec<String>>,
}

impl MockUpdate {
    /// A plain text update.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// An update carrying `attachment`, with `caption` as its text.
    pub fn file(caption: impl Into<String>, attachment: Attachment) -> Self {
        Self {
            text: caption.into(),
            attachment: Some(attachment),
            ..Default::default()
        }
    }

    /// Makes every reply fail with [`ApiError::SendFailed`].
    pub fn failing_replies(mut self) -> Self {
        self.fail_replies = true;
        self
    }

    /// Replies recorded so far, in send order.
    pub fn replies(&self) -> Vec<String> {
        self.replies.lock().clone()
    }
}

#[async_trait]
impl Update for MockUpdate {
    fn text(&self) -> &str {
        &self.text
    }

    fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    async fn reply(&self, text: &str) -> ApiResult<()> {
        if self.fail_replies {
            return Err(ApiError::SendFailed("mock reply failure".into()));
        }
        self.replies.lock().push(text.to_string());
        Ok(())
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

// =============================================================================
// UpdateSender
// =============================================================================

/// Feeds updates into a [`MockConnection`]'s stream.
///
/// Dropping the sender (or calling [`close`](Self::close)) ends the stream.
#[derive(Clone)]
pub struct UpdateSender {
    tx: mpsc::UnboundedSender<AdapterResult<BoxedUpdate>>,
}

impl UpdateSender {
    /// Pushes an update and returns a handle for inspecting its replies.
    pub fn send(&self, update: MockUpdate) -> Arc<MockUpdate> {
        let update = Arc::new(update);
        let _ = self.tx.unbounded_send(Ok(update.clone() as BoxedUpdate));
        update
    }

    /// Pushes a plain text update.
    pub fn send_text(&self, text: impl Into<String>) -> Arc<MockUpdate> {
        self.send(MockUpdate::text(text))
    }

    /// Pushes a terminal stream error.
    pub fn fail(&self, error: AdapterError) {
        let _ = self.tx.unbounded_send(Err(error));
    }

    /// Ends the update stream.
    pub fn close(self) {
        self.tx.close_channel();
    }
}

// =============================================================================
// MockConnection & MockAdapter
// =============================================================================

/// A connection whose update stream is fed by an [`UpdateSender`].
pub struct MockConnection {
    rx: Mutex<Option<mpsc::UnboundedReceiver<AdapterResult<BoxedUpdate>>>>,
    webhook: Mutex<Option<Webhook>>,
}

impl MockConnection {
    /// The webhook passed to the last [`Connection::updates`] call.
    pub fn webhook(&self) -> Option<Webhook> {
        self.webhook.lock().clone()
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn updates(&self, webhook: Option<&Webhook>) -> AdapterResult<UpdateStream> {
        *self.webhook.lock() = webhook.cloned();
        let rx = self
            .rx
            .lock()
            .take()
            .ok_or_else(|| AdapterError::stream_closed("update stream already taken"))?;
        Ok(rx.boxed())
    }
}

/// An adapter that hands out a single [`MockConnection`].
pub struct MockAdapter {
    connection: Arc<MockConnection>,
    accepted_token: Option<String>,
    refuse: Option<AdapterError>,
}

impl MockAdapter {
    /// Creates an adapter and the sender feeding its update stream.
    pub fn new() -> (Self, UpdateSender) {
        let (tx, rx) = mpsc::unbounded();
        let adapter = Self {
            connection: Arc::new(MockConnection {
                rx: Mutex::new(Some(rx)),
                webhook: Mutex::new(None),
            }),
            accepted_token: None,
            refuse: None,
        };
        (adapter, UpdateSender { tx })
    }

    /// Only accepts `token`; any other token fails with
    /// [`AdapterError::InvalidToken`].
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.accepted_token = Some(token.into());
        self
    }

    /// Makes every connection attempt fail with `error`.
    pub fn refusing(mut self, error: AdapterError) -> Self {
        self.refuse = Some(error);
        self
    }

    /// The connection handed out by [`Adapter::connect`].
    pub fn connection(&self) -> Arc<MockConnection> {
        self.connection.clone()
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    async fn connect(&self, token: &str) -> AdapterResult<BoxedConnection> {
        if let Some(err) = &self.refuse {
            return Err(err.clone());
        }
        if let Some(expected) = &self.accepted_token
            && expected != token
        {
            return Err(AdapterError::invalid_token("token rejected by mock adapter"));
        }
        Ok(self.connection.clone())
    }
}
