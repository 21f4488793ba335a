//! Handler system for the tbot router.
//!
//! A [`Handler`] consumes one [`Message`] and produces side effects, usually a
//! reply. Handlers are stored type-erased as [`BoxedHandler`] so the mux can
//! keep them in a table keyed by command path.
//!
//! Any async closure or function taking a [`Message`] is a handler, as long as
//! its output implements [`HandlerResponse`]:
//!
//! ```rust,ignore
//! // No return value
//! async fn start(message: Message) {
//!     let _ = message.reply("hi").await;
//! }
//!
//! // Return a String - it is sent as the reply
//! async fn echo(message: Message) -> String {
//!     message.payload().to_string()
//! }
//!
//! // Return a Result - errors are logged
//! async fn sum(message: Message) -> Result<String, ParseIntError> {
//!     let total: i64 = message.args().map(str::parse::<i64>).sum::<Result<_, _>>()?;
//!     Ok(total.to_string())
//! }
//! ```

use std::future::Future;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use futures::FutureExt;
use tbot_core::{BoxFuture, Message};
use tracing::error;

// ============================================================================
// HandlerResponse
// ============================================================================

/// A trait for types that can be returned from handlers.
#[async_trait]
pub trait HandlerResponse: Send + 'static {
    /// Performs the side effect of this response for `message`.
    async fn process_response(self, message: &Message);
}

/// No response needed.
#[async_trait]
impl HandlerResponse for () {
    async fn process_response(self, _message: &Message) {}
}

/// Sends the string as a reply.
#[async_trait]
impl HandlerResponse for String {
    async fn process_response(self, message: &Message) {
        // Reply failures are already logged by `Message::reply`.
        let _ = message.reply(self).await;
    }
}

#[async_trait]
impl HandlerResponse for &'static str {
    async fn process_response(self, message: &Message) {
        let _ = message.reply(self).await;
    }
}

/// On `Some`, the inner value's response is handled. On `None`, nothing is sent.
#[async_trait]
impl<T: HandlerResponse> HandlerResponse for Option<T> {
    async fn process_response(self, message: &Message) {
        if let Some(t) = self {
            t.process_response(message).await;
        }
    }
}

/// On `Ok`, the inner value's response is handled. On `Err`, the error is logged.
#[async_trait]
impl<T: HandlerResponse, E: std::fmt::Display + Send + 'static> HandlerResponse for Result<T, E> {
    async fn process_response(self, message: &Message) {
        match self {
            Ok(t) => t.process_response(message).await,
            Err(e) => {
                error!(command = message.command().unwrap_or_default(), "Handler error: {e}");
            }
        }
    }
}

// ============================================================================
// Handler Trait
// ============================================================================

/// The core trait for message handlers.
///
/// Implemented automatically for `Fn(Message) -> impl Future` closures whose
/// output implements [`HandlerResponse`]. Implement it by hand for stateful
/// handlers.
pub trait Handler: Send + Sync + 'static {
    /// Handles one message.
    fn call(&self, message: Message) -> BoxFuture<'static, ()>;
}

/// A type-erased handler that can be stored in collections.
pub type BoxedHandler = Arc<dyn Handler>;

impl<F, Fut> Handler for F
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: HandlerResponse,
{
    fn call(&self, message: Message) -> BoxFuture<'static, ()> {
        let fut = (self)(message.clone());
        async move {
            fut.await.process_response(&message).await;
        }
        .boxed()
    }
}

// ============================================================================
// IntoHandler
// ============================================================================

mod private {
    pub struct ViaHandler;
    pub struct ViaBoxed;
}

/// Conversion into a [`BoxedHandler`].
///
/// Lets registration methods accept both plain handlers and already boxed
/// ones. The type parameter only disambiguates the two implementations.
pub trait IntoHandler<T>: Send + 'static {
    /// Boxes the handler.
    fn into_handler(self) -> BoxedHandler;
}

impl<H: Handler> IntoHandler<private::ViaHandler> for H {
    fn into_handler(self) -> BoxedHandler {
        Arc::new(self)
    }
}

impl IntoHandler<private::ViaBoxed> for BoxedHandler {
    fn into_handler(self) -> BoxedHandler {
        self
    }
}

/// Boxes a handler.
pub fn into_handler<H, T>(handler: H) -> BoxedHandler
where
    H: IntoHandler<T>,
{
    handler.into_handler()
}

// ============================================================================
// Built-in handlers
// ============================================================================

/// A handler that replies with fixed text.
pub fn reply_with(text: impl Into<String>) -> BoxedHandler {
    let text: Arc<str> = Arc::from(text.into());
    Arc::new(move |message: Message| {
        let text = text.clone();
        async move {
            let _ = message.reply(&*text).await;
        }
    })
}

static NOOP: LazyLock<BoxedHandler> = LazyLock::new(|| Arc::new(|_message: Message| async {}));

/// A handler that does nothing.
///
/// Returned by the mux when nothing matches and no default is registered.
/// Every call returns the same shared instance.
pub fn noop() -> BoxedHandler {
    NOOP.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tbot_core::testing::MockUpdate;

    fn message(text: &str) -> (Arc<MockUpdate>, Message) {
        let update = Arc::new(MockUpdate::text(text));
        (update.clone(), Message::new(update))
    }

    #[tokio::test]
    async fn test_unit_handler_sends_nothing() {
        let handler = into_handler(|_m: Message| async {});
        let (update, message) = message("/start");

        handler.call(message).await;
        assert!(update.replies().is_empty());
    }

    #[tokio::test]
    async fn test_string_response_is_sent() {
        let handler = into_handler(|m: Message| async move { format!("echo: {}", m.payload()) });
        let (update, message) = message("/echo hello");

        handler.call(message).await;
        assert_eq!(update.replies(), vec!["echo: hello"]);
    }

    #[tokio::test]
    async fn test_option_and_result_responses() {
        let none = into_handler(|_m: Message| async { None::<String> });
        let err = into_handler(|_m: Message| async { Err::<String, _>("boom") });
        let ok = into_handler(|_m: Message| async { Ok::<_, String>("fine") });

        let (update, msg) = message("/x");
        none.call(msg.clone()).await;
        err.call(msg.clone()).await;
        ok.call(msg).await;

        assert_eq!(update.replies(), vec!["fine"]);
    }

    #[tokio::test]
    async fn test_struct_handler() {
        struct Counter(Arc<AtomicUsize>);

        impl Handler for Counter {
            fn call(&self, _message: Message) -> BoxFuture<'static, ()> {
                self.0.fetch_add(1, Ordering::SeqCst);
                async {}.boxed()
            }
        }

        let count = Arc::new(AtomicUsize::new(0));
        let handler = into_handler(Counter(count.clone()));
        let (_, msg) = message("/count");

        handler.call(msg.clone()).await;
        handler.call(msg).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_boxed_handler_passes_through() {
        let boxed = reply_with("hi");
        let again = into_handler(boxed.clone());
        assert!(Arc::ptr_eq(&boxed, &again));
    }

    #[tokio::test]
    async fn test_reply_with() {
        let (update, msg) = message("/start");
        reply_with("hi").call(msg).await;
        assert_eq!(update.replies(), vec!["hi"]);
    }

    #[test]
    fn test_noop_is_shared() {
        assert!(Arc::ptr_eq(&noop(), &noop()));
    }
}
