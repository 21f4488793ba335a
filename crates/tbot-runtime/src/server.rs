//! The bot server: connection, routing table, middleware and update loop.
//!
//! ```text
//!                 ┌──────────── Server ────────────┐
//! Adapter ──▶ Connection ──▶ update loop ──spawn──▶ dispatch task
//!                 │               │                   │
//!                 │               ▼                   ▼
//!                 │         Message::new       mux.match_message
//!                 │                                   │
//!                 │                          middleware(handler)
//!                 └───────────────────────────────────┘
//! ```
//!
//! Every update is handled in its own task. The loop never waits for a
//! dispatch, so a slow or hung handler only occupies its own task.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut server = Server::builder()
//!     .token(token)
//!     .build(&adapter)
//!     .await?;
//!
//! server.handle("/start", "hi", Some("Say hi"))?;
//! server.handle_default(|m: Message| async move { format!("unknown: {}", m.text()) }, None);
//! server.add_middleware(log_requests());
//!
//! server.listen_and_serve().await?;
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt, StreamExt};
use parking_lot::RwLock;
use tbot_core::{Adapter, BoxedConnection, Message, Webhook};
use tbot_framework::help::{HELP_DESCRIPTION, HELP_PATH, help_handler};
use tbot_framework::{DefaultMux, IntoHandler, Middleware, MiddlewareChain, Mux, SharedMux};
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, debug_span, error, info, warn};

use crate::config::{ConfigLoader, TbotConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

// =============================================================================
// ServerBuilder
// =============================================================================

/// Builder for [`Server`].
///
/// The adapter is passed to [`build`](Self::build) explicitly; there is no
/// process-wide adapter factory.
#[derive(Default)]
pub struct ServerBuilder {
    token: Option<String>,
    webhook: Option<Webhook>,
    mux: Option<Box<dyn Mux>>,
    drain_timeout: Option<Duration>,
}

impl ServerBuilder {
    /// Creates a builder that polls for updates with a [`DefaultMux`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder from configuration and initializes logging from it.
    pub fn from_config(config: &TbotConfig) -> Self {
        logging::init_from_config(&config.logging);

        let mut builder = Self::new();
        builder.token.clone_from(&config.token);
        builder.webhook = config.webhook.as_ref().map(|w| w.to_core());
        builder.drain_timeout = config.drain_timeout();

        info!(
            log_level = %config.logging.level,
            webhook = builder.webhook.is_some(),
            "Server configured"
        );

        builder
    }

    /// Loads configuration from the default locations, validates it, and
    /// creates a builder from it.
    pub fn load() -> RuntimeResult<Self> {
        Self::load_with(ConfigLoader::new())
    }

    /// Loads configuration with a customized loader.
    pub fn load_with(loader: ConfigLoader) -> RuntimeResult<Self> {
        let config = loader.load()?;
        validate_config(&config)?;
        Ok(Self::from_config(&config))
    }

    /// Sets the bot token.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Receives updates through a webhook instead of polling.
    pub fn webhook(mut self, url: impl Into<String>, listen_addr: impl Into<String>) -> Self {
        self.webhook = Some(Webhook::new(url, listen_addr));
        self
    }

    /// Replaces the default router.
    pub fn mux(mut self, mux: impl Mux + 'static) -> Self {
        self.mux = Some(Box::new(mux));
        self
    }

    /// Waits up to `timeout` for in-flight dispatches once serving stops.
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = Some(timeout);
        self
    }

    /// Connects through `adapter` and creates the server.
    ///
    /// Registers `/help` on the router, after any custom mux was injected.
    pub async fn build<A>(self, adapter: &A) -> RuntimeResult<Server>
    where
        A: Adapter + ?Sized,
    {
        let token = self
            .token
            .filter(|t| !t.trim().is_empty())
            .ok_or(RuntimeError::MissingToken)?;

        let connection = adapter.connect(&token).await.inspect_err(|e| {
            error!(error = %e, "Failed to connect");
        })?;

        let mux: SharedMux = Arc::new(RwLock::new(
            self.mux
                .unwrap_or_else(|| Box::new(DefaultMux::new()) as Box<dyn Mux>),
        ));
        mux.write().handle_func(
            HELP_PATH,
            help_handler(Arc::downgrade(&mux)),
            Some(HELP_DESCRIPTION),
        )?;

        info!(webhook = self.webhook.is_some(), "Server created");

        Ok(Server {
            connection,
            mux,
            middleware: MiddlewareChain::new(),
            webhook: self.webhook,
            drain_timeout: self.drain_timeout,
        })
    }
}

// =============================================================================
// Server
// =============================================================================

/// A connected bot server.
///
/// Created by [`ServerBuilder::build`] and consumed by
/// [`listen_and_serve`](Self::listen_and_serve); middleware can only be added
/// before serving starts.
pub struct Server {
    connection: BoxedConnection,
    mux: SharedMux,
    middleware: MiddlewareChain,
    webhook: Option<Webhook>,
    drain_timeout: Option<Duration>,
}

impl Server {
    /// Creates a server builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Connects with `token` and default settings.
    pub async fn new<A>(adapter: &A, token: impl Into<String>) -> RuntimeResult<Self>
    where
        A: Adapter + ?Sized,
    {
        ServerBuilder::new().token(token).build(adapter).await
    }

    /// Appends a middleware. The first added is the outermost.
    pub fn add_middleware(&mut self, middleware: impl Middleware) {
        self.middleware.push(middleware);
    }

    /// Registers `handler` for the exact command `path`.
    pub fn handle_func<H, T>(
        &self,
        path: &str,
        handler: H,
        description: Option<&str>,
    ) -> RuntimeResult<()>
    where
        H: IntoHandler<T>,
    {
        self.mux
            .write()
            .handle_func(path, handler.into_handler(), description)?;
        Ok(())
    }

    /// Registers a route that replies with fixed text.
    pub fn handle(
        &self,
        path: &str,
        reply: impl Into<String>,
        description: Option<&str>,
    ) -> RuntimeResult<()> {
        self.handle_func(path, tbot_framework::reply_with(reply), description)
    }

    /// Sets the handler for messages carrying an attachment.
    pub fn handle_file<H, T>(&self, handler: H, description: Option<&str>)
    where
        H: IntoHandler<T>,
    {
        self.mux
            .write()
            .handle_file(handler.into_handler(), description);
    }

    /// Sets the handler for messages no route matches.
    pub fn handle_default<H, T>(&self, handler: H, description: Option<&str>)
    where
        H: IntoHandler<T>,
    {
        self.mux
            .write()
            .handle_default(handler.into_handler(), description);
    }

    /// The router.
    pub fn mux(&self) -> &SharedMux {
        &self.mux
    }

    /// The webhook settings, if serving through a webhook.
    pub fn webhook(&self) -> Option<&Webhook> {
        self.webhook.as_ref()
    }

    /// Serves updates until the stream ends.
    ///
    /// Returns `Ok(())` when the stream ends and the error when it fails.
    pub async fn listen_and_serve(self) -> RuntimeResult<()> {
        self.listen_and_serve_until(std::future::pending()).await
    }

    /// Serves updates until the stream ends or `shutdown` completes.
    ///
    /// ```rust,ignore
    /// server
    ///     .listen_and_serve_until(async {
    ///         let _ = tokio::signal::ctrl_c().await;
    ///     })
    ///     .await?;
    /// ```
    pub async fn listen_and_serve_until<F>(self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        let Self {
            connection,
            mux,
            middleware,
            webhook,
            drain_timeout,
        } = self;

        let mut updates = connection.updates(webhook.as_ref()).await?;
        let chain = Arc::new(middleware);
        let tracker = TaskTracker::new();

        match &webhook {
            Some(webhook) => info!(
                url = %webhook.url,
                listen_addr = %webhook.listen_addr,
                "Serving updates from webhook"
            ),
            None => info!("Serving updates by polling"),
        }

        let mut shutdown = std::pin::pin!(shutdown);
        let result = loop {
            let item = tokio::select! {
                () = &mut shutdown => {
                    info!("Shutdown requested");
                    break Ok(());
                }
                item = updates.next() => item,
            };

            match item {
                Some(Ok(update)) => {
                    let message = Message::new(update);
                    let span = debug_span!("dispatch", command = message.command().unwrap_or_default());
                    tracker.spawn(dispatch(mux.clone(), chain.clone(), message).instrument(span));
                }
                Some(Err(e)) => {
                    error!(error = %e, "Update stream failed");
                    break Err(RuntimeError::from(e));
                }
                None => {
                    info!("Update stream ended");
                    break Ok(());
                }
            }
        };

        tracker.close();
        if let Some(timeout) = drain_timeout {
            debug!(in_flight = tracker.len(), "Draining dispatches");
            if tokio::time::timeout(timeout, tracker.wait()).await.is_err() {
                warn!(in_flight = tracker.len(), "Drain timeout elapsed");
            }
        }

        result
    }
}

/// Resolves and runs the handler for one message.
///
/// A panic anywhere in routing, middleware or the handler is logged and
/// contained to this dispatch.
async fn dispatch(mux: SharedMux, chain: Arc<MiddlewareChain>, message: Message) {
    let outcome = AssertUnwindSafe(async move {
        let handler = mux.read().match_message(&message);
        chain.apply(&handler).call(message).await;
    })
    .catch_unwind()
    .await;

    if let Err(panic) = outcome {
        error!(panic = panic_message(panic.as_ref()), "Handler panicked");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tbot_core::testing::{MockAdapter, MockUpdate};
    use tbot_core::{AdapterError, Attachment};
    use tbot_framework::{BoxedHandler, RouteInfo, from_fn};

    const DRAIN: Duration = Duration::from_secs(5);

    async fn server(adapter: &MockAdapter) -> Server {
        Server::builder()
            .token("test-token")
            .drain_timeout(DRAIN)
            .build(adapter)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_start_and_default_replies() {
        let (adapter, updates) = MockAdapter::new();
        let server = server(&adapter).await;
        server.handle("/start", "hi", None).unwrap();
        server.handle_default(tbot_framework::reply_with("unknown"), None);

        let start = updates.send_text("/start");
        let unknown = updates.send_text("/xyz");
        let empty = updates.send_text("");
        updates.close();

        tokio_test::assert_ok!(server.listen_and_serve().await);
        assert_eq!(start.replies(), vec!["hi"]);
        assert_eq!(unknown.replies(), vec!["unknown"]);
        assert_eq!(empty.replies(), vec!["unknown"]);
    }

    #[tokio::test]
    async fn test_unmatched_without_default_is_ignored() {
        let (adapter, updates) = MockAdapter::new();
        let server = server(&adapter).await;
        server.handle("/start", "hi", None).unwrap();

        let unknown = updates.send_text("/xyz");
        updates.close();

        tokio_test::assert_ok!(server.listen_and_serve().await);
        assert!(unknown.replies().is_empty());
    }

    #[tokio::test]
    async fn test_help_reflects_registrations_before_serving() {
        let (adapter, updates) = MockAdapter::new();
        let server = server(&adapter).await;
        server.handle("/start", "hi", Some("Say hi")).unwrap();
        server.handle("/quiet", "...", None).unwrap();
        server.handle_file(|_m: Message| async {}, Some("Send a document"));

        let help = updates.send_text("/help");
        updates.close();

        tokio_test::assert_ok!(server.listen_and_serve().await);
        assert_eq!(
            help.replies(),
            vec!["/help - Show this help\n/start - Say hi\nFiles - Send a document"]
        );
    }

    #[tokio::test]
    async fn test_file_handler_wins_over_text() {
        let (adapter, updates) = MockAdapter::new();
        let server = server(&adapter).await;
        server.handle("/start", "hi", None).unwrap();
        server.handle_file(
            |m: Message| async move {
                m.attachment()
                    .map(|a| format!("got {}", a.file_id))
                    .unwrap_or_default()
            },
            None,
        );

        let file = updates.send(MockUpdate::file("/start", Attachment::new("doc-1")));
        updates.close();

        tokio_test::assert_ok!(server.listen_and_serve().await);
        assert_eq!(file.replies(), vec!["got doc-1"]);
    }

    #[tokio::test]
    async fn test_middleware_order() {
        let (adapter, updates) = MockAdapter::new();
        let mut server = server(&adapter).await;
        let trace = Arc::new(parking_lot::Mutex::new(Vec::<String>::new()));

        for name in ["m1", "m2"] {
            let trace = trace.clone();
            server.add_middleware(from_fn(move |message: Message, next: BoxedHandler| {
                let trace = trace.clone();
                async move {
                    trace.lock().push(format!("{name}-pre"));
                    next.call(message).await;
                    trace.lock().push(format!("{name}-post"));
                }
            }));
        }
        let seen = trace.clone();
        server
            .handle_func(
                "/start",
                move |_m: Message| {
                    let seen = seen.clone();
                    async move { seen.lock().push("handler".to_string()) }
                },
                None,
            )
            .unwrap();

        updates.send_text("/start");
        updates.close();

        tokio_test::assert_ok!(server.listen_and_serve().await);
        assert_eq!(
            *trace.lock(),
            vec!["m1-pre", "m2-pre", "handler", "m2-post", "m1-post"]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_dispatch_invokes_each_once() {
        const N: usize = 200;

        let (adapter, updates) = MockAdapter::new();
        let server = server(&adapter).await;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        server
            .handle_func(
                "/count",
                move |_m: Message| {
                    let counter = counter.clone();
                    async move {
                        tokio::task::yield_now().await;
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                },
                None,
            )
            .unwrap();

        for _ in 0..N {
            updates.send_text("/count");
        }
        updates.close();

        tokio_test::assert_ok!(server.listen_and_serve().await);
        assert_eq!(calls.load(Ordering::SeqCst), N);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_isolated() {
        let (adapter, updates) = MockAdapter::new();
        let server = server(&adapter).await;
        server
            .handle_func(
                "/panic",
                |m: Message| async move {
                    if m.command() == Some("/panic") {
                        panic!("handler exploded");
                    }
                },
                None,
            )
            .unwrap();
        server.handle("/start", "hi", None).unwrap();

        updates.send_text("/panic");
        let after = updates.send_text("/start");
        updates.close();

        tokio_test::assert_ok!(server.listen_and_serve().await);
        assert_eq!(after.replies(), vec!["hi"]);
    }

    #[tokio::test]
    async fn test_stream_error_is_returned() {
        let (adapter, updates) = MockAdapter::new();
        let server = server(&adapter).await;
        server.handle("/start", "hi", None).unwrap();

        let before = updates.send_text("/start");
        updates.fail(AdapterError::stream_closed("connection reset"));

        let result = server.listen_and_serve().await;
        assert!(matches!(
            result,
            Err(RuntimeError::Adapter(AdapterError::StreamClosed { .. }))
        ));
        assert_eq!(before.replies(), vec!["hi"]);
    }

    #[tokio::test]
    async fn test_slow_handlers_drain_before_return() {
        let (adapter, updates) = MockAdapter::new();
        let server = server(&adapter).await;
        server
            .handle_func(
                "/slow",
                |_m: Message| async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    "done"
                },
                None,
            )
            .unwrap();

        let slow = updates.send_text("/slow");
        updates.close();

        tokio_test::assert_ok!(server.listen_and_serve().await);
        assert_eq!(slow.replies(), vec!["done"]);
    }

    #[tokio::test]
    async fn test_hung_handler_does_not_block_later_updates() {
        let (adapter, updates) = MockAdapter::new();
        let server = server(&adapter).await;
        let (release, released) = futures::channel::oneshot::channel::<()>();
        let release = Arc::new(parking_lot::Mutex::new(Some(release)));
        let released = Arc::new(parking_lot::Mutex::new(Some(released)));

        server
            .handle_func(
                "/hang",
                move |_m: Message| {
                    let released = released.lock().take();
                    async move {
                        match released {
                            Some(rx) => match rx.await {
                                Ok(()) => "released",
                                Err(_) => "not released",
                            },
                            None => "not released",
                        }
                    }
                },
                None,
            )
            .unwrap();
        server
            .handle_func(
                "/go",
                move |_m: Message| {
                    let release = release.lock().take();
                    async move {
                        match release.map(|tx| tx.send(())) {
                            Some(Ok(())) => "sent",
                            _ => "not sent",
                        }
                    }
                },
                None,
            )
            .unwrap();

        let hang = updates.send_text("/hang");
        let go = updates.send_text("/go");
        updates.close();

        tokio_test::assert_ok!(server.listen_and_serve().await);
        assert_eq!(go.replies(), vec!["sent"]);
        assert_eq!(hang.replies(), vec!["released"]);
    }

    #[tokio::test]
    async fn test_shutdown_future_stops_serving() {
        let (adapter, _updates) = MockAdapter::new();
        let server = server(&adapter).await;

        tokio_test::assert_ok!(server.listen_and_serve_until(async {}).await);
    }

    #[tokio::test]
    async fn test_build_requires_token() {
        let (adapter, _updates) = MockAdapter::new();

        let missing = Server::builder().build(&adapter).await;
        assert!(matches!(missing, Err(RuntimeError::MissingToken)));

        let blank = Server::new(&adapter, "  ").await;
        assert!(matches!(blank, Err(RuntimeError::MissingToken)));
    }

    #[tokio::test]
    async fn test_build_fails_on_rejected_token() {
        let (adapter, _updates) = MockAdapter::new();
        let adapter = adapter.with_token("good");

        let result = Server::new(&adapter, "bad").await;
        assert!(matches!(
            result,
            Err(RuntimeError::Adapter(AdapterError::InvalidToken { .. }))
        ));
        assert!(Server::new(&adapter, "good").await.is_ok());
    }

    #[tokio::test]
    async fn test_build_fails_when_adapter_refuses() {
        let (adapter, _updates) = MockAdapter::new();
        let adapter = adapter.refusing(AdapterError::connection_failed("unreachable"));

        let result = Server::new(&adapter, "token").await;
        assert!(matches!(
            result,
            Err(RuntimeError::Adapter(AdapterError::ConnectionFailed { .. }))
        ));
    }

    #[tokio::test]
    async fn test_webhook_is_passed_to_connection() {
        let (adapter, updates) = MockAdapter::new();
        let server = Server::builder()
            .token("t")
            .webhook("https://example.com/hook", "0.0.0.0:8443")
            .build(&adapter)
            .await
            .unwrap();
        updates.close();

        tokio_test::assert_ok!(server.listen_and_serve().await);
        assert_eq!(
            adapter.connection().webhook(),
            Some(Webhook::new("https://example.com/hook", "0.0.0.0:8443"))
        );
    }

    #[tokio::test]
    async fn test_polling_passes_no_webhook() {
        let (adapter, updates) = MockAdapter::new();
        let server = server(&adapter).await;
        updates.close();

        tokio_test::assert_ok!(server.listen_and_serve().await);
        assert_eq!(adapter.connection().webhook(), None);
    }

    #[tokio::test]
    async fn test_invalid_path_is_rejected() {
        let (adapter, _updates) = MockAdapter::new();
        let server = server(&adapter).await;

        assert!(matches!(
            server.handle("start", "hi", None),
            Err(RuntimeError::Mux(_))
        ));
    }

    /// Wraps the default router and counts lookups.
    #[derive(Default)]
    struct CountingMux {
        inner: DefaultMux,
        lookups: Arc<AtomicUsize>,
    }

    impl Mux for CountingMux {
        fn handle_func(
            &mut self,
            path: &str,
            handler: BoxedHandler,
            description: Option<&str>,
        ) -> tbot_framework::MuxResult<()> {
            self.inner.handle_func(path, handler, description)
        }

        fn handle_file(&mut self, handler: BoxedHandler, description: Option<&str>) {
            self.inner.handle_file(handler, description);
        }

        fn handle_default(&mut self, handler: BoxedHandler, description: Option<&str>) {
            self.inner.handle_default(handler, description);
        }

        fn match_message(&self, message: &Message) -> BoxedHandler {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.match_message(message)
        }

        fn routes(&self) -> Vec<RouteInfo> {
            self.inner.routes()
        }

        fn file_description(&self) -> Option<String> {
            self.inner.file_description()
        }
    }

    #[tokio::test]
    async fn test_custom_mux_gets_help_route() {
        let (adapter, updates) = MockAdapter::new();
        let mux = CountingMux::default();
        let lookups = mux.lookups.clone();
        let server = Server::builder()
            .token("t")
            .mux(mux)
            .drain_timeout(DRAIN)
            .build(&adapter)
            .await
            .unwrap();

        assert_eq!(server.mux().read().routes().len(), 1);

        let help = updates.send_text("/help");
        updates.close();

        tokio_test::assert_ok!(server.listen_and_serve().await);
        assert_eq!(help.replies(), vec!["/help - Show this help"]);
        assert_eq!(lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_from_config() {
        let config = TbotConfig {
            token: Some("from-config".into()),
            webhook: Some(crate::config::WebhookConfig {
                url: "https://example.com/bot".into(),
                listen_addr: "127.0.0.1:8080".into(),
            }),
            drain_timeout_ms: Some(100),
            ..Default::default()
        };

        let (adapter, _updates) = MockAdapter::new();
        let adapter = adapter.with_token("from-config");
        let server = ServerBuilder::from_config(&config)
            .build(&adapter)
            .await
            .unwrap();

        assert_eq!(
            server.webhook(),
            Some(&Webhook::new("https://example.com/bot", "127.0.0.1:8080"))
        );
        assert_eq!(server.drain_timeout, Some(Duration::from_millis(100)));
    }
}
