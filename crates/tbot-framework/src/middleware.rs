//! Middleware composed around handler invocation.
//!
//! A [`Middleware`] transforms a handler into another handler. Registering
//! `[m1, m2, ..., mn]` and dispatching to `h` runs `m1(m2(...mn(h)))`: the first
//! registered middleware is the outermost one.
//!
//! ```text
//! m1-pre ─▶ m2-pre ─▶ handler ─▶ m2-post ─▶ m1-post
//! ```
//!
//! Middleware can be written three ways:
//!
//! ```rust,ignore
//! // A plain handler transformer
//! chain.push(|next: BoxedHandler| next);
//!
//! // An async function receiving the message and the inner handler
//! chain.push(from_fn(|message: Message, next: BoxedHandler| async move {
//!     if message.command() != Some("/admin") {
//!         next.call(message).await;
//!     }
//! }));
//!
//! // Any tower layer
//! chain.push(from_layer(ConcurrencyLimitLayer::new(8)));
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use parking_lot::RwLock;
use tbot_core::{BoxFuture, Message};
use tower::filter::{FilterLayer, Predicate};
use tower::{BoxError, Layer, Service};
use tracing::{Instrument, debug, info_span};

use crate::error::MessageSkipped;
use crate::handler::{BoxedHandler, Handler};
use crate::service::{HandlerService, ServiceHandler};

/// Upper bound on cached compositions before the cache is reset.
const MAX_CACHED_COMPOSITIONS: usize = 1024;

// ============================================================================
// Middleware Trait
// ============================================================================

/// Wraps a handler with cross-cutting behavior.
///
/// A middleware may short-circuit by never calling `next`.
pub trait Middleware: Send + Sync + 'static {
    /// Returns a handler that runs around `next`.
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler;
}

impl<F> Middleware for F
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        (self)(next)
    }
}

// ============================================================================
// from_fn
// ============================================================================

/// Builds a middleware from an async function of the message and the inner
/// handler.
pub fn from_fn<F, Fut>(f: F) -> FnMiddleware<F>
where
    F: Fn(Message, BoxedHandler) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    FnMiddleware { f: Arc::new(f) }
}

/// Middleware created by [`from_fn`].
pub struct FnMiddleware<F> {
    f: Arc<F>,
}

impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(Message, BoxedHandler) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(FnHandler {
            f: self.f.clone(),
            next,
        })
    }
}

struct FnHandler<F> {
    f: Arc<F>,
    next: BoxedHandler,
}

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Message, BoxedHandler) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn call(&self, message: Message) -> BoxFuture<'static, ()> {
        (self.f)(message, self.next.clone()).boxed()
    }
}

// ============================================================================
// from_layer
// ============================================================================

/// Adapts a tower [`Layer`] into a middleware.
///
/// The layer wraps a [`HandlerService`] around the inner handler. Errors
/// produced by the resulting service are logged and dropped.
pub fn from_layer<L>(layer: L) -> LayerMiddleware<L>
where
    L: Layer<HandlerService> + Send + Sync + 'static,
    L::Service: Service<Message, Response = ()> + Clone + Send + Sync + 'static,
    <L::Service as Service<Message>>::Error: Into<BoxError>,
    <L::Service as Service<Message>>::Future: Send + 'static,
{
    LayerMiddleware { layer }
}

/// Middleware created by [`from_layer`].
#[derive(Clone)]
pub struct LayerMiddleware<L> {
    layer: L,
}

impl<L> Middleware for LayerMiddleware<L>
where
    L: Layer<HandlerService> + Send + Sync + 'static,
    L::Service: Service<Message, Response = ()> + Clone + Send + Sync + 'static,
    <L::Service as Service<Message>>::Error: Into<BoxError>,
    <L::Service as Service<Message>>::Future: Send + 'static,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let service = self.layer.layer(HandlerService::new(next));
        Arc::new(ServiceHandler::new(service))
    }
}

// ============================================================================
// Built-in middleware
// ============================================================================

/// A [`Predicate`] over messages backed by a synchronous closure.
///
/// Rejects with [`MessageSkipped`] when the closure returns `false`.
#[derive(Clone)]
pub struct MessagePredicate(Arc<dyn Fn(&Message) -> bool + Send + Sync>);

impl MessagePredicate {
    /// Creates a predicate from a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }
}

impl Predicate<Message> for MessagePredicate {
    type Request = Message;

    fn check(&mut self, request: Message) -> Result<Message, BoxError> {
        if (self.0)(&request) {
            Ok(request)
        } else {
            Err(Box::new(MessageSkipped))
        }
    }
}

/// Only lets messages through for which `predicate` returns `true`.
///
/// Rejected messages never reach the inner handler.
pub fn filter<F>(predicate: F) -> LayerMiddleware<FilterLayer<MessagePredicate>>
where
    F: Fn(&Message) -> bool + Send + Sync + 'static,
{
    from_layer(FilterLayer::new(MessagePredicate::new(predicate)))
}

/// Logs every dispatch inside a `request` span, with its elapsed time.
pub fn log_requests() -> impl Middleware {
    from_fn(|message: Message, next: BoxedHandler| async move {
        let command = message.command().unwrap_or_default().to_owned();
        let has_attachment = message.has_attachment();
        let span = info_span!("request", command = %command, has_attachment);

        async move {
            let start = Instant::now();
            next.call(message).await;
            debug!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Message handled"
            );
        }
        .instrument(span)
        .await;
    })
}

// ============================================================================
// MiddlewareChain
// ============================================================================

/// An ordered, append-only list of middleware.
///
/// Compositions are cached per resolved handler, so a route's middleware stack
/// is built once and reused by every later dispatch to that route.
#[derive(Default)]
pub struct MiddlewareChain {
    layers: Vec<Arc<dyn Middleware>>,
    // Keyed by handler address; the inner handler is kept alive so the key stays unique.
    cache: RwLock<HashMap<usize, (BoxedHandler, BoxedHandler)>>,
}

impl MiddlewareChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware. It runs inside all previously pushed ones.
    pub fn push(&mut self, middleware: impl Middleware) {
        self.layers.push(Arc::new(middleware));
        self.cache.get_mut().clear();
    }

    /// Number of middleware in the chain.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Returns true when no middleware is registered.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Composes the chain around `handler` without caching.
    pub fn compose(&self, handler: BoxedHandler) -> BoxedHandler {
        self.layers
            .iter()
            .rev()
            .fold(handler, |inner, middleware| middleware.wrap(inner))
    }

    /// Composes the chain around `handler`, reusing an earlier composition of
    /// the same handler.
    pub fn apply(&self, handler: &BoxedHandler) -> BoxedHandler {
        if self.layers.is_empty() {
            return handler.clone();
        }

        let key = Arc::as_ptr(handler) as *const () as usize;
        if let Some((_, composed)) = self.cache.read().get(&key) {
            return composed.clone();
        }

        let composed = self.compose(handler.clone());
        let mut cache = self.cache.write();
        if cache.len() >= MAX_CACHED_COMPOSITIONS {
            cache.clear();
        }
        cache
            .entry(key)
            .or_insert_with(|| (handler.clone(), composed))
            .1
            .clone()
    }
}
