//! Tower integration.
//!
//! [`HandlerService`] is the `tower::Service<Message>` view of a
//! [`BoxedHandler`]. [`ServiceHandler`] goes the other way and runs any such
//! service as a handler. Together they let tower layers wrap handlers; see
//! [`from_layer`](crate::middleware::from_layer).

use std::task::{Context, Poll};

use futures::FutureExt;
use tbot_core::{BoxFuture, Message};
use tower::util::ServiceExt;
use tower::{BoxError, Service};
use tracing::warn;

use crate::error::MessageSkipped;
use crate::handler::{BoxedHandler, Handler};

// ============================================================================
// HandlerService
// ============================================================================

/// A tower [`Service`] that calls a single handler.
///
/// Always ready; never fails.
#[derive(Clone)]
pub struct HandlerService {
    handler: BoxedHandler,
}

impl HandlerService {
    /// Wraps a handler.
    pub fn new(handler: BoxedHandler) -> Self {
        Self { handler }
    }
}

impl Service<Message> for HandlerService {
    type Response = ();
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<(), Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, message: Message) -> Self::Future {
        let handler = self.handler.clone();
        async move {
            handler.call(message).await;
            Ok(())
        }
        .boxed()
    }
}

// ============================================================================
// ServiceHandler
// ============================================================================

/// Runs a tower service as a [`Handler`].
///
/// Each call clones the service and drives it with `oneshot`. Service errors
/// are logged at `warn` and dropped; [`MessageSkipped`] is dropped silently.
#[derive(Clone)]
pub struct ServiceHandler<S> {
    service: S,
}

impl<S> ServiceHandler<S> {
    /// Wraps a service.
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

impl<S> Handler for ServiceHandler<S>
where
    S: Service<Message, Response = ()> + Clone + Send + Sync + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
{
    fn call(&self, message: Message) -> BoxFuture<'static, ()> {
        let service = self.service.clone();
        let command = message.command().map(str::to_owned);
        async move {
            if let Err(e) = service.oneshot(message).await {
                let e: BoxError = e.into();
                if e.is::<MessageSkipped>() {
                    return;
                }
                warn!(
                    command = command.as_deref().unwrap_or_default(),
                    error = %e,
                    "Service rejected message"
                );
            }
        }
        .boxed()
    }
}
