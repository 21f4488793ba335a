//! Command routing.
//!
//! A [`Mux`] maps command paths to handlers. Matching is an exact string
//! comparison on the first whitespace-delimited token of the message text:
//!
//! | Message                      | Resolved handler                         |
//! |------------------------------|------------------------------------------|
//! | carries an attachment        | file handler, else default, else no-op   |
//! | command token registered     | that route's handler                     |
//! | unknown command / plain text | default handler, else no-op              |
//!
//! [`DefaultMux`] is the stock implementation. Servers accept any `Mux`, so the
//! routing strategy can be replaced wholesale.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tbot_core::Message;
use tracing::debug;

use crate::error::{MuxError, MuxResult};
use crate::handler::{BoxedHandler, noop};

// ============================================================================
// Mux Trait
// ============================================================================

/// Maps messages to handlers.
pub trait Mux: Send + Sync {
    /// Registers `handler` for the exact command `path`.
    ///
    /// Registering the same path again replaces the earlier route.
    fn handle_func(
        &mut self,
        path: &str,
        handler: BoxedHandler,
        description: Option<&str>,
    ) -> MuxResult<()>;

    /// Sets the handler for messages carrying an attachment.
    fn handle_file(&mut self, handler: BoxedHandler, description: Option<&str>);

    /// Sets the handler for messages no route matches.
    fn handle_default(&mut self, handler: BoxedHandler, description: Option<&str>);

    /// Resolves the handler for `message`. Never fails: a miss yields the
    /// default handler or a no-op.
    fn match_message(&self, message: &Message) -> BoxedHandler;

    /// Registered routes, ordered by path.
    fn routes(&self) -> Vec<RouteInfo>;

    /// Description of the file handler, if one was given.
    fn file_description(&self) -> Option<String>;
}

/// A mux shared between the server and the help handler.
pub type SharedMux = Arc<RwLock<Box<dyn Mux>>>;

/// Wraps a mux for sharing.
pub fn shared(mux: impl Mux + 'static) -> SharedMux {
    Arc::new(RwLock::new(Box::new(mux)))
}

/// A registered route as reported by [`Mux::routes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    /// The command path.
    pub path: String,
    /// Description shown by `/help`.
    pub description: Option<String>,
}

/// Returns an error unless `path` is non-empty and starts with `/`.
pub fn validate_path(path: &str) -> MuxResult<()> {
    if path.starts_with('/') {
        Ok(())
    } else {
        Err(MuxError::invalid_path(path))
    }
}

// ============================================================================
// DefaultMux
// ============================================================================

struct Route {
    handler: BoxedHandler,
    description: Option<String>,
}

impl Route {
    fn new(handler: BoxedHandler, description: Option<&str>) -> Self {
        Self {
            handler,
            description: description.filter(|d| !d.is_empty()).map(str::to_owned),
        }
    }
}

/// The stock router: an exact-match table plus file and default handlers.
#[derive(Default)]
pub struct DefaultMux {
    routes: BTreeMap<String, Route>,
    default: Option<Route>,
    file: Option<Route>,
}

impl DefaultMux {
    /// Creates an empty mux.
    pub fn new() -> Self {
        Self::default()
    }

    fn fallback(&self) -> BoxedHandler {
        self.default
            .as_ref()
            .map(|route| route.handler.clone())
            .unwrap_or_else(noop)
    }
}

impl Mux for DefaultMux {
    fn handle_func(
        &mut self,
        path: &str,
        handler: BoxedHandler,
        description: Option<&str>,
    ) -> MuxResult<()> {
        validate_path(path)?;
        if self
            .routes
            .insert(path.to_owned(), Route::new(handler, description))
            .is_some()
        {
            debug!(path, "Replaced existing route");
        }
        Ok(())
    }

    fn handle_file(&mut self, handler: BoxedHandler, description: Option<&str>) {
        self.file = Some(Route::new(handler, description));
    }

    fn handle_default(&mut self, handler: BoxedHandler, description: Option<&str>) {
        self.default = Some(Route::new(handler, description));
    }

    fn match_message(&self, message: &Message) -> BoxedHandler {
        if message.has_attachment() {
            return match &self.file {
                Some(route) => route.handler.clone(),
                None => self.fallback(),
            };
        }

        message
            .command()
            .and_then(|command| self.routes.get(command))
            .map(|route| route.handler.clone())
            .unwrap_or_else(|| self.fallback())
    }

    fn routes(&self) -> Vec<RouteInfo> {
        self.routes
            .iter()
            .map(|(path, route)| RouteInfo {
                path: path.clone(),
                description: route.description.clone(),
            })
            .collect()
    }

    fn file_description(&self) -> Option<String> {
        self.file.as_ref().and_then(|route| route.description.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::reply_with;
    use tbot_core::Attachment;
    use tbot_core::testing::MockUpdate;

    async fn dispatch(mux: &DefaultMux, update: MockUpdate) -> Vec<String> {
        let update = Arc::new(update);
        mux.match_message(&Message::new(update.clone()))
            .call(Message::new(update.clone()))
            .await;
        update.replies()
    }

    fn example_mux() -> DefaultMux {
        let mut mux = DefaultMux::new();
        mux.handle_func("/start", reply_with("hi"), None).unwrap();
        mux.handle_default(reply_with("unknown"), None);
        mux
    }

    #[tokio::test]
    async fn test_exact_match_and_default() {
        let mux = example_mux();

        assert_eq!(dispatch(&mux, MockUpdate::text("/start")).await, vec!["hi"]);
        assert_eq!(dispatch(&mux, MockUpdate::text("/xyz")).await, vec!["unknown"]);
        assert_eq!(dispatch(&mux, MockUpdate::text("")).await, vec!["unknown"]);
    }

    #[tokio::test]
    async fn test_only_matched_handler_runs() {
        let mut mux = DefaultMux::new();
        mux.handle_func("/a", reply_with("a"), None).unwrap();
        mux.handle_func("/b", reply_with("b"), None).unwrap();
        mux.handle_func("/ab", reply_with("ab"), None).unwrap();

        assert_eq!(dispatch(&mux, MockUpdate::text("/a")).await, vec!["a"]);
        assert_eq!(dispatch(&mux, MockUpdate::text("/ab x")).await, vec!["ab"]);
        assert!(dispatch(&mux, MockUpdate::text("/a/b")).await.is_empty());
    }

    #[tokio::test]
    async fn test_command_with_payload_matches() {
        let mux = example_mux();
        assert_eq!(
            dispatch(&mux, MockUpdate::text("  /start now please")).await,
            vec!["hi"]
        );
    }

    #[tokio::test]
    async fn test_plain_text_goes_to_default() {
        let mux = example_mux();
        assert_eq!(
            dispatch(&mux, MockUpdate::text("hello /start")).await,
            vec!["unknown"]
        );
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let mut mux = DefaultMux::new();
        mux.handle_func("/start", reply_with("first"), Some("one"))
            .unwrap();
        mux.handle_func("/start", reply_with("second"), Some("two"))
            .unwrap();

        assert_eq!(dispatch(&mux, MockUpdate::text("/start")).await, vec!["second"]);
        assert_eq!(
            mux.routes(),
            vec![RouteInfo {
                path: "/start".into(),
                description: Some("two".into()),
            }]
        );
    }

    #[tokio::test]
    async fn test_miss_without_default_is_noop() {
        let mut mux = DefaultMux::new();
        mux.handle_func("/start", reply_with("hi"), None).unwrap();

        let update = MockUpdate::text("/xyz");
        let handler = mux.match_message(&Message::new(Arc::new(MockUpdate::text("/xyz"))));
        assert!(Arc::ptr_eq(&handler, &noop()));
        assert!(dispatch(&mux, update).await.is_empty());
    }

    #[tokio::test]
    async fn test_attachment_goes_to_file_handler() {
        let mut mux = example_mux();
        mux.handle_file(reply_with("file"), Some("Upload a file"));

        let file = || MockUpdate::file("/start", Attachment::new("f1"));
        assert_eq!(dispatch(&mux, file()).await, vec!["file"]);
        assert_eq!(mux.file_description().as_deref(), Some("Upload a file"));
    }

    #[tokio::test]
    async fn test_attachment_without_file_handler_uses_default() {
        let mux = example_mux();
        let update = MockUpdate::file("/start", Attachment::new("f1"));
        assert_eq!(dispatch(&mux, update).await, vec!["unknown"]);
    }

    #[test]
    fn test_invalid_paths_are_rejected() {
        let mut mux = DefaultMux::new();

        assert_eq!(
            mux.handle_func("", reply_with("x"), None),
            Err(MuxError::invalid_path(""))
        );
        assert!(mux.handle_func("start", reply_with("x"), None).is_err());
        assert!(mux.routes().is_empty());
    }

    #[test]
    fn test_routes_are_sorted_and_empty_descriptions_dropped() {
        let mut mux = DefaultMux::new();
        mux.handle_func("/zeta", reply_with("z"), Some("Last")).unwrap();
        mux.handle_func("/alpha", reply_with("a"), Some("")).unwrap();
        mux.handle_func("/mid", reply_with("m"), Some("Middle")).unwrap();

        let routes = mux.routes();
        let paths: Vec<_> = routes.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/alpha", "/mid", "/zeta"]);
        assert_eq!(routes[0].description, None);
        assert_eq!(routes[1].description.as_deref(), Some("Middle"));
    }
}
