//! The built-in `/help` handler.
//!
//! Lists every route registered with a description, one per line:
//!
//! ```text
//! /help - Show this help
//! /start - Say hi
//! Files - Upload a document
//! ```

use std::sync::Weak;

use parking_lot::RwLock;
use tbot_core::Message;

use crate::handler::BoxedHandler;
use crate::mux::Mux;

/// The path the help handler is registered under.
pub const HELP_PATH: &str = "/help";

/// The description the help route is registered with.
pub const HELP_DESCRIPTION: &str = "Show this help";

/// Reply sent when no route has a description.
pub const EMPTY_HELP: &str = "No commands available";

/// Renders the help listing for `mux`.
pub fn render_help(mux: &dyn Mux) -> String {
    let mut lines: Vec<String> = mux
        .routes()
        .into_iter()
        .filter_map(|route| {
            route
                .description
                .map(|description| format!("{} - {}", route.path, description))
        })
        .collect();

    if let Some(description) = mux.file_description() {
        lines.push(format!("Files - {description}"));
    }

    if lines.is_empty() {
        EMPTY_HELP.to_string()
    } else {
        lines.join("\n")
    }
}

/// Builds the help handler.
///
/// The mux is read on every invocation, so routes registered after the handler
/// was created still show up. A dropped mux yields no reply.
pub fn help_handler(mux: Weak<RwLock<Box<dyn Mux>>>) -> BoxedHandler {
    crate::handler::into_handler(move |message: Message| {
        // Render before awaiting; the lock is never held across the reply.
        let listing = mux.upgrade().map(|mux| render_help(&**mux.read()));
        async move {
            if let Some(listing) = listing {
                let _ = message.reply(listing).await;
            }
        }
    })
}
