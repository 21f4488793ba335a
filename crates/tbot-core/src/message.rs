//! The per-dispatch message wrapper.
//!
//! A [`Message`] wraps one inbound [`Update`](crate::adapter::Update) and
//! exposes the pieces the router and handlers care about:
//!
//! ```text
//! "  /echo   hello world "
//!    ^^^^^   ^^^^^^^^^^^
//!    command payload
//! ```
//!
//! The command is the first whitespace-delimited token and only counts as one
//! when it starts with `/`. Text without a command yields `command() == None`
//! and the whole trimmed text as payload.

use std::fmt;

use tracing::warn;

use crate::adapter::{Attachment, BoxedUpdate};
use crate::error::ApiResult;

/// One inbound update as seen by handlers.
///
/// Cloning is cheap: the update itself is shared.
#[derive(Clone)]
pub struct Message {
    update: BoxedUpdate,
    command: Option<String>,
    payload: String,
}

impl Message {
    /// Wraps an update, extracting its command path and payload.
    pub fn new(update: BoxedUpdate) -> Self {
        let (command, payload) = split_command(update.text());
        let command = command.map(str::to_owned);
        let payload = payload.to_owned();
        Self {
            update,
            command,
            payload,
        }
    }

    /// The command path (e.g. `/start`), if the text begins with one.
    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    /// The text after the command token, trimmed. Without a command this is
    /// the whole trimmed text.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Whitespace-separated words of the payload.
    pub fn args(&self) -> impl Iterator<Item = &str> {
        self.payload.split_whitespace()
    }

    /// The raw, unmodified text of the update.
    pub fn text(&self) -> &str {
        self.update.text()
    }

    /// The file attachment, if the update carries one.
    pub fn attachment(&self) -> Option<&Attachment> {
        self.update.attachment()
    }

    /// Returns true when the update carries a file attachment.
    pub fn has_attachment(&self) -> bool {
        self.attachment().is_some()
    }

    /// The underlying update.
    pub fn update(&self) -> &BoxedUpdate {
        &self.update
    }

    /// Replies to the chat this message came from.
    ///
    /// Failures are logged here and also returned, so handlers that do not
    /// care may ignore the result.
    pub async fn reply(&self, text: impl AsRef<str>) -> ApiResult<()> {
        let result = self.update.reply(text.as_ref()).await;
        if let Err(e) = &result {
            warn!(
                command = self.command().unwrap_or_default(),
                error = %e,
                "Failed to send reply"
            );
        }
        result
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("command", &self.command)
            .field("payload", &self.payload)
            .field("attachment", &self.attachment())
            .finish_non_exhaustive()
    }
}

/// Splits text into its command token (if any) and the remaining payload.
pub fn split_command(text: &str) -> (Option<&str>, &str) {
    let trimmed = text.trim_start();
    let (token, rest) = match trimmed.find(char::is_whitespace) {
        Some(i) => trimmed.split_at(i),
        None => (trimmed, ""),
    };

    if token.starts_with('/') {
        (Some(token), rest.trim())
    } else {
        (None, text.trim())
    }
}
