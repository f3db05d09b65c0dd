//! Outbound chat destinations.

mod mattermost;
mod zulip;

pub use mattermost::MattermostNotifier;
pub use zulip::ZulipNotifier;

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;

use crate::chat_log::{AiTool, Role};
use crate::config::DestinationConfig;
use crate::error::NotifyError;

/// Appended to any message cut down to the destination's length limit.
pub const TRUNCATION_MARKER: &str = "\n\n... (truncated)";

/// Sends one reconstructed message to a chat destination.
///
/// Implementations receive the full text and apply their own length limit.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, role: Role, text: &str, conversation_id: &str)
        -> Result<(), NotifyError>;
}

/// Build the notifier for the configured destination.
pub fn from_config(destination: &DestinationConfig, tool: AiTool) -> Arc<dyn Notifier> {
    match destination {
        DestinationConfig::Zulip(config) => {
            Arc::new(ZulipNotifier::new(config.clone(), tool.agent_label()))
        }
        DestinationConfig::Mattermost(config) => {
            Arc::new(MattermostNotifier::new(config.clone(), tool.agent_label()))
        }
    }
}

/// Cut `text` to at most `max_len` characters, appending [`TRUNCATION_MARKER`]
/// when anything was removed.
pub fn truncate(text: &str, max_len: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max_len) {
        Some((cut, _)) => Cow::Owned(format!("{}{TRUNCATION_MARKER}", &text[..cut])),
        None => Cow::Borrowed(text),
    }
}

/// First eight characters of a conversation id, without OpenCode's `ses_`
/// prefix.
pub fn short_id(conversation_id: &str) -> String {
    let trimmed = conversation_id
        .strip_prefix("ses_")
        .unwrap_or(conversation_id);
    trimmed.chars().take(8).collect()
}
