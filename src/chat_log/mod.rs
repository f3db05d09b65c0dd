pub mod claude_parser;
pub mod format;
pub mod opencode_parser;
pub mod reader;
pub mod watcher;

use std::fmt;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Who authored a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

impl Role {
    /// Map a transcript role/type tag onto a deliverable role. Anything that is
    /// not a user or assistant turn yields `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Agent),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Agent => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One atomic piece of structured transcript content.
///
/// Known shapes are decoded by their `type` discriminator; anything else is
/// kept verbatim in [`ContentUnit::Raw`] so it still reaches the reader.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentUnit {
    Text(String),
    ToolInvocation { name: String, input: Value },
    ToolOutcome { body: OutcomeBody, is_error: bool },
    Reasoning(String),
    Raw(Value),
}

/// Tool result payload: a plain string, a list of sub-units, or anything else.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OutcomeBody {
    Text(String),
    Units(Vec<Value>),
    Other(Value),
}

impl Default for OutcomeBody {
    fn default() -> Self {
        OutcomeBody::Text(String::new())
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TaggedUnit {
    Text {
        text: String,
    },
    ToolUse {
        #[serde(default = "unknown_tool")]
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        #[serde(default)]
        content: OutcomeBody,
        #[serde(default)]
        is_error: bool,
    },
}

fn unknown_tool() -> String {
    "unknown".to_string()
}

/// Reasoning is recognised by its tag alone so that an unexpected payload can
/// never turn it into visible content.
fn reasoning_text(value: &Value) -> Option<String> {
    match value.get("type").and_then(Value::as_str) {
        Some("thinking" | "redacted_thinking") => Some(
            ["thinking", "data"]
                .iter()
                .find_map(|key| value.get(*key).and_then(Value::as_str))
                .unwrap_or_default()
                .to_string(),
        ),
        _ => None,
    }
}

impl From<Value> for ContentUnit {
    fn from(value: Value) -> Self {
        if let Some(thinking) = reasoning_text(&value) {
            return ContentUnit::Reasoning(thinking);
        }
        match TaggedUnit::deserialize(&value) {
            Ok(TaggedUnit::Text { text }) => ContentUnit::Text(text),
            Ok(TaggedUnit::ToolUse { name, input }) => ContentUnit::ToolInvocation { name, input },
            Ok(TaggedUnit::ToolResult { content, is_error }) => ContentUnit::ToolOutcome {
                body: content,
                is_error,
            },
            Err(_) => ContentUnit::Raw(value),
        }
    }
}

impl<'de> Deserialize<'de> for ContentUnit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(ContentUnit::from)
    }
}

/// A reconstructed, displayable message.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
    /// Position of the message within its transcript; for split records, the
    /// record's position among its session's records.
    pub ordinal: usize,
    /// Record identifier, present for split-record sources.
    pub id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Which AI tool produced the transcripts under the watched root.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AiTool {
    Claude,
    #[value(name = "opencode")]
    OpenCode,
}

impl AiTool {
    /// Name used when the assistant speaks in the destination chat.
    pub fn agent_label(&self) -> &'static str {
        match self {
            AiTool::Claude => "Claude",
            AiTool::OpenCode => "OpenCode",
        }
    }
}
