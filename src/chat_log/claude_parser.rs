use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::format::format_unit;
use super::{ChatMessage, ContentUnit, Role};

// ---------------------------------------------------------------------------
// Raw JSONL shapes (private deserialization types)
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RawLine {
    #[serde(rename = "type")]
    line_type: String,
    timestamp: Option<String>,
    message: Option<RawMessage>,
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(default)]
    content: RawContent,
}

/// Claude Code encodes `content` as either a plain string or an array of
/// typed blocks. Anything else is kept raw.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    Units(Vec<ContentUnit>),
    Other(Value),
}

impl Default for RawContent {
    fn default() -> Self {
        RawContent::Units(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse a single JSONL line from a Claude Code transcript.
///
/// Returns `None` for blank lines, non-conversational records (summaries,
/// system entries), turns whose content renders to nothing, and malformed
/// JSON (the latter also emits a tracing warning). The returned message has
/// ordinal 0; the reader assigns positions.
pub fn parse_line(line: &str) -> Option<ChatMessage> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let raw: RawLine = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(e) => {
            warn!("claude_parser: failed to parse JSONL line: {e}");
            return None;
        }
    };

    let role = Role::from_tag(&raw.line_type)?;
    let units = into_units(raw.message?.content);
    let text = render_units(&units)?;

    Some(ChatMessage {
        role,
        text,
        ordinal: 0,
        id: None,
        timestamp: raw.timestamp.as_deref().and_then(parse_timestamp),
    })
}

/// Format each unit in order, drop omitted and empty pieces, and join the rest
/// with a blank line. Returns `None` when nothing displayable remains.
pub fn render_units(units: &[ContentUnit]) -> Option<String> {
    let pieces: Vec<String> = units
        .iter()
        .filter_map(format_unit)
        .filter(|piece| !piece.is_empty())
        .collect();

    if pieces.is_empty() {
        None
    } else {
        Some(pieces.join("\n\n"))
    }
}

// ---------------------------------------------------------------------------
// Content conversion
// ---------------------------------------------------------------------------

fn into_units(content: RawContent) -> Vec<ContentUnit> {
    match content {
        RawContent::Text(s) => vec![ContentUnit::Text(s)],
        RawContent::Units(units) => units,
        RawContent::Other(Value::Null) => vec![],
        RawContent::Other(v) => vec![ContentUnit::Raw(v)],
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
