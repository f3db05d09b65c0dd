use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use super::Role;
use crate::error::Result;

// ---------------------------------------------------------------------------
// Raw storage shapes (private deserialization types)
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RawRecord {
    id: Option<String>,
    #[serde(default)]
    role: String,
    #[serde(rename = "sessionID", default)]
    session_id: String,
    #[serde(default)]
    time: RawTime,
    error: Option<serde_json::Value>,
}

#[derive(Deserialize, Default)]
struct RawTime {
    created: Option<i64>,
    completed: Option<i64>,
}

#[derive(Deserialize)]
struct RawPart {
    #[serde(rename = "type")]
    part_type: String,
    text: Option<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Header of one OpenCode message: who spoke, in which session. The body lives
/// in separate part files.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    pub id: String,
    pub role: Role,
    pub session_id: String,
    pub created: Option<DateTime<Utc>>,
    /// Whether the body is final. Assistant records are rewritten with a
    /// completion time (or an error) once streaming ends; until then their
    /// parts hold a prefix of the answer.
    pub finished: bool,
}

/// Read a `message/<session>/<id>.json` record.
///
/// Returns `Ok(None)` for records that are not deliverable turns (unknown
/// role, missing session id). IO and decode failures are errors.
pub fn read_record(path: &Path) -> Result<Option<MessageRecord>> {
    let raw: RawRecord = serde_json::from_str(&fs::read_to_string(path)?)?;

    let Some(role) = Role::from_tag(&raw.role) else {
        debug!("opencode_parser: ignoring record with role {:?}", raw.role);
        return Ok(None);
    };
    if raw.session_id.is_empty() {
        return Ok(None);
    }

    let id = match raw.id {
        Some(id) if !id.is_empty() => id,
        _ => match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) => stem.to_string(),
            None => return Ok(None),
        },
    };

    let finished = match role {
        Role::User => true,
        Role::Agent => raw.time.completed.is_some() || raw.error.is_some(),
    };

    Ok(Some(MessageRecord {
        id,
        role,
        session_id: raw.session_id,
        created: raw
            .time
            .created
            .and_then(DateTime::<Utc>::from_timestamp_millis),
        finished,
    }))
}

/// Position of a record among the records of its session. Message ids sort in
/// creation order, so this counts the sibling records whose file name sorts
/// before this one.
pub fn record_position(path: &Path) -> usize {
    let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
        return 0;
    };
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .flatten()
            .map(|entry| entry.file_name())
            .filter(|other| {
                other.as_os_str() < name
                    && Path::new(other).extension().and_then(|e| e.to_str()) == Some("json")
            })
            .count(),
        Err(e) => {
            debug!("opencode_parser: cannot list {}: {e}", dir.display());
            0
        }
    }
}

/// Concatenate the text parts stored under `part/<message id>/`, ordered by
/// file name.
///
/// A missing directory, or one whose parts are not written yet, yields an
/// empty string. Non-text parts and unreadable part files are skipped.
pub fn read_parts(part_dir: &Path) -> Result<String> {
    let entries = match fs::read_dir(part_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(String::new()),
        Err(e) => return Err(e.into()),
    };

    let mut paths: Vec<_> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    paths.sort();

    let mut text_parts = Vec::new();
    for path in paths {
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("opencode_parser: failed to read part {}: {e}", path.display());
                continue;
            }
        };
        let part: RawPart = match serde_json::from_str(&raw) {
            Ok(part) => part,
            Err(e) => {
                // Usually a part that is still being written.
                debug!("opencode_parser: skipping part {}: {e}", path.display());
                continue;
            }
        };
        if part.part_type != "text" {
            continue;
        }
        if let Some(text) = part.text.filter(|t| !t.is_empty()) {
            text_parts.push(text);
        }
    }

    Ok(text_parts.join("\n"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
