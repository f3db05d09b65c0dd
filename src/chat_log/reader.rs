use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{claude_parser, opencode_parser, ChatMessage};
use crate::error::Result;

/// Where one conversation's content comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptSource {
    /// One JSONL file, one record per line, named after the conversation.
    AppendLog { path: PathBuf },
    /// One message record whose body lives in a directory of part files.
    SplitRecord { record: PathBuf, parts: PathBuf },
}

/// Identifies the delivery cursor a transcript advances.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceKey {
    /// Count cursor for a whole-file transcript.
    Log(PathBuf),
    /// Identifier cursor for a conversation assembled from records.
    Records(String),
}

/// The messages currently available from one source.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub key: SourceKey,
    pub conversation_id: String,
    pub messages: Vec<ChatMessage>,
}

/// Read a source from disk. Nothing is cached: every call reflects the file
/// system as it is now.
///
/// Returns `Ok(None)` when a split record turns out not to be a conversational
/// turn. A split record that is still streaming, or whose parts are not
/// written yet, yields a transcript with no messages.
pub fn read(source: &TranscriptSource) -> Result<Option<Transcript>> {
    match source {
        TranscriptSource::AppendLog { path } => read_append_log(path).map(Some),
        TranscriptSource::SplitRecord { record, parts } => read_split_record(record, parts),
    }
}

fn read_append_log(path: &Path) -> Result<Transcript> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut messages = Vec::new();
    let mut line_buf = Vec::new();

    loop {
        line_buf.clear();
        match reader.read_until(b'\n', &mut line_buf) {
            Ok(0) => break, // EOF
            Ok(_) => {
                let line = String::from_utf8_lossy(&line_buf);
                if let Some(mut msg) = claude_parser::parse_line(&line) {
                    msg.ordinal = messages.len();
                    messages.push(msg);
                }
            }
            Err(e) => {
                warn!("error reading transcript line in {}: {e}", path.display());
                break;
            }
        }
    }

    Ok(Transcript {
        key: SourceKey::Log(path.to_path_buf()),
        conversation_id: stem_id(path),
        messages,
    })
}

fn read_split_record(record: &Path, parts: &Path) -> Result<Option<Transcript>> {
    let Some(header) = opencode_parser::read_record(record)? else {
        return Ok(None);
    };

    let text = if header.finished {
        opencode_parser::read_parts(parts)?
    } else {
        debug!("message {} is still being written", header.id);
        String::new()
    };
    let messages = if text.trim().is_empty() {
        Vec::new()
    } else {
        vec![ChatMessage {
            role: header.role,
            text,
            ordinal: opencode_parser::record_position(record),
            id: Some(header.id),
            timestamp: header.created,
        }]
    };

    Ok(Some(Transcript {
        key: SourceKey::Records(header.session_id.clone()),
        conversation_id: header.session_id,
        messages,
    }))
}

/// File stem of a source path: the conversation id of an append log, the
/// message id of a split record.
pub fn stem_id(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
