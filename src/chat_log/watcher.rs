use std::path::{Component, Path, PathBuf};

use notify::{EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error};

use super::reader::TranscriptSource;
use super::AiTool;
use crate::error::Result;

/// Capacity of the queue between the notify callback and the consumer.
pub const EVENT_QUEUE_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Path classification
// ---------------------------------------------------------------------------

/// What a changed path under the watched root means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathEvent {
    /// A transcript source that can be read directly.
    Source(TranscriptSource),
    /// A content part of an OpenCode message was written.
    Part { message_id: String },
}

/// Map a changed path onto a transcript source, or `None` if the path is not
/// something the given tool writes.
///
/// Claude transcripts are any `*.jsonl` below the root. OpenCode records are
/// `message/<session>/<id>.json` with parts in `part/<id>/<part>.json`.
pub fn classify(root: &Path, tool: AiTool, path: &Path) -> Option<PathEvent> {
    match tool {
        AiTool::Claude => {
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                return None;
            }
            Some(PathEvent::Source(TranscriptSource::AppendLog {
                path: path.to_path_buf(),
            }))
        }
        AiTool::OpenCode => {
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                return None;
            }
            let relative = path.strip_prefix(root).ok()?;
            let parts: Vec<&str> = relative
                .components()
                .map(|c| match c {
                    Component::Normal(s) => s.to_str(),
                    _ => None,
                })
                .collect::<Option<_>>()?;

            match parts.as_slice() {
                ["message", _session, file] => {
                    let message_id = file.strip_suffix(".json")?;
                    Some(PathEvent::Source(TranscriptSource::SplitRecord {
                        record: path.to_path_buf(),
                        parts: root.join("part").join(message_id),
                    }))
                }
                ["part", message_id, _file] => Some(PathEvent::Part {
                    message_id: message_id.to_string(),
                }),
                _ => None,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// File-system watcher
// ---------------------------------------------------------------------------

/// Watch `root` recursively and forward every created or modified path into a
/// bounded channel.
///
/// The returned `notify::RecommendedWatcher` **must be kept alive** by the
/// caller -- dropping it stops file-system notifications and closes the
/// channel.
pub fn watch_root(root: &Path) -> Result<(notify::RecommendedWatcher, mpsc::Receiver<PathBuf>)> {
    // `notify` callbacks are sync; bridge to async with a bounded channel.
    let (path_tx, path_rx) = mpsc::channel::<PathBuf>(EVENT_QUEUE_CAPACITY);

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(event) => {
                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    return;
                }
                for path in event.paths {
                    if path_tx.blocking_send(path).is_err() {
                        debug!("path channel closed, dropping notification");
                        return;
                    }
                }
            }
            Err(e) => {
                // Log but do not crash the watcher.
                error!("notify error: {e}");
            }
        }
    })?;

    watcher.watch(root, RecursiveMode::Recursive)?;
    Ok((watcher, path_rx))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
