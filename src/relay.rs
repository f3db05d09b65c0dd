//! The dispatch pipeline: changed path -> transcript -> new messages -> chat.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::chat_log::reader::{self, TranscriptSource};
use crate::chat_log::watcher::{classify, PathEvent};
use crate::chat_log::AiTool;
use crate::delivery::{DedupGuard, DeliveryTracker};
use crate::error::Result;
use crate::notifier::{short_id, Notifier};

/// Owns all delivery state and forwards new transcript content to the
/// notifier. Paths are handled one at a time.
pub struct Relay {
    root: PathBuf,
    tool: AiTool,
    tracker: DeliveryTracker,
    dedup: DedupGuard,
    notifier: Arc<dyn Notifier>,
    /// OpenCode records seen before they had content, by message id.
    pending: HashMap<String, PendingRecord>,
}

/// A split record that produced nothing yet; part events re-read it.
struct PendingRecord {
    record: PathBuf,
    session_id: String,
}

impl Relay {
    pub fn new(root: PathBuf, tool: AiTool, notifier: Arc<dyn Notifier>, dedup: DedupGuard) -> Self {
        Self {
            root,
            tool,
            tracker: DeliveryTracker::new(),
            dedup,
            notifier,
            pending: HashMap::new(),
        }
    }

    /// Handle path notifications until the channel closes or `shutdown`
    /// resolves.
    pub async fn run<F>(&mut self, events: &mut mpsc::Receiver<PathBuf>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested, stopping relay");
                    break;
                }
                path = events.recv() => match path {
                    Some(path) => self.handle_path(&path).await,
                    None => {
                        warn!("watch channel closed, stopping relay");
                        break;
                    }
                },
            }
        }
    }

    /// React to one changed path. Errors are logged; nothing here stops the
    /// loop.
    pub async fn handle_path(&mut self, path: &Path) {
        if !path.is_file() {
            return;
        }

        let source = match classify(&self.root, self.tool, path) {
            Some(PathEvent::Source(source)) => source,
            Some(PathEvent::Part { message_id }) => match self.pending.get(&message_id) {
                Some(pending) => TranscriptSource::SplitRecord {
                    record: pending.record.clone(),
                    parts: self.root.join("part").join(&message_id),
                },
                None => return,
            },
            None => return,
        };

        match self.process(&source).await {
            Ok(0) => {}
            Ok(sent) => debug!(
                "delivered {sent} message(s) from {} ({} fingerprint(s) remembered)",
                path.display(),
                self.dedup.len()
            ),
            Err(e) => error!("Error processing {}: {e}", path.display()),
        }
    }

    /// Read `source`, deliver whatever is new, and advance its cursor.
    ///
    /// Returns how many messages the notifier accepted. Failed sends are
    /// logged and still count as delivered for cursor purposes; they are not
    /// retried.
    pub async fn process(&mut self, source: &TranscriptSource) -> Result<usize> {
        let Some(transcript) = reader::read(source)? else {
            return Ok(0);
        };

        if let TranscriptSource::SplitRecord { record, .. } = source {
            let message_id = reader::stem_id(record);
            if transcript.messages.is_empty() {
                debug!("no content yet for message {message_id}");
                self.pending.insert(
                    message_id,
                    PendingRecord {
                        record: record.clone(),
                        session_id: transcript.conversation_id.clone(),
                    },
                );
            } else {
                // Earlier records of the session that never produced text
                // (tool-only turns) will not be needed again.
                let session_id = &transcript.conversation_id;
                self.pending.retain(|id, pending| {
                    &pending.session_id != session_id || id.as_str() > message_id.as_str()
                });
            }
        }

        let mut sent = 0;
        for message in self.tracker.delta(&transcript) {
            if !self
                .dedup
                .should_send(&transcript.conversation_id, message.role, &message.text)
            {
                continue;
            }

            match self
                .notifier
                .send(message.role, &message.text, &transcript.conversation_id)
                .await
            {
                Ok(()) => {
                    sent += 1;
                    info!(
                        "Sent {} message from session {}",
                        message.role,
                        short_id(&transcript.conversation_id)
                    );
                    if let Some(ts) = message.timestamp {
                        debug!("message #{} was written at {ts}", message.ordinal);
                    }
                }
                Err(e) => warn!(
                    "Failed to send {} message from session {}: {e}",
                    message.role,
                    short_id(&transcript.conversation_id)
                ),
            }
        }

        self.tracker.commit(&transcript);
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat_log::Role;
    use crate::error::NotifyError;
    use async_trait::async_trait;
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::{tempdir, TempDir};

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(Role, String, String)>>,
        fail: bool,
    }

    impl RecordingNotifier {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn sent(&self) -> Vec<(Role, String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(
            &self,
            role: Role,
            text: &str,
            conversation_id: &str,
        ) -> std::result::Result<(), NotifyError> {
            self.sent
                .lock()
                .unwrap()
                .push((role, text.to_string(), conversation_id.to_string()));
            if self.fail {
                return Err(NotifyError::Status {
                    status: reqwest::StatusCode::BAD_GATEWAY,
                    body: "down".to_string(),
                });
            }
            Ok(())
        }
    }

    fn relay(root: &Path, tool: AiTool, notifier: Arc<RecordingNotifier>) -> Relay {
        Relay::new(root.to_path_buf(), tool, notifier, DedupGuard::new(None))
    }

    fn append(path: &Path, bytes: &[u8]) {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(bytes).unwrap();
    }

    fn texts(notifier: &RecordingNotifier) -> Vec<(Role, String)> {
        notifier
            .sent()
            .into_iter()
            .map(|(role, text, _)| (role, text))
            .collect()
    }

    const USER_HI: &str = r#"{"type":"user","message":{"content":"hi"}}"#;
    const AGENT_HELLO: &str =
        r#"{"type":"assistant","message":{"content":[{"type":"text","text":"hello"}]}}"#;

    #[tokio::test]
    async fn append_log_scenario_delivers_both_turns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conv-1.jsonl");
        fs::write(&path, format!("{USER_HI}\n{AGENT_HELLO}\n")).unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let mut relay = relay(dir.path(), AiTool::Claude, notifier.clone());
        relay.handle_path(&path).await;

        assert_eq!(
            notifier.sent(),
            vec![
                (Role::User, "hi".to_string(), "conv-1".to_string()),
                (Role::Agent, "hello".to_string(), "conv-1".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn repeated_notifications_deliver_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conv.jsonl");
        fs::write(&path, format!("{USER_HI}\n")).unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let mut relay = relay(dir.path(), AiTool::Claude, notifier.clone());
        for _ in 0..3 {
            relay.handle_path(&path).await;
        }
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn chunked_appends_deliver_every_message_once_in_order() {
        let lines = [
            USER_HI.to_string(),
            "{broken".to_string(),
            AGENT_HELLO.to_string(),
            r#"{"type":"assistant","message":{"content":[{"type":"thinking","thinking":"x"},{"type":"tool_use","name":"Bash","input":{"command":"ls"}}]}}"#.to_string(),
            r#"{"type":"user","message":{"content":[{"type":"tool_result","content":"a.txt","is_error":false}]}}"#.to_string(),
            r#"{"type":"assistant","message":{"content":"done"}}"#.to_string(),
        ];
        let full: String = lines.iter().map(|l| format!("{l}\n")).collect();

        // Reference: the whole file in one go.
        let reference_dir = tempdir().unwrap();
        let reference_path = reference_dir.path().join("ref.jsonl");
        fs::write(&reference_path, &full).unwrap();
        let reference = Arc::new(RecordingNotifier::default());
        relay(reference_dir.path(), AiTool::Claude, reference.clone())
            .handle_path(&reference_path)
            .await;
        let expected = texts(&reference);
        assert_eq!(expected.len(), 5);

        for chunk_size in [1usize, 7, 40, 97, full.len()] {
            let dir = tempdir().unwrap();
            let path = dir.path().join("ref.jsonl");
            let notifier = Arc::new(RecordingNotifier::default());
            let mut relay = relay(dir.path(), AiTool::Claude, notifier.clone());

            for chunk in full.as_bytes().chunks(chunk_size) {
                append(&path, chunk);
                relay.handle_path(&path).await;
            }
            relay.handle_path(&path).await;

            assert_eq!(texts(&notifier), expected, "chunk size {chunk_size}");
        }
    }

    #[tokio::test]
    async fn identical_triples_collapse_to_one_send() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conv.jsonl");
        fs::write(&path, format!("{USER_HI}\n{USER_HI}\n")).unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let mut relay = relay(dir.path(), AiTool::Claude, notifier.clone());
        relay.handle_path(&path).await;
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn same_text_in_other_conversation_is_sent() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.jsonl");
        let b = dir.path().join("b.jsonl");
        fs::write(&a, format!("{USER_HI}\n")).unwrap();
        fs::write(&b, format!("{USER_HI}\n")).unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let mut relay = relay(dir.path(), AiTool::Claude, notifier.clone());
        relay.handle_path(&a).await;
        relay.handle_path(&b).await;
        assert_eq!(notifier.sent().len(), 2);
    }

    #[tokio::test]
    async fn failed_sends_are_not_retried() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conv.jsonl");
        fs::write(&path, format!("{USER_HI}\n")).unwrap();

        let notifier = Arc::new(RecordingNotifier::failing());
        let mut relay = relay(dir.path(), AiTool::Claude, notifier.clone());
        let source = TranscriptSource::AppendLog { path: path.clone() };
        assert_eq!(relay.process(&source).await.unwrap(), 0);

        append(&path, format!("{AGENT_HELLO}\n").as_bytes());
        relay.handle_path(&path).await;

        let attempted: Vec<String> = notifier.sent().into_iter().map(|(_, t, _)| t).collect();
        assert_eq!(attempted, vec!["hi".to_string(), "hello".to_string()]);
    }

    #[tokio::test]
    async fn reasoning_and_unknown_units_in_delivered_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conv.jsonl");
        fs::write(
            &path,
            concat!(
                r#"{"type":"assistant","message":{"content":[{"type":"thinking","thinking":"SECRET"},{"type":"text","text":"visible"},{"type":"tool_result","content":[{"type":"thinking","thinking":"SECRET"},{"type":"text","text":"out"}]},{"type":"citation","ref":"doc-7"}]}}"#,
                "\n"
            ),
        )
        .unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        relay(dir.path(), AiTool::Claude, notifier.clone())
            .handle_path(&path)
            .await;

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        let text = &sent[0].1;
        assert!(!text.contains("SECRET"));
        assert!(text.contains("visible"));
        assert!(text.contains("out"));
        assert!(text.contains("doc-7"));
    }

    #[tokio::test]
    async fn non_transcript_paths_are_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, USER_HI).unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let mut relay = relay(dir.path(), AiTool::Claude, notifier.clone());
        relay.handle_path(&path).await;
        relay.handle_path(&dir.path().join("missing.jsonl")).await;
        assert!(notifier.sent().is_empty());
    }

    fn opencode_store() -> (TempDir, PathBuf, PathBuf) {
        let dir = tempdir().unwrap();
        let record = dir.path().join("message").join("S1").join("msg_1.json");
        let parts = dir.path().join("part").join("msg_1");
        fs::create_dir_all(record.parent().unwrap()).unwrap();
        fs::create_dir_all(&parts).unwrap();
        (dir, record, parts)
    }

    #[tokio::test]
    async fn split_record_scenario_delivers_once() {
        let (dir, record, parts) = opencode_store();
        fs::write(&record, r#"{"id":"msg_1","role":"user","sessionID":"S1"}"#).unwrap();
        fs::write(parts.join("prt_1.json"), r#"{"type":"text","text":"ping"}"#).unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let mut relay = relay(dir.path(), AiTool::OpenCode, notifier.clone());
        relay.handle_path(&record).await;
        relay.handle_path(&record).await;

        assert_eq!(
            notifier.sent(),
            vec![(Role::User, "ping".to_string(), "S1".to_string())]
        );
    }

    #[tokio::test]
    async fn late_parts_are_picked_up_from_part_events() {
        let (dir, record, parts) = opencode_store();
        fs::write(&record, r#"{"id":"msg_1","role":"user","sessionID":"S1"}"#).unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let mut relay = relay(dir.path(), AiTool::OpenCode, notifier.clone());
        relay.handle_path(&record).await;
        assert!(notifier.sent().is_empty());

        let part = parts.join("prt_1.json");
        fs::write(&part, r#"{"type":"text","text":"ping"}"#).unwrap();
        relay.handle_path(&part).await;
        relay.handle_path(&part).await;

        assert_eq!(
            notifier.sent(),
            vec![(Role::User, "ping".to_string(), "S1".to_string())]
        );
        assert!(relay.pending.is_empty());
    }

    #[tokio::test]
    async fn streamed_answer_is_delivered_whole_after_completion() {
        let (dir, record, parts) = opencode_store();
        let streaming = r#"{"id":"msg_1","role":"assistant","sessionID":"S1","time":{"created":1}}"#;
        fs::write(&record, streaming).unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let mut relay = relay(dir.path(), AiTool::OpenCode, notifier.clone());
        relay.handle_path(&record).await;

        let part = parts.join("prt_1.json");
        fs::write(&part, r#"{"type":"text","text":"Hel"}"#).unwrap();
        relay.handle_path(&part).await;
        fs::write(&part, r#"{"type":"text","text":"Hello, here is the full answer"}"#).unwrap();
        relay.handle_path(&part).await;
        relay.handle_path(&record).await;
        assert!(notifier.sent().is_empty());

        fs::write(
            &record,
            r#"{"id":"msg_1","role":"assistant","sessionID":"S1","time":{"created":1,"completed":9}}"#,
        )
        .unwrap();
        relay.handle_path(&record).await;
        relay.handle_path(&part).await;

        assert_eq!(
            texts(&notifier),
            vec![(Role::Agent, "Hello, here is the full answer".to_string())]
        );
    }

    #[tokio::test]
    async fn tool_only_records_are_forgotten_once_the_session_moves_on() {
        let (dir, tool_only, _parts) = opencode_store();
        fs::write(
            &tool_only,
            r#"{"id":"msg_1","role":"assistant","sessionID":"S1","time":{"created":1,"completed":2}}"#,
        )
        .unwrap();
        let other_session = dir.path().join("message").join("S2").join("msg_0.json");
        fs::create_dir_all(other_session.parent().unwrap()).unwrap();
        fs::write(&other_session, r#"{"id":"msg_0","role":"user","sessionID":"S2"}"#).unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let mut relay = relay(dir.path(), AiTool::OpenCode, notifier.clone());
        relay.handle_path(&tool_only).await;
        relay.handle_path(&other_session).await;
        assert_eq!(relay.pending.len(), 2);

        let next = tool_only.with_file_name("msg_2.json");
        fs::write(&next, r#"{"id":"msg_2","role":"user","sessionID":"S1"}"#).unwrap();
        let next_parts = dir.path().join("part").join("msg_2");
        fs::create_dir_all(&next_parts).unwrap();
        fs::write(next_parts.join("prt_1.json"), r#"{"type":"text","text":"next"}"#).unwrap();
        relay.handle_path(&next).await;

        assert_eq!(
            texts(&notifier),
            vec![(Role::User, "next".to_string())]
        );
        assert_eq!(relay.pending.keys().collect::<Vec<_>>(), vec!["msg_0"]);
    }

    #[tokio::test]
    async fn part_events_for_unknown_messages_are_ignored() {
        let (dir, _record, parts) = opencode_store();
        let part = parts.join("prt_1.json");
        fs::write(&part, r#"{"type":"text","text":"orphan"}"#).unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        relay(dir.path(), AiTool::OpenCode, notifier.clone())
            .handle_path(&part)
            .await;
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_after_draining_events() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conv.jsonl");
        fs::write(&path, format!("{USER_HI}\n")).unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let mut relay = relay(dir.path(), AiTool::Claude, notifier.clone());

        let (tx, mut rx) = mpsc::channel(8);
        tx.send(path.clone()).await.unwrap();
        drop(tx);

        relay.run(&mut rx, std::future::pending::<()>()).await;
        assert_eq!(notifier.sent().len(), 1);

        let (_tx, mut rx) = mpsc::channel::<PathBuf>(8);
        relay.run(&mut rx, async {}).await;
    }
}
