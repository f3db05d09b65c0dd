use std::collections::{HashMap, HashSet};

use crate::chat_log::reader::{SourceKey, Transcript};
use crate::chat_log::ChatMessage;

/// Progress through one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryCursor {
    /// Number of messages already delivered from a whole-file transcript.
    Count(usize),
    /// Record ids already delivered for a split-record conversation.
    Ids(HashSet<String>),
}

/// Remembers, per source, which messages have already gone out and slices
/// each fresh read down to the new ones.
#[derive(Debug, Default)]
pub struct DeliveryTracker {
    cursors: HashMap<SourceKey, DeliveryCursor>,
}

impl DeliveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages of `transcript` not yet committed, in source order.
    pub fn delta<'a>(&self, transcript: &'a Transcript) -> Vec<&'a ChatMessage> {
        match &transcript.key {
            SourceKey::Log(_) => {
                let seen = match self.cursors.get(&transcript.key) {
                    Some(DeliveryCursor::Count(n)) => *n,
                    _ => 0,
                };
                transcript.messages.iter().skip(seen).collect()
            }
            SourceKey::Records(_) => transcript
                .messages
                .iter()
                .filter(|msg| match &msg.id {
                    Some(id) => !self.is_delivered(&transcript.key, id),
                    None => true,
                })
                .collect(),
        }
    }

    /// Advance the cursor past every message in `transcript`.
    ///
    /// The count form never moves backwards, so a transcript that shrinks or is
    /// rewritten cannot cause earlier messages to be delivered again.
    pub fn commit(&mut self, transcript: &Transcript) {
        match &transcript.key {
            SourceKey::Log(_) => {
                let cursor = self
                    .cursors
                    .entry(transcript.key.clone())
                    .or_insert(DeliveryCursor::Count(0));
                if let DeliveryCursor::Count(n) = cursor {
                    *n = (*n).max(transcript.messages.len());
                }
            }
            SourceKey::Records(_) => {
                let cursor = self
                    .cursors
                    .entry(transcript.key.clone())
                    .or_insert_with(|| DeliveryCursor::Ids(HashSet::new()));
                if let DeliveryCursor::Ids(ids) = cursor {
                    ids.extend(transcript.messages.iter().filter_map(|m| m.id.clone()));
                }
            }
        }
    }

    /// Whether record `id` has already been delivered under `key`.
    pub fn is_delivered(&self, key: &SourceKey, id: &str) -> bool {
        matches!(self.cursors.get(key), Some(DeliveryCursor::Ids(ids)) if ids.contains(id))
    }

    #[cfg(test)]
    pub fn cursor(&self, key: &SourceKey) -> Option<&DeliveryCursor> {
        self.cursors.get(key)
    }
}
