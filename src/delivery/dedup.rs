use std::collections::{HashSet, VecDeque};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::chat_log::Role;

/// Stable fingerprint of one outbound message.
pub fn fingerprint(conversation_id: &str, role: Role, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(conversation_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(role.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Process-wide record of what has already been sent.
///
/// Identical `(conversation, role, text)` triples are sent at most once,
/// whatever source produced them. With a capacity set, the oldest
/// fingerprints are forgotten first.
#[derive(Debug, Default)]
pub struct DedupGuard {
    seen: HashSet<String>,
    order: VecDeque<String>,
    capacity: Option<usize>,
}

impl DedupGuard {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            capacity: capacity.filter(|c| *c > 0),
            ..Self::default()
        }
    }

    /// Returns `true` if the message has not been sent before, recording it
    /// first. The caller sends afterwards, so a failed send is a drop rather
    /// than a later duplicate.
    pub fn should_send(&mut self, conversation_id: &str, role: Role, text: &str) -> bool {
        let fp = fingerprint(conversation_id, role, text);
        if self.seen.contains(&fp) {
            debug!("suppressing duplicate {role} message for {conversation_id}");
            return false;
        }

        self.seen.insert(fp.clone());
        self.order.push_back(fp);

        if let Some(capacity) = self.capacity {
            while self.order.len() > capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.seen.remove(&oldest);
                }
            }
        }

        true
    }

    /// Number of fingerprints currently remembered.
    pub fn len(&self) -> usize {
        self.seen.len()
    }
}
