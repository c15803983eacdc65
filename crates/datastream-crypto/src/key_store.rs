//! Per-publisher group key storage.

use std::collections::{HashMap, VecDeque};

use crate::group_key::GroupKey;

/// How many keys are retained per publisher.
///
/// The previous key stays usable so messages encrypted just before a
/// rotation still decrypt when they arrive after it.
pub const RETAINED_KEYS: usize = 2;

/// Current and previous group keys, keyed by publisher id.
#[derive(Debug, Default, Clone)]
pub struct GroupKeyStore {
    keys: HashMap<String, VecDeque<GroupKey>>,
}

impl GroupKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `key` the current key for `publisher_id`.
    ///
    /// Returns false if it already was the current key.
    pub fn set(&mut self, publisher_id: &str, key: GroupKey) -> bool {
        let entry = self.keys.entry(normalize(publisher_id)).or_default();
        if entry.front() == Some(&key) {
            return false;
        }
        entry.retain(|k| k != &key);
        entry.push_front(key);
        entry.truncate(RETAINED_KEYS);
        true
    }

    /// The current key for a publisher.
    pub fn current(&self, publisher_id: &str) -> Option<&GroupKey> {
        self.keys.get(&normalize(publisher_id)).and_then(|k| k.front())
    }

    /// All retained keys for a publisher, newest first.
    pub fn candidates(&self, publisher_id: &str) -> Vec<GroupKey> {
        self.keys
            .get(&normalize(publisher_id))
            .map(|k| k.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_key(&self, publisher_id: &str) -> bool {
        self.current(publisher_id).is_some()
    }

    /// Forget every key of a publisher.
    pub fn remove(&mut self, publisher_id: &str) {
        self.keys.remove(&normalize(publisher_id));
    }
}

// Publisher ids are hex strings; casing is not significant.
fn normalize(publisher_id: &str) -> String {
    publisher_id.to_ascii_lowercase()
}
