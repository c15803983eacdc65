//! Decrypt-or-queue stage of a subscription's pipeline.
//!
//! Messages reach this stage already in chain order. A message that cannot
//! be decrypted is held back together with every later message of the same
//! publisher, so content is never delivered out of order. Supplying a key
//! retries the held messages once, in arrival order.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, warn};

use datastream_core::StreamMessage;

use crate::encryption::decrypt_message;
use crate::error::CryptoError;
use crate::group_key::GroupKey;
use crate::key_store::GroupKeyStore;

/// Outcome of offering a message to the decryptor.
#[derive(Debug)]
pub enum DecryptOutcome {
    /// Plaintext, ready for delivery.
    Ready(StreamMessage),
    /// Held until a key for the publisher is supplied.
    Queued {
        publisher_id: String,
        /// True when this message started the queue, i.e. a key request
        /// should be issued now.
        key_requested: bool,
    },
}

/// Outcome of retrying one queued message.
#[derive(Debug)]
pub enum RetryOutcome {
    Ready(StreamMessage),
    /// Still undecryptable after the retry. Terminal for this message.
    UnableToDecrypt {
        message: StreamMessage,
        error: CryptoError,
    },
}

/// Holds a subscription's keys and its undecryptable backlog.
#[derive(Debug, Default)]
pub struct Decryptor {
    keys: GroupKeyStore,
    waiting: HashMap<String, VecDeque<StreamMessage>>,
}

impl Decryptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with known keys.
    pub fn with_keys(keys: GroupKeyStore) -> Self {
        Self {
            keys,
            waiting: HashMap::new(),
        }
    }

    pub fn keys(&self) -> &GroupKeyStore {
        &self.keys
    }

    /// Number of messages waiting for a key from `publisher_id`.
    pub fn queued(&self, publisher_id: &str) -> usize {
        self.waiting
            .get(&publisher_id.to_ascii_lowercase())
            .map_or(0, VecDeque::len)
    }

    /// Decrypt a message, or hold it back until a key arrives.
    pub fn decrypt_or_queue(&mut self, message: StreamMessage) -> DecryptOutcome {
        // Plaintext too waits behind an earlier message of its publisher.
        let publisher = message.publisher_id().to_ascii_lowercase();
        if let Some(queue) = self.waiting.get_mut(&publisher) {
            if !queue.is_empty() {
                queue.push_back(message);
                return DecryptOutcome::Queued {
                    publisher_id: publisher,
                    key_requested: false,
                };
            }
        }

        if !message.is_encrypted() {
            return DecryptOutcome::Ready(message);
        }

        match self.try_decrypt(&message) {
            Ok(plaintext) => DecryptOutcome::Ready(plaintext),
            Err(e) => {
                debug!(
                    publisher = %publisher,
                    msg_ref = %message.message_ref(),
                    error = %e,
                    "queueing message until a group key is available"
                );
                self.waiting
                    .entry(publisher.clone())
                    .or_default()
                    .push_back(message);
                DecryptOutcome::Queued {
                    publisher_id: publisher,
                    key_requested: true,
                }
            }
        }
    }

    /// Install a key for a publisher and retry its queued messages.
    ///
    /// Each queued message gets exactly one more attempt. Keys announced by
    /// messages earlier in the queue are used for the ones after them.
    pub fn set_group_key(&mut self, publisher_id: &str, key: GroupKey) -> Vec<RetryOutcome> {
        let publisher = publisher_id.to_ascii_lowercase();
        self.keys.set(&publisher, key);

        let queue = self.waiting.remove(&publisher).unwrap_or_default();
        queue
            .into_iter()
            .map(|message| match self.try_decrypt(&message) {
                Ok(plaintext) => RetryOutcome::Ready(plaintext),
                Err(error) => {
                    warn!(
                        publisher = %publisher,
                        msg_ref = %message.message_ref(),
                        error = %error,
                        "unable to decrypt message after key update"
                    );
                    RetryOutcome::UnableToDecrypt { message, error }
                }
            })
            .collect()
    }

    /// Drop queued messages, e.g. on unsubscribe.
    pub fn clear_queues(&mut self) {
        self.waiting.clear();
    }

    // Tries the retained keys newest first. A rotation announced by the
    // message takes effect before the next message is looked at.
    fn try_decrypt(&mut self, message: &StreamMessage) -> Result<StreamMessage, CryptoError> {
        if !message.is_encrypted() {
            return Ok(message.clone());
        }
        let publisher = message.publisher_id();
        let candidates = self.keys.candidates(publisher);
        if candidates.is_empty() {
            return Err(CryptoError::UnableToDecrypt(format!(
                "no group key for publisher {publisher}"
            )));
        }

        let mut last_error = None;
        for key in &candidates {
            match decrypt_message(message, key) {
                Ok(decrypted) => {
                    if let Some(new_key) = decrypted.new_key {
                        debug!(publisher = %publisher, key_id = %new_key.id(), "group key rotated");
                        self.keys.set(publisher, new_key);
                    }
                    return Ok(decrypted.message);
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| CryptoError::UnableToDecrypt("no key matched".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::{encrypt_message, encrypt_message_with_new_key};
    use datastream_core::{MessageChain, StreamPartition};

    fn chain() -> MessageChain {
        MessageChain::new(StreamPartition::new("s", 0), "publisher", "c")
    }

    fn ready(outcome: DecryptOutcome) -> StreamMessage {
        match outcome {
            DecryptOutcome::Ready(m) => m,
            other => panic!("expected Ready, got {other:?}"),
        }
    }

    #[test]
    fn test_plaintext_is_ready_without_keys() {
        let mut decryptor = Decryptor::new();
        let msg = chain().next_message(1, "{}");
        assert_eq!(ready(decryptor.decrypt_or_queue(msg.clone())), msg);
    }

    #[test]
    fn test_key_rotation_roundtrip() {
        let k1 = GroupKey::generate();
        let k2 = GroupKey::generate();
        let mut keys = GroupKeyStore::new();
        keys.set("publisher", k1.clone());
        let mut decryptor = Decryptor::with_keys(keys);

        let mut chain = chain();
        let first = chain.next_message(1, r#"{"n":1}"#);
        let second = chain.next_message(2, r#"{"n":2}"#);

        let rotating = encrypt_message_with_new_key(&first, &k1, &k2).unwrap();
        assert_eq!(ready(decryptor.decrypt_or_queue(rotating)), first);
        assert_eq!(decryptor.keys().current("publisher"), Some(&k2));

        let under_k2 = encrypt_message(&second, &k2).unwrap();
        assert_eq!(ready(decryptor.decrypt_or_queue(under_k2)), second);
    }

    #[test]
    fn test_previous_key_still_decrypts_after_rotation() {
        let k1 = GroupKey::generate();
        let k2 = GroupKey::generate();
        let mut keys = GroupKeyStore::new();
        keys.set("publisher", k1.clone());
        keys.set("publisher", k2);
        let mut decryptor = Decryptor::with_keys(keys);

        let msg = chain().next_message(1, r#"{"late":true}"#);
        let late = encrypt_message(&msg, &k1).unwrap();
        assert_eq!(ready(decryptor.decrypt_or_queue(late)), msg);
    }

    #[test]
    fn test_unknown_key_queues_then_resolves_in_order() {
        let key = GroupKey::generate();
        let mut decryptor = Decryptor::new();
        let mut chain = chain();
        let m1 = chain.next_message(1, r#"{"n":1}"#);
        let m2 = chain.next_message(2, r#"{"n":2}"#);

        match decryptor.decrypt_or_queue(encrypt_message(&m1, &key).unwrap()) {
            DecryptOutcome::Queued { key_requested, .. } => assert!(key_requested),
            other => panic!("expected Queued, got {other:?}"),
        }
        match decryptor.decrypt_or_queue(encrypt_message(&m2, &key).unwrap()) {
            DecryptOutcome::Queued { key_requested, .. } => assert!(!key_requested),
            other => panic!("expected Queued, got {other:?}"),
        }
        assert_eq!(decryptor.queued("publisher"), 2);

        let results = decryptor.set_group_key("publisher", key);
        let delivered: Vec<_> = results
            .into_iter()
            .map(|r| match r {
                RetryOutcome::Ready(m) => m,
                RetryOutcome::UnableToDecrypt { .. } => panic!("should decrypt"),
            })
            .collect();
        assert_eq!(delivered, vec![m1, m2]);
        assert_eq!(decryptor.queued("publisher"), 0);
    }

    #[test]
    fn test_plaintext_waits_behind_queued_message() {
        let key = GroupKey::generate();
        let mut decryptor = Decryptor::new();
        let mut chain = chain();
        let plain1 = chain.next_message(1, r#"{"n":1}"#);
        let m1 = encrypt_message(&plain1, &key).unwrap();
        let m2 = chain.next_message(2, r#"{"n":2}"#);

        decryptor.decrypt_or_queue(m1);
        match decryptor.decrypt_or_queue(m2.clone()) {
            DecryptOutcome::Queued { key_requested, .. } => assert!(!key_requested),
            other => panic!("expected Queued, got {other:?}"),
        }
        assert_eq!(decryptor.queued("publisher"), 2);

        let delivered: Vec<_> = decryptor
            .set_group_key("publisher", key)
            .into_iter()
            .map(|r| match r {
                RetryOutcome::Ready(m) => m,
                RetryOutcome::UnableToDecrypt { .. } => panic!("should decrypt"),
            })
            .collect();
        assert_eq!(delivered, vec![plain1, m2]);
    }

    #[test]
    fn test_other_publisher_plaintext_not_blocked() {
        let key = GroupKey::generate();
        let mut decryptor = Decryptor::new();
        let m1 = encrypt_message(&chain().next_message(1, r#"{"n":1}"#), &key).unwrap();
        let other = MessageChain::new(StreamPartition::new("s", 0), "other", "c")
            .next_message(2, r#"{"n":2}"#);

        decryptor.decrypt_or_queue(m1);
        assert!(matches!(decryptor.decrypt_or_queue(other), DecryptOutcome::Ready(_)));
    }

    #[test]
    fn test_wrong_key_gives_unable_to_decrypt() {
        let key = GroupKey::generate();
        let wrong = GroupKey::generate();
        let mut decryptor = Decryptor::new();
        let msg = encrypt_message(&chain().next_message(1, r#"{"secret":1}"#), &key).unwrap();

        decryptor.decrypt_or_queue(msg);
        let results = decryptor.set_group_key("publisher", wrong);
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], RetryOutcome::UnableToDecrypt { .. }));
        assert_eq!(decryptor.queued("publisher"), 0);
    }
}
