//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use serde_json::json;

use datastream_core::{Keypair, MessageChain, StreamMessage, StreamPartition};
use datastream_crypto::{encrypt_message, encrypt_message_with_new_key, GroupKey};

/// The stream partition tests publish to unless they need another.
pub fn test_stream() -> StreamPartition {
    StreamPartition::new("test-stream", 0)
}

/// Content `{"n": n}`.
pub fn numbered(n: i64) -> serde_json::Value {
    json!({ "n": n })
}

/// A publisher with its own key pair and message chain.
pub struct PublisherFixture {
    pub keypair: Keypair,
    chain: MessageChain,
    group_key: Option<GroupKey>,
    sign: bool,
    clock: i64,
}

impl PublisherFixture {
    /// Create a publisher with a random key pair.
    pub fn new(stream: StreamPartition) -> Self {
        Self::from_keypair(stream, Keypair::generate())
    }

    /// Create with a deterministic key pair from seed.
    pub fn with_seed(stream: StreamPartition, seed: [u8; 32]) -> Self {
        Self::from_keypair(stream, Keypair::from_seed(&seed))
    }

    fn from_keypair(stream: StreamPartition, keypair: Keypair) -> Self {
        let chain = MessageChain::new(stream, keypair.publisher_id(), "chain-0");
        Self {
            keypair,
            chain,
            group_key: None,
            sign: false,
            clock: 0,
        }
    }

    /// Sign every published message.
    pub fn signed(mut self) -> Self {
        self.sign = true;
        self
    }

    /// Encrypt every published message under `key`.
    pub fn encrypted(mut self, key: GroupKey) -> Self {
        self.group_key = Some(key);
        self
    }

    /// Publish without back-references.
    pub fn without_back_references(mut self) -> Self {
        self.chain = self.chain.without_back_references();
        self
    }

    pub fn publisher_id(&self) -> String {
        self.keypair.publisher_id()
    }

    /// The key messages are currently encrypted with.
    pub fn group_key(&self) -> Option<&GroupKey> {
        self.group_key.as_ref()
    }

    /// Publish `content` at the next millisecond.
    pub fn publish(&mut self, content: &serde_json::Value) -> StreamMessage {
        self.clock += 1;
        let message = self.chain.next_message(self.clock, content.to_string());
        let message = match &self.group_key {
            Some(key) => encrypt_message(&message, key).expect("encrypt fixture message"),
            None => message,
        };
        self.finish(message)
    }

    /// Publish `content` in the clear, even from an encrypting publisher.
    pub fn publish_plain(&mut self, content: &serde_json::Value) -> StreamMessage {
        let key = self.group_key.take();
        let message = self.publish(content);
        self.group_key = key;
        message
    }

    /// Publish `count` messages with contents `{"n": 1}`, `{"n": 2}`, ...
    pub fn publish_numbered(&mut self, count: i64) -> Vec<StreamMessage> {
        (1..=count).map(|n| self.publish(&numbered(n))).collect()
    }

    /// Publish `content` announcing a fresh group key, then switch to it.
    ///
    /// Returns the message and the new key.
    pub fn publish_rotating(&mut self, content: &serde_json::Value) -> (StreamMessage, GroupKey) {
        let current = self
            .group_key
            .clone()
            .expect("rotation requires an encrypted publisher");
        let next = GroupKey::generate();

        self.clock += 1;
        let message = self.chain.next_message(self.clock, content.to_string());
        let message = encrypt_message_with_new_key(&message, &current, &next)
            .expect("encrypt fixture message");
        self.group_key = Some(next.clone());
        (self.finish(message), next)
    }

    /// Publish the end-of-stream sentinel.
    pub fn publish_bye(&mut self) -> StreamMessage {
        self.publish(&json!({ "_bye": true }))
    }

    fn finish(&self, message: StreamMessage) -> StreamMessage {
        if self.sign {
            self.keypair
                .sign_message(&message)
                .expect("sign fixture message")
        } else {
            message
        }
    }
}

/// Create publishers with deterministic seeds on the same stream.
pub fn multi_publisher_fixtures(stream: StreamPartition, count: usize) -> Vec<PublisherFixture> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = i as u8;
            seed[31] = 0xd5;
            PublisherFixture::with_seed(stream.clone(), seed)
        })
        .collect()
}
