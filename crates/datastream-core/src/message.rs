//! Stream messages: the unit of data delivered to subscribers.
//!
//! A [`StreamMessage`] is never mutated after it is received. Stages that
//! transform a message (decryption) produce a new value instead.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::types::{ChainKey, MessageRef, StreamPartition};

/// Content key that marks the final message of a stream.
pub const BYE_KEY: &str = "_bye";

/// How the serialized content is to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ContentType {
    Json = 27,
}

/// Encryption applied to the serialized content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EncryptionType {
    /// Plaintext content.
    None = 0,
    /// Content encrypted with the publisher's current group key.
    Aes = 2,
    /// Plaintext is `new_key || content`, encrypted with the current key.
    NewKeyAndAes = 3,
}

impl EncryptionType {
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Signature scheme carried by a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SignatureType {
    None = 0,
    Ed25519 = 1,
}

/// Full identity of a message within the network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId {
    pub stream_id: String,
    pub partition: u32,
    pub timestamp: i64,
    pub sequence_number: u64,
    pub publisher_id: String,
    pub msg_chain_id: String,
}

/// An envelope as received from the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMessage {
    pub message_id: MessageId,
    /// Causal back-reference; chains may omit it.
    pub prev_msg_ref: Option<MessageRef>,
    pub content_type: ContentType,
    pub encryption_type: EncryptionType,
    /// JSON text, or hex of `iv || ciphertext` when encrypted.
    pub serialized_content: String,
    pub signature_type: SignatureType,
    /// Hex-encoded signature.
    pub signature: Option<String>,
}

impl StreamMessage {
    pub fn message_ref(&self) -> MessageRef {
        MessageRef::new(self.message_id.timestamp, self.message_id.sequence_number)
    }

    pub fn prev_msg_ref(&self) -> Option<MessageRef> {
        self.prev_msg_ref
    }

    pub fn publisher_id(&self) -> &str {
        &self.message_id.publisher_id
    }

    pub fn msg_chain_id(&self) -> &str {
        &self.message_id.msg_chain_id
    }

    pub fn stream_id(&self) -> &str {
        &self.message_id.stream_id
    }

    pub fn partition(&self) -> u32 {
        self.message_id.partition
    }

    pub fn stream(&self) -> StreamPartition {
        StreamPartition::new(self.message_id.stream_id.clone(), self.message_id.partition)
    }

    /// The ordering domain this message belongs to.
    pub fn chain_key(&self) -> ChainKey {
        ChainKey::new(
            self.message_id.publisher_id.clone(),
            self.message_id.msg_chain_id.clone(),
        )
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption_type != EncryptionType::None
    }

    /// Parse the plaintext content as JSON.
    pub fn parse_content(&self) -> Result<serde_json::Value> {
        if self.is_encrypted() {
            return Err(CoreError::EncryptedContent);
        }
        match self.content_type {
            ContentType::Json => serde_json::from_str(&self.serialized_content)
                .map_err(|e| CoreError::InvalidContent(e.to_string())),
        }
    }

    /// Copy of this message with replaced content and encryption type.
    ///
    /// The signature is kept as-is: it was computed over the content as
    /// published, and verification happens before any transformation.
    pub fn with_content(&self, serialized_content: String, encryption_type: EncryptionType) -> Self {
        Self {
            serialized_content,
            encryption_type,
            ..self.clone()
        }
    }
}

/// Whether parsed content is the end-of-stream sentinel.
pub fn is_bye_content(content: &serde_json::Value) -> bool {
    content
        .get(BYE_KEY)
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false)
}

/// Creates consecutive messages for one publisher chain.
///
/// Keeps the chain's references consistent: a message published in the same
/// millisecond as (or earlier than) its predecessor is bumped to the
/// predecessor's timestamp with the next sequence number, so refs always
/// increase.
#[derive(Debug, Clone)]
pub struct MessageChain {
    stream: StreamPartition,
    publisher_id: String,
    msg_chain_id: String,
    last: Option<MessageRef>,
    link_previous: bool,
}

impl MessageChain {
    pub fn new(
        stream: StreamPartition,
        publisher_id: impl Into<String>,
        msg_chain_id: impl Into<String>,
    ) -> Self {
        Self {
            stream,
            publisher_id: publisher_id.into(),
            msg_chain_id: msg_chain_id.into(),
            last: None,
            link_previous: true,
        }
    }

    /// Produce messages without `prev_msg_ref` back-references.
    pub fn without_back_references(mut self) -> Self {
        self.link_previous = false;
        self
    }

    /// The ref of the most recently created message.
    pub fn last_ref(&self) -> Option<MessageRef> {
        self.last
    }

    /// Allocate the next ref and return it with its predecessor.
    pub fn next_ref(&mut self, timestamp: i64) -> (MessageRef, Option<MessageRef>) {
        let next = match self.last {
            Some(last) if timestamp <= last.timestamp => last.next_in_sequence(),
            _ => MessageRef::new(timestamp, 0),
        };
        let prev = self.last.replace(next);
        (next, prev)
    }

    /// Create the next plaintext JSON message in this chain.
    pub fn next_message(&mut self, timestamp: i64, content: impl Into<String>) -> StreamMessage {
        let (message_ref, prev) = self.next_ref(timestamp);
        StreamMessage {
            message_id: MessageId {
                stream_id: self.stream.stream_id.clone(),
                partition: self.stream.partition,
                timestamp: message_ref.timestamp,
                sequence_number: message_ref.sequence_number,
                publisher_id: self.publisher_id.clone(),
                msg_chain_id: self.msg_chain_id.clone(),
            },
            prev_msg_ref: if self.link_previous { prev } else { None },
            content_type: ContentType::Json,
            encryption_type: EncryptionType::None,
            serialized_content: content.into(),
            signature_type: SignatureType::None,
            signature: None,
        }
    }
}
