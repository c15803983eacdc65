//! Strong type definitions for the datastream client.
//!
//! Identifiers are newtypes so a subscription id can never be passed where a
//! resend request id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Position of a message within its chain.
///
/// Ordered lexicographically by `(timestamp, sequence_number)`; the derived
/// `Ord` relies on the field order below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    /// Publisher-assigned timestamp (Unix milliseconds).
    pub timestamp: i64,
    /// Disambiguates messages sharing a timestamp.
    pub sequence_number: u64,
}

impl MessageRef {
    /// Create a new message reference.
    pub const fn new(timestamp: i64, sequence_number: u64) -> Self {
        Self {
            timestamp,
            sequence_number,
        }
    }

    /// The smallest ref strictly after this one.
    ///
    /// Used as the lower bound of a gap-fill range. An exhausted sequence
    /// carries into the next millisecond; the very last ref maps to itself.
    pub const fn next_in_sequence(&self) -> Self {
        match self.sequence_number.checked_add(1) {
            Some(sequence_number) => Self {
                timestamp: self.timestamp,
                sequence_number,
            },
            None => match self.timestamp.checked_add(1) {
                Some(timestamp) => Self {
                    timestamp,
                    sequence_number: 0,
                },
                None => *self,
            },
        }
    }
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.timestamp, self.sequence_number)
    }
}

/// A stream together with one of its partitions.
///
/// This is the unit the network subscribes to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamPartition {
    pub stream_id: String,
    pub partition: u32,
}

impl StreamPartition {
    pub fn new(stream_id: impl Into<String>, partition: u32) -> Self {
        Self {
            stream_id: stream_id.into(),
            partition,
        }
    }
}

impl fmt::Display for StreamPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.stream_id, self.partition)
    }
}

/// Identifies an independent ordering domain: one publisher's message chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainKey {
    pub publisher_id: String,
    pub msg_chain_id: String,
}

impl ChainKey {
    pub fn new(publisher_id: impl Into<String>, msg_chain_id: impl Into<String>) -> Self {
        Self {
            publisher_id: publisher_id.into(),
            msg_chain_id: msg_chain_id.into(),
        }
    }
}

impl fmt::Display for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.publisher_id, self.msg_chain_id)
    }
}

/// Local identifier of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Identifier correlating a resend request with its responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Monotonic id source handed to whoever needs fresh ids.
///
/// Owned by the client rather than living in a static, so independent
/// clients (and tests) never share counters.
#[derive(Debug, Default)]
pub struct IdGenerator {
    subscriptions: AtomicU64,
    requests: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next subscription id.
    pub fn next_subscription_id(&self) -> SubscriptionId {
        SubscriptionId(self.subscriptions.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocate the next request id.
    pub fn next_request_id(&self) -> RequestId {
        RequestId(self.requests.fetch_add(1, Ordering::Relaxed))
    }
}
