//! What a subscription reports to its consumer.

use datastream_core::{RequestId, StreamMessage};
use datastream_crypto::CryptoError;
use datastream_order::GapRequest;

use crate::error::ProtocolError;

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SubscriptionState {
    #[default]
    Unsubscribed,
    Subscribing,
    Subscribed,
    Unsubscribing,
}

/// Events emitted by a subscription, in the order they happened.
#[derive(Debug)]
pub enum SubscriptionEvent {
    /// A decrypted, in-order message with its parsed content.
    Message {
        message: StreamMessage,
        content: serde_json::Value,
    },
    Subscribed,
    Unsubscribed,
    Resending {
        request_id: RequestId,
    },
    /// All requested history has been delivered.
    Resent {
        request_id: RequestId,
    },
    /// There was no history to deliver.
    NoResend {
        request_id: RequestId,
    },
    /// A chain is missing messages; a gap-fill request is due.
    Gap(GapRequest),
    Error(ProtocolError),
    /// The publisher ended the stream.
    Done,
    /// Messages from this publisher are waiting for a group key.
    KeyMissing {
        publisher_id: String,
    },
    /// A queued message still failed to decrypt after a key update.
    UnableToDecrypt {
        message: StreamMessage,
        error: CryptoError,
    },
}

impl SubscriptionEvent {
    /// Short name, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SubscriptionEvent::Message { .. } => "message",
            SubscriptionEvent::Subscribed => "subscribed",
            SubscriptionEvent::Unsubscribed => "unsubscribed",
            SubscriptionEvent::Resending { .. } => "resending",
            SubscriptionEvent::Resent { .. } => "resent",
            SubscriptionEvent::NoResend { .. } => "no_resend",
            SubscriptionEvent::Gap(_) => "gap",
            SubscriptionEvent::Error(_) => "error",
            SubscriptionEvent::Done => "done",
            SubscriptionEvent::KeyMissing { .. } => "key_missing",
            SubscriptionEvent::UnableToDecrypt { .. } => "unable_to_decrypt",
        }
    }
}
