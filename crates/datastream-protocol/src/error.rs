//! Error types for the protocol module.

use thiserror::Error;

use datastream_core::{MessageRef, RequestId, StreamMessage};

use crate::verify::VerifyError;

/// Errors surfaced by subscriptions and transports.
///
/// Apart from transport failures these reach the consumer as
/// [`SubscriptionEvent::Error`](crate::SubscriptionEvent::Error) rather than
/// as return values.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The transport is not connected.
    #[error("not connected")]
    NotConnected,

    /// Signature check rejected the message.
    #[error("invalid signature on {publisher_id} message {msg_ref}")]
    InvalidSignature {
        publisher_id: String,
        msg_ref: MessageRef,
    },

    /// Signature could not be checked.
    #[error("verification error: {0}")]
    Verification(#[from] VerifyError),

    /// A resent message arrived for a request that is not pending.
    #[error("unexpected resend response for {request_id}")]
    UnexpectedResend { request_id: RequestId },

    /// The network could not decode a message's payload.
    #[error("invalid payload: {reason}")]
    InvalidPayload {
        message: Option<Box<StreamMessage>>,
        reason: String,
    },

    /// The network rejected a resend request.
    #[error("resend {request_id} failed: {reason}")]
    ResendFailed { request_id: RequestId, reason: String },

    /// Error reported by the network without a request to attach it to.
    #[error("server error: {0}")]
    Server(String),

    /// Ordering error.
    #[error(transparent)]
    Order(#[from] datastream_order::OrderError),

    /// Crypto error.
    #[error(transparent)]
    Crypto(#[from] datastream_crypto::CryptoError),

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] datastream_core::CoreError),
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
