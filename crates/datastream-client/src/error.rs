//! Error types for the client.

use datastream_core::{ConfigError, SubscriptionId};
use datastream_protocol::ProtocolError;
use thiserror::Error;

/// Errors returned by [`Client`](crate::Client) calls.
///
/// Per-message failures are not errors here; they arrive as subscription
/// events.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Invalid configuration or subscribe options.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transport or protocol failure.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// No subscription with this id.
    #[error("unknown subscription: {0}")]
    UnknownSubscription(SubscriptionId),

    /// Configuration could not be parsed.
    #[error("invalid configuration document: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
