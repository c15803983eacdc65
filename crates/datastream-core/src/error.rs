//! Error types for the datastream core.

use thiserror::Error;

/// Core errors that can occur while handling stream messages.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid message content: {0}")]
    InvalidContent(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("content is encrypted and cannot be parsed")]
    EncryptedContent,
}

/// Errors raised synchronously when a caller supplies bad configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("conflicting resend options: {0}")]
    ConflictingResendOptions(String),

    #[error("invalid resend options: {0}")]
    InvalidResendOptions(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
