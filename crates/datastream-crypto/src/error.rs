//! Error types for the crypto module.

use thiserror::Error;

/// Errors that can occur while encrypting or decrypting content.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Encryption error.
    #[error("encryption error: {0}")]
    EncryptionError(String),

    /// The content could not be decrypted with any known key.
    #[error("unable to decrypt: {0}")]
    UnableToDecrypt(String),

    /// Malformed key material.
    #[error("invalid group key: {0}")]
    InvalidKey(String),

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] datastream_core::CoreError),
}

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
