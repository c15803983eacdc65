//! Message verification.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use datastream_core::{verify_message_signature, CoreError, SignatureType, StreamMessage};

/// Failure to run a verification, as opposed to a negative result.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The signature or key could not be decoded.
    #[error("malformed signature material: {0}")]
    Malformed(#[from] CoreError),

    /// A verifier backend failed.
    #[error("verifier unavailable: {0}")]
    Unavailable(String),
}

/// Decides whether a message may enter the pipeline.
#[async_trait]
pub trait Verifier: Send + Sync {
    /// `Ok(false)` rejects the message.
    async fn verify(&self, message: &StreamMessage) -> Result<bool, VerifyError>;
}

/// When signatures are checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyPolicy {
    /// Check signed messages, accept unsigned ones.
    #[default]
    Auto,
    /// Check everything; unsigned messages are rejected.
    Always,
    /// Accept everything.
    Never,
}

/// Checks Ed25519 publisher signatures.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureVerifier {
    policy: VerifyPolicy,
}

impl SignatureVerifier {
    pub fn new(policy: VerifyPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> VerifyPolicy {
        self.policy
    }
}

#[async_trait]
impl Verifier for SignatureVerifier {
    async fn verify(&self, message: &StreamMessage) -> Result<bool, VerifyError> {
        if self.policy == VerifyPolicy::Never {
            return Ok(true);
        }
        let signed = message.signature_type != SignatureType::None && message.signature.is_some();
        if !signed {
            return Ok(self.policy == VerifyPolicy::Auto);
        }
        match verify_message_signature(message) {
            Ok(()) => Ok(true),
            Err(CoreError::InvalidSignature) => Ok(false),
            Err(e) => Err(VerifyError::Malformed(e)),
        }
    }
}

/// Accepts every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

#[async_trait]
impl Verifier for AcceptAll {
    async fn verify(&self, _message: &StreamMessage) -> Result<bool, VerifyError> {
        Ok(true)
    }
}
