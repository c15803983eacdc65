//! Publisher signatures.
//!
//! Publishers are identified by the hex encoding of their Ed25519 public key.
//! A signature covers the canonical signing payload of a message (see
//! [`crate::canonical`]), never the transport framing.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::canonical::signing_payload;
use crate::error::{CoreError, Result};
use crate::message::{SignatureType, StreamMessage};

/// A 32-byte Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublisherKey(pub [u8; 32]);

impl PublisherKey {
    /// Convert to the hex form used as a publisher id.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a publisher id back into a key.
    pub fn from_hex(s: &str) -> std::result::Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(arr))
    }

    /// Verify a signature over raw bytes.
    pub fn verify(&self, message: &[u8], signature: &MessageSignature) -> Result<()> {
        let verifying_key =
            VerifyingKey::from_bytes(&self.0).map_err(|_| CoreError::InvalidPublicKey)?;
        let sig = Signature::from_bytes(&signature.0);
        verifying_key
            .verify(message, &sig)
            .map_err(|_| CoreError::InvalidSignature)
    }
}

impl fmt::Debug for PublisherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublisherKey({})", &self.to_hex()[..16])
    }
}

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MessageSignature(pub [u8; 64]);

impl MessageSignature {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|_| CoreError::InvalidSignature)?;
        let arr: [u8; 64] = bytes.try_into().map_err(|_| CoreError::InvalidSignature)?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for MessageSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageSignature({}...)", &self.to_hex()[..16])
    }
}

/// A publisher's signing identity.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            signing_key: SigningKey::generate(&mut rng),
        }
    }

    /// Create from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    pub fn public_key(&self) -> PublisherKey {
        PublisherKey(self.signing_key.verifying_key().to_bytes())
    }

    /// The publisher id messages signed by this keypair must carry.
    pub fn publisher_id(&self) -> String {
        self.public_key().to_hex()
    }

    /// Sign a message, returning a signed copy.
    ///
    /// The message's publisher id must match this keypair; anything else
    /// would produce a message no verifier accepts.
    pub fn sign_message(&self, message: &StreamMessage) -> Result<StreamMessage> {
        if message.publisher_id() != self.publisher_id() {
            return Err(CoreError::InvalidPublicKey);
        }
        let payload = signing_payload(message)?;
        let sig = self.signing_key.sign(&payload);

        let mut signed = message.clone();
        signed.signature_type = SignatureType::Ed25519;
        signed.signature = Some(hex::encode(sig.to_bytes()));
        Ok(signed)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({:?})", self.public_key())
    }
}

/// Check the signature carried by a message against its publisher id.
///
/// Unsigned messages fail with [`CoreError::InvalidSignature`]; whether an
/// unsigned message is acceptable is a policy decision made by the caller.
pub fn verify_message_signature(message: &StreamMessage) -> Result<()> {
    let signature = match (&message.signature_type, &message.signature) {
        (SignatureType::Ed25519, Some(sig)) => MessageSignature::from_hex(sig)?,
        _ => return Err(CoreError::InvalidSignature),
    };
    let publisher =
        PublisherKey::from_hex(message.publisher_id()).map_err(|_| CoreError::InvalidPublicKey)?;
    let payload = signing_payload(message)?;
    publisher.verify(&payload, &signature)
}
