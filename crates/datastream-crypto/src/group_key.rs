//! Symmetric group keys.

use rand::RngCore;
use std::fmt;

use crate::error::{CryptoError, Result};

/// Length of a group key in bytes (AES-256).
pub const GROUP_KEY_LEN: usize = 32;

/// A 256-bit symmetric key shared by a publisher with its subscribers.
///
/// The length is fixed by the type; there is no way to construct a key of a
/// different size.
#[derive(Clone, PartialEq, Eq)]
pub struct GroupKey([u8; GROUP_KEY_LEN]);

impl GroupKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; GROUP_KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; GROUP_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, which must be exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; GROUP_KEY_LEN] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "expected {GROUP_KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    /// Parse from hex.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; GROUP_KEY_LEN] {
        &self.0
    }

    /// A short public identifier for this key.
    ///
    /// Derived with Blake3 so it can be logged or sent in key requests
    /// without revealing the key.
    pub fn id(&self) -> String {
        let mut hasher = blake3::Hasher::new_derive_key("datastream-group-key-id-v0");
        hasher.update(&self.0);
        hasher.finalize().to_hex().as_str()[..16].to_string()
    }
}

impl fmt::Debug for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupKey({})", self.id())
    }
}
