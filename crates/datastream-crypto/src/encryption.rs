//! Content encryption: AES-256 in counter mode.
//!
//! Ciphertext layout is `iv (16 bytes) || keystream-xored plaintext`, hex
//! encoded when stored in a message. Counter mode carries no authentication
//! tag, so a wrong key is detected by the decrypted content failing to parse
//! as the message's declared content type.
//!
//! Key rotation rides inside the payload: a `NewKeyAndAes` message encrypts
//! `new_key || content` under the current key.

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;

use datastream_core::{ContentType, EncryptionType, StreamMessage};

use crate::error::{CryptoError, Result};
use crate::group_key::{GroupKey, GROUP_KEY_LEN};

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// Length of the random IV prefixed to every ciphertext.
pub const IV_LEN: usize = 16;

/// Encrypt bytes under a group key with a fresh random IV.
pub fn encrypt(plaintext: &[u8], key: &GroupKey) -> Result<Vec<u8>> {
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);

    let mut cipher = Aes256Ctr::new_from_slices(key.as_bytes(), &iv)
        .map_err(|e| CryptoError::EncryptionError(e.to_string()))?;

    let mut out = Vec::with_capacity(IV_LEN + plaintext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(plaintext);
    cipher.apply_keystream(&mut out[IV_LEN..]);
    Ok(out)
}

/// Decrypt bytes produced by [`encrypt`].
///
/// Succeeds for any key; callers must validate the plaintext.
pub fn decrypt(ciphertext: &[u8], key: &GroupKey) -> Result<Vec<u8>> {
    if ciphertext.len() < IV_LEN {
        return Err(CryptoError::UnableToDecrypt(format!(
            "ciphertext shorter than IV ({} bytes)",
            ciphertext.len()
        )));
    }
    let (iv, body) = ciphertext.split_at(IV_LEN);

    let mut cipher = Aes256Ctr::new_from_slices(key.as_bytes(), iv)
        .map_err(|e| CryptoError::UnableToDecrypt(e.to_string()))?;

    let mut out = body.to_vec();
    cipher.apply_keystream(&mut out);
    Ok(out)
}

/// Encrypt a plaintext message for publishing.
pub fn encrypt_message(message: &StreamMessage, key: &GroupKey) -> Result<StreamMessage> {
    ensure_plaintext(message)?;
    let ciphertext = encrypt(message.serialized_content.as_bytes(), key)?;
    Ok(message.with_content(hex::encode(ciphertext), EncryptionType::Aes))
}

/// Encrypt a plaintext message and announce `new_key` inside it.
///
/// Subscribers holding `key` pick up `new_key` while decrypting and use it
/// for the publisher's following messages.
pub fn encrypt_message_with_new_key(
    message: &StreamMessage,
    key: &GroupKey,
    new_key: &GroupKey,
) -> Result<StreamMessage> {
    ensure_plaintext(message)?;
    let mut plaintext = Vec::with_capacity(GROUP_KEY_LEN + message.serialized_content.len());
    plaintext.extend_from_slice(new_key.as_bytes());
    plaintext.extend_from_slice(message.serialized_content.as_bytes());

    let ciphertext = encrypt(&plaintext, key)?;
    Ok(message.with_content(hex::encode(ciphertext), EncryptionType::NewKeyAndAes))
}

/// Result of decrypting a message.
#[derive(Debug, Clone)]
pub struct DecryptedMessage {
    /// A plaintext copy of the input message.
    pub message: StreamMessage,
    /// Key announced by a `NewKeyAndAes` message.
    pub new_key: Option<GroupKey>,
}

/// Decrypt a message with one candidate key.
///
/// Plaintext messages pass through unchanged, which makes decrypting twice
/// harmless. The input is never modified.
pub fn decrypt_message(message: &StreamMessage, key: &GroupKey) -> Result<DecryptedMessage> {
    let ciphertext = match message.encryption_type {
        EncryptionType::None => {
            return Ok(DecryptedMessage {
                message: message.clone(),
                new_key: None,
            })
        }
        EncryptionType::Aes | EncryptionType::NewKeyAndAes => hex::decode(&message.serialized_content)
            .map_err(|e| CryptoError::UnableToDecrypt(format!("content is not hex: {e}")))?,
    };

    let plaintext = decrypt(&ciphertext, key)?;

    let (new_key, content) = if message.encryption_type == EncryptionType::NewKeyAndAes {
        if plaintext.len() < GROUP_KEY_LEN {
            return Err(CryptoError::UnableToDecrypt(
                "payload too short to carry a new key".into(),
            ));
        }
        let (key_bytes, content) = plaintext.split_at(GROUP_KEY_LEN);
        (Some(GroupKey::from_slice(key_bytes)?), content)
    } else {
        (None, plaintext.as_slice())
    };

    let content = validate_plaintext(message.content_type, content)?;
    Ok(DecryptedMessage {
        message: message.with_content(content, EncryptionType::None),
        new_key,
    })
}

fn validate_plaintext(content_type: ContentType, content: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(content)
        .map_err(|_| CryptoError::UnableToDecrypt("plaintext is not UTF-8".into()))?;
    match content_type {
        // A wrong key yields random bytes, which essentially never form valid JSON.
        ContentType::Json => {
            serde_json::from_str::<serde::de::IgnoredAny>(text).map_err(|_| {
                CryptoError::UnableToDecrypt("plaintext is not valid JSON".into())
            })?;
        }
    }
    Ok(text.to_string())
}

fn ensure_plaintext(message: &StreamMessage) -> Result<()> {
    if message.is_encrypted() {
        return Err(CryptoError::EncryptionError(
            "message is already encrypted".into(),
        ));
    }
    Ok(())
}
