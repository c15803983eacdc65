//! # Datastream Crypto
//!
//! Group-key encryption for stream content.
//!
//! - [`GroupKey`] - 256-bit symmetric key shared by a publisher
//! - [`GroupKeyStore`] - current and previous key per publisher
//! - [`encrypt_message`] / [`decrypt_message`] - AES-256-CTR content codec
//! - [`Decryptor`] - decrypts in-order messages, queuing those whose key is missing

pub mod decryptor;
pub mod encryption;
pub mod error;
pub mod group_key;
pub mod key_store;

pub use decryptor::{DecryptOutcome, Decryptor, RetryOutcome};
pub use encryption::{
    decrypt, decrypt_message, encrypt, encrypt_message, encrypt_message_with_new_key,
    DecryptedMessage, IV_LEN,
};
pub use error::{CryptoError, Result};
pub use group_key::{GroupKey, GROUP_KEY_LEN};
pub use key_store::{GroupKeyStore, RETAINED_KEYS};
