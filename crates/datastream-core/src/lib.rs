//! # Datastream Core
//!
//! Pure primitives for the datastream client: message references, stream
//! messages, publisher signatures, and resend options.
//!
//! This crate contains no I/O, no timers, no networking.
//!
//! ## Key Types
//!
//! - [`MessageRef`] - `(timestamp, sequence_number)`, the total order within a chain
//! - [`StreamMessage`] - An envelope as received from the network
//! - [`ChainKey`] - `(publisher, chain)`, an independent ordering domain
//! - [`ResendOptions`] - Validated historical-data request
//! - [`IdGenerator`] - Source of subscription and request ids

pub mod canonical;
pub mod error;
pub mod message;
pub mod resend;
pub mod signing;
pub mod types;

pub use canonical::signing_payload;
pub use error::{ConfigError, CoreError, Result};
pub use message::{
    is_bye_content, ContentType, EncryptionType, MessageChain, MessageId, SignatureType,
    StreamMessage, BYE_KEY,
};
pub use resend::{ResendOptions, ResendSpec};
pub use signing::{verify_message_signature, Keypair, MessageSignature, PublisherKey};
pub use types::{ChainKey, IdGenerator, MessageRef, RequestId, StreamPartition, SubscriptionId};
