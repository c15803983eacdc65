//! # Datastream Protocol
//!
//! Everything between the transport and the consumer of one subscription.
//!
//! ## Overview
//!
//! A [`Subscription`] receives the raw messages of a stream partition,
//! verifies them, restores per-chain order, decrypts them and reports the
//! result as [`SubscriptionEvent`]s. The [`Transport`] trait abstracts the
//! connection the client drives subscriptions from.
//!
//! ## Message Flow
//!
//! ```text
//! Client                      Network
//!   |-------- Subscribe -------->|
//!   |<------- SubscribeResponse -|
//!   |-------- ResendLast ------->|
//!   |<------- Resending ---------|
//!   |<------- UnicastMessage * --|
//!   |<------- Resent ------------|
//!   |<------- BroadcastMessage *-|
//!   |-------- ResendRange ------>|   (gap fill)
//! ```

pub mod error;
pub mod events;
pub mod messages;
pub mod subscription;
pub mod transport;
pub mod verify;

pub use error::{ProtocolError, Result};
pub use events::{SubscriptionEvent, SubscriptionState};
pub use messages::ControlMessage;
pub use subscription::{Subscription, SubscriptionChannels, SubscriptionConfig};
pub use transport::{
    memory::{MemoryTransport, TransportEvents},
    Transport, TransportEvent,
};
pub use verify::{AcceptAll, SignatureVerifier, Verifier, VerifyError, VerifyPolicy};
