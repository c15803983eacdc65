//! # Datastream Client
//!
//! Subscriber side of a publish/subscribe data network.
//!
//! ## Overview
//!
//! The network delivers messages in whatever order fan-out, resends and
//! reconnects produce. The client hands each subscriber every message of a
//! publisher's chain exactly once and in order, requests missing ranges
//! again when a chain has a hole, and decrypts content with group keys
//! rotated by the publishers.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use datastream_client::{Client, ClientConfig, SubscribeOptions, SubscriptionEvent};
//! use datastream_client::protocol::MemoryTransport;
//!
//! async fn example() {
//!     let (transport, events) = MemoryTransport::new();
//!     let mut client = Client::new(transport, ClientConfig::default()).unwrap();
//!
//!     let mut handle = client
//!         .subscribe(SubscribeOptions::new("sensors/temperature", 0))
//!         .await
//!         .unwrap();
//!
//!     tokio::spawn(async move { client.run(events).await });
//!
//!     while let Some(event) = handle.next_event().await {
//!         if let SubscriptionEvent::Message { content, .. } = event {
//!             // use content
//!             let _ = content;
//!         }
//!     }
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `datastream_client::core` - Message refs, stream messages, signing
//! - `datastream_client::crypto` - Group keys and content encryption
//! - `datastream_client::order` - Per-chain reorder buffers
//! - `datastream_client::protocol` - Subscriptions, transport, verification

pub mod client;
pub mod config;
pub mod error;

// Re-export component crates
pub use datastream_core as core;
pub use datastream_crypto as crypto;
pub use datastream_order as order;
pub use datastream_protocol as protocol;

// Re-export main types for convenience
pub use client::{Client, SubscribeOptions, SubscriptionHandle};
pub use config::ClientConfig;
pub use error::{ClientError, Result};

pub use datastream_core::{MessageRef, ResendOptions, ResendSpec, StreamMessage, StreamPartition};
pub use datastream_crypto::GroupKey;
pub use datastream_protocol::{SubscriptionEvent, SubscriptionState, TransportEvent};
