//! # Datastream Testkit
//!
//! Testing utilities for the datastream client.
//!
//! ## Overview
//!
//! - **Fixtures**: [`PublisherFixture`] produces the messages a real
//!   publisher would, optionally signed and encrypted, with key rotation
//! - **Generators**: Proptest strategies for arrival orders and refs
//!
//! ## Test Fixtures
//!
//! ```rust
//! use datastream_testkit::fixtures::{test_stream, PublisherFixture};
//!
//! let mut publisher = PublisherFixture::new(test_stream()).signed();
//! let messages = publisher.publish_numbered(3);
//! assert_eq!(messages.len(), 3);
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use datastream_testkit::generators::arrival_order;
//!
//! proptest! {
//!     #[test]
//!     fn delivered_in_order(order in arrival_order(20)) {
//!         // feed messages[i] for i in order
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{numbered, test_stream, PublisherFixture};
pub use generators::{arrival_order, message_ref, resend_spec};
