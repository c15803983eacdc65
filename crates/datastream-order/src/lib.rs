//! # Datastream Order
//!
//! Turns the arbitrary arrival order of a subscription's messages into
//! strict per-chain order.
//!
//! ## Key Types
//!
//! - [`ChainReorderBuffer`] - Orders one (publisher, chain) and tracks its gap
//! - [`ChainReorderRegistry`] - Lazily creates a buffer per chain
//! - [`GapTimer`] - Task posting [`GapTick`]s while a gap is open
//! - [`GapRequest`] - The range a gap tick asks to be resent
//!
//! ## Design Notes
//!
//! - **Exactly once, in order**: refs at or below a chain's high-water mark
//!   are dropped
//! - **Bounded retries**: a gap produces at most `max_gap_requests` requests,
//!   then [`OrderError::GapFillFailed`]
//! - **Scoped timers**: dropping a buffer or clearing its gap aborts the timer
//!   task; ticks from an earlier arming are recognised by generation

pub mod buffer;
pub mod error;
pub mod registry;
pub mod timer;

pub use buffer::{
    ChainReorderBuffer, GapFillConfig, GapRequest, DEFAULT_GAP_FILL_INTERVAL,
    DEFAULT_MAX_GAP_REQUESTS,
};
pub use error::{OrderError, Result};
pub use registry::{ChainReorderRegistry, OrderingConfig};
pub use timer::{gap_tick_channel, GapTick, GapTickReceiver, GapTickSender, GapTimer};
