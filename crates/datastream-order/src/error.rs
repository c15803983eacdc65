//! Error types for the ordering module.

use thiserror::Error;

use datastream_core::{ChainKey, MessageRef};

/// Errors raised by reorder buffers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// A gap stayed open after the maximum number of resend requests.
    ///
    /// The chain cannot make forward progress past `from`.
    #[error("gap fill failed for {chain}: {from} to {to} still missing after {attempts} requests")]
    GapFillFailed {
        chain: ChainKey,
        from: MessageRef,
        to: MessageRef,
        attempts: u32,
    },
}

/// Result type for ordering operations.
pub type Result<T> = std::result::Result<T, OrderError>;
