//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use datastream_core::ConfigError;
use datastream_order::{GapFillConfig, OrderingConfig};
use datastream_protocol::VerifyPolicy;

use crate::error::Result;

/// Configuration for the client.
///
/// Every field has a default, so a configuration document only needs the
/// values it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Milliseconds between gap-fill requests.
    pub gap_fill_interval_ms: u64,
    /// Gap-fill requests per gap before giving up.
    pub max_gap_requests: u32,
    /// Restore per-chain order. When off, messages are delivered as they arrive.
    pub order_messages: bool,
    /// Request missing messages when a gap is detected.
    pub gap_fill: bool,
    pub verify_signatures: VerifyPolicy,
    /// Connect on the first subscribe if not connected.
    pub auto_connect: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            gap_fill_interval_ms: 5_000,
            max_gap_requests: 10,
            order_messages: true,
            gap_fill: true,
            verify_signatures: VerifyPolicy::Auto,
            auto_connect: true,
        }
    }
}

impl ClientConfig {
    /// Parse a JSON configuration document and validate it.
    pub fn from_json(document: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.gap_fill_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "gap_fill_interval_ms",
                reason: "must be positive".into(),
            });
        }
        if self.max_gap_requests == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_gap_requests",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    pub fn gap_fill_interval(&self) -> Duration {
        Duration::from_millis(self.gap_fill_interval_ms)
    }

    /// Ordering settings every subscription starts from.
    pub fn ordering(&self) -> OrderingConfig {
        OrderingConfig {
            order_messages: self.order_messages,
            gap_fill: GapFillConfig {
                interval: self.gap_fill_interval(),
                max_gap_requests: self.max_gap_requests,
                enabled: self.gap_fill,
            },
        }
    }
}
