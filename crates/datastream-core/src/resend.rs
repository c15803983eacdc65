//! Resend options: which historical messages a subscription asks for.
//!
//! [`ResendSpec`] mirrors what a caller may write in configuration, where all
//! fields are optional and more than one can be set by mistake.
//! [`ResendOptions`] is the validated form; converting rejects conflicts
//! up front instead of failing on the first message.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::MessageRef;

/// Unvalidated resend request as supplied by a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResendSpec {
    /// Resend the last N messages.
    pub last: Option<u64>,
    /// Resend everything from this ref onwards.
    pub from: Option<MessageRef>,
    /// Upper bound; only valid together with `from`.
    pub to: Option<MessageRef>,
    pub publisher_id: Option<String>,
    pub msg_chain_id: Option<String>,
}

/// Validated resend options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResendOptions {
    Last {
        count: u64,
    },
    From {
        from: MessageRef,
        publisher_id: Option<String>,
        msg_chain_id: Option<String>,
    },
    Range {
        from: MessageRef,
        to: MessageRef,
        publisher_id: Option<String>,
        msg_chain_id: Option<String>,
    },
}

impl TryFrom<ResendSpec> for ResendOptions {
    type Error = ConfigError;

    fn try_from(spec: ResendSpec) -> Result<Self, Self::Error> {
        let has_chain_filter = spec.publisher_id.is_some() || spec.msg_chain_id.is_some();

        match (spec.last, spec.from, spec.to) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => Err(
                ConfigError::ConflictingResendOptions("`last` cannot be combined with `from`/`to`".into()),
            ),
            (Some(count), None, None) => {
                if has_chain_filter {
                    return Err(ConfigError::ConflictingResendOptions(
                        "`last` does not accept a publisher or chain filter".into(),
                    ));
                }
                Ok(ResendOptions::Last { count })
            }
            (None, Some(from), None) => Ok(ResendOptions::From {
                from,
                publisher_id: spec.publisher_id,
                msg_chain_id: spec.msg_chain_id,
            }),
            (None, Some(from), Some(to)) => {
                if to < from {
                    return Err(ConfigError::InvalidResendOptions(format!(
                        "range end {to} is before start {from}"
                    )));
                }
                Ok(ResendOptions::Range {
                    from,
                    to,
                    publisher_id: spec.publisher_id,
                    msg_chain_id: spec.msg_chain_id,
                })
            }
            (None, None, Some(_)) => Err(ConfigError::InvalidResendOptions(
                "`to` requires `from`".into(),
            )),
            (None, None, None) => Err(ConfigError::InvalidResendOptions(
                "one of `last` or `from` is required".into(),
            )),
        }
    }
}

impl ResendSpec {
    /// Validate an optional spec. An all-empty spec means "no resend".
    pub fn into_options(self) -> Result<Option<ResendOptions>, ConfigError> {
        if self == ResendSpec::default() {
            return Ok(None);
        }
        ResendOptions::try_from(self).map(Some)
    }
}
