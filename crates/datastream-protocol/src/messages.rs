//! Control messages the client sends over the transport.

use serde::{Deserialize, Serialize};

use datastream_core::{MessageRef, RequestId, ResendOptions, StreamPartition};
use datastream_order::GapRequest;

/// Requests from the client to the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMessage {
    Subscribe {
        stream: StreamPartition,
        request_id: RequestId,
    },
    Unsubscribe {
        stream: StreamPartition,
        request_id: RequestId,
    },
    ResendLast {
        stream: StreamPartition,
        request_id: RequestId,
        count: u64,
    },
    ResendFrom {
        stream: StreamPartition,
        request_id: RequestId,
        from: MessageRef,
        publisher_id: Option<String>,
        msg_chain_id: Option<String>,
    },
    ResendRange {
        stream: StreamPartition,
        request_id: RequestId,
        from: MessageRef,
        to: MessageRef,
        publisher_id: Option<String>,
        msg_chain_id: Option<String>,
    },
}

impl ControlMessage {
    /// Build the resend request matching `options`.
    pub fn resend(stream: StreamPartition, request_id: RequestId, options: &ResendOptions) -> Self {
        match options.clone() {
            ResendOptions::Last { count } => ControlMessage::ResendLast {
                stream,
                request_id,
                count,
            },
            ResendOptions::From {
                from,
                publisher_id,
                msg_chain_id,
            } => ControlMessage::ResendFrom {
                stream,
                request_id,
                from,
                publisher_id,
                msg_chain_id,
            },
            ResendOptions::Range {
                from,
                to,
                publisher_id,
                msg_chain_id,
            } => ControlMessage::ResendRange {
                stream,
                request_id,
                from,
                to,
                publisher_id,
                msg_chain_id,
            },
        }
    }

    /// Ranged resend of one chain's gap.
    pub fn gap_fill(stream: StreamPartition, request_id: RequestId, gap: &GapRequest) -> Self {
        ControlMessage::ResendRange {
            stream,
            request_id,
            from: gap.from,
            to: gap.to,
            publisher_id: Some(gap.publisher_id.clone()),
            msg_chain_id: Some(gap.msg_chain_id.clone()),
        }
    }

    pub fn stream(&self) -> &StreamPartition {
        match self {
            ControlMessage::Subscribe { stream, .. }
            | ControlMessage::Unsubscribe { stream, .. }
            | ControlMessage::ResendLast { stream, .. }
            | ControlMessage::ResendFrom { stream, .. }
            | ControlMessage::ResendRange { stream, .. } => stream,
        }
    }

    pub fn request_id(&self) -> RequestId {
        match self {
            ControlMessage::Subscribe { request_id, .. }
            | ControlMessage::Unsubscribe { request_id, .. }
            | ControlMessage::ResendLast { request_id, .. }
            | ControlMessage::ResendFrom { request_id, .. }
            | ControlMessage::ResendRange { request_id, .. } => *request_id,
        }
    }

    pub fn is_resend(&self) -> bool {
        matches!(
            self,
            ControlMessage::ResendLast { .. }
                | ControlMessage::ResendFrom { .. }
                | ControlMessage::ResendRange { .. }
        )
    }
}
