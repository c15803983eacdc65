//! Transport abstraction.
//!
//! The transport owns the connection to the network. It accepts
//! [`ControlMessage`]s and reports everything that happens on the connection
//! as [`TransportEvent`]s, which the client consumes in order.

use async_trait::async_trait;

use datastream_core::{RequestId, StreamMessage, StreamPartition};

use crate::error::Result;
use crate::messages::ControlMessage;

/// Something that happened on the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    /// Connection-level failure.
    Error(String),
    SubscribeResponse {
        stream: StreamPartition,
    },
    UnsubscribeResponse {
        stream: StreamPartition,
    },
    ResendResponseResending {
        stream: StreamPartition,
        request_id: RequestId,
    },
    ResendResponseResent {
        stream: StreamPartition,
        request_id: RequestId,
    },
    ResendResponseNoResend {
        stream: StreamPartition,
        request_id: RequestId,
    },
    /// Error reply to a request. Without a request id it concerns the
    /// connection as a whole.
    ErrorResponse {
        request_id: Option<RequestId>,
        message: String,
    },
    /// Live message fanned out to every subscriber of its stream.
    BroadcastMessage(StreamMessage),
    /// Historical message answering a resend request.
    UnicastMessage {
        request_id: RequestId,
        message: StreamMessage,
    },
    /// A frame whose envelope decoded but whose payload did not.
    InvalidPayload {
        message: Option<StreamMessage>,
        reason: String,
    },
}

/// Transport trait for talking to the network.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the connection. Completion is also reported as
    /// [`TransportEvent::Connected`].
    async fn connect(&self) -> Result<()>;

    /// Close the connection.
    async fn disconnect(&self) -> Result<()>;

    /// Send a control message.
    async fn send(&self, message: ControlMessage) -> Result<()>;

    /// Whether the connection is currently open.
    fn is_connected(&self) -> bool;
}

/// An in-memory transport for testing.
///
/// Records every sent message and lets the test inject events.
pub mod memory {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::sync::{mpsc, Mutex};
    use tracing::trace;

    use crate::error::ProtocolError;

    /// Receiving side of a [`MemoryTransport`]'s events.
    pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

    struct Inner {
        connected: AtomicBool,
        sent: Mutex<Vec<ControlMessage>>,
        events: mpsc::UnboundedSender<TransportEvent>,
    }

    /// In-memory transport implementation. Clones share state.
    #[derive(Clone)]
    pub struct MemoryTransport {
        inner: Arc<Inner>,
    }

    impl MemoryTransport {
        /// Create a disconnected transport and the stream of its events.
        pub fn new() -> (Self, TransportEvents) {
            let (tx, rx) = mpsc::unbounded_channel();
            let transport = Self {
                inner: Arc::new(Inner {
                    connected: AtomicBool::new(false),
                    sent: Mutex::new(Vec::new()),
                    events: tx,
                }),
            };
            (transport, rx)
        }

        /// Deliver an event as if it came from the network.
        pub fn inject(&self, event: TransportEvent) {
            match &event {
                TransportEvent::Connected => self.inner.connected.store(true, Ordering::SeqCst),
                TransportEvent::Disconnected => self.inner.connected.store(false, Ordering::SeqCst),
                _ => {}
            }
            if self.inner.events.send(event).is_err() {
                trace!("event receiver dropped");
            }
        }

        /// Everything sent so far.
        pub async fn sent(&self) -> Vec<ControlMessage> {
            self.inner.sent.lock().await.clone()
        }

        /// Everything sent so far, clearing the record.
        pub async fn take_sent(&self) -> Vec<ControlMessage> {
            std::mem::take(&mut *self.inner.sent.lock().await)
        }
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn connect(&self) -> Result<()> {
            self.inject(TransportEvent::Connected);
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            self.inject(TransportEvent::Disconnected);
            Ok(())
        }

        async fn send(&self, message: ControlMessage) -> Result<()> {
            if !self.is_connected() {
                return Err(ProtocolError::NotConnected);
            }
            self.inner.sent.lock().await.push(message);
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.inner.connected.load(Ordering::SeqCst)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryTransport;
    use super::*;

    #[tokio::test]
    async fn test_memory_transport_records_sends() {
        let (transport, mut events) = MemoryTransport::new();
        let msg = ControlMessage::Subscribe {
            stream: StreamPartition::new("s", 0),
            request_id: RequestId(0),
        };

        assert!(transport.send(msg.clone()).await.is_err());

        transport.connect().await.unwrap();
        assert_eq!(events.recv().await, Some(TransportEvent::Connected));
        transport.send(msg.clone()).await.unwrap();

        assert_eq!(transport.sent().await, vec![msg.clone()]);
        assert_eq!(transport.take_sent().await, vec![msg]);
        assert!(transport.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_is_reported() {
        let (transport, mut events) = MemoryTransport::new();
        transport.connect().await.unwrap();
        transport.disconnect().await.unwrap();

        assert!(!transport.is_connected());
        assert_eq!(events.recv().await, Some(TransportEvent::Connected));
        assert_eq!(events.recv().await, Some(TransportEvent::Disconnected));
    }
}
