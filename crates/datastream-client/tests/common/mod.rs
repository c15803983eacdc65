//! Shared harness for client integration tests.

#![allow(dead_code)]

use datastream_client::protocol::{ControlMessage, MemoryTransport, Transport, TransportEvents};
use datastream_client::{
    Client, ClientConfig, StreamMessage, SubscribeOptions, SubscriptionEvent, SubscriptionHandle,
    TransportEvent,
};
use datastream_testkit::fixtures::test_stream;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A client over an in-memory transport, driven by hand.
pub struct Harness {
    pub client: Client<MemoryTransport>,
    pub transport: MemoryTransport,
    events: TransportEvents,
}

impl Harness {
    pub fn new(config: ClientConfig) -> Self {
        init_tracing();
        let (transport, events) = MemoryTransport::new();
        let client = Client::new(transport.clone(), config).unwrap();
        Self {
            client,
            transport,
            events,
        }
    }

    pub async fn connected(config: ClientConfig) -> Self {
        let mut harness = Self::new(config);
        harness.transport.connect().await.unwrap();
        harness.pump().await;
        harness
    }

    /// Feed every pending transport event to the client.
    pub async fn pump(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.client.handle_transport_event(event).await.unwrap();
        }
    }

    pub async fn inject(&mut self, event: TransportEvent) {
        self.transport.inject(event);
        self.pump().await;
    }

    /// Subscribe and confirm it on the network.
    pub async fn subscribed(&mut self, options: SubscribeOptions) -> SubscriptionHandle {
        let stream = options.stream.clone();
        let handle = self.client.subscribe(options).await.unwrap();
        self.pump().await;
        self.inject(TransportEvent::SubscribeResponse { stream }).await;
        handle
    }

    pub async fn broadcast(&mut self, message: StreamMessage) {
        self.inject(TransportEvent::BroadcastMessage(message)).await;
    }

    pub async fn take_sent(&self) -> Vec<ControlMessage> {
        self.transport.take_sent().await
    }

    /// Wait for the next gap timer tick and handle it.
    pub async fn gap_tick(&mut self) {
        let tick = self.client.next_gap_tick().await.unwrap();
        self.client.handle_gap_tick(tick).await.unwrap();
    }

    /// Answer a resend request.
    pub async fn resend(&mut self, request: &ControlMessage, messages: &[StreamMessage]) {
        let request_id = request.request_id();
        let stream = request.stream().clone();
        self.inject(TransportEvent::ResendResponseResending {
            stream: stream.clone(),
            request_id,
        })
        .await;
        for message in messages {
            self.inject(TransportEvent::UnicastMessage {
                request_id,
                message: message.clone(),
            })
            .await;
        }
        let done = if messages.is_empty() {
            TransportEvent::ResendResponseNoResend { stream, request_id }
        } else {
            TransportEvent::ResendResponseResent { stream, request_id }
        };
        self.inject(done).await;
    }
}

/// Options for the default test stream.
pub fn options() -> SubscribeOptions {
    let stream = test_stream();
    SubscribeOptions::new(stream.stream_id, stream.partition)
}

/// Every event that is ready.
pub fn drain(handle: &mut SubscriptionHandle) -> Vec<SubscriptionEvent> {
    std::iter::from_fn(|| handle.try_next_event()).collect()
}

/// The `n` field of every delivered message, in order.
pub fn numbers(events: &[SubscriptionEvent]) -> Vec<i64> {
    events
        .iter()
        .filter_map(|event| match event {
            SubscriptionEvent::Message { content, .. } => content["n"].as_i64(),
            _ => None,
        })
        .collect()
}

/// Event kinds, for asserting on sequences.
pub fn kinds(events: &[SubscriptionEvent]) -> Vec<&'static str> {
    events.iter().map(SubscriptionEvent::kind).collect()
}
