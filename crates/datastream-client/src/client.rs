//! The client: coordinates subscriptions over one transport.
//!
//! Several local subscriptions may share a stream partition; the network
//! only ever sees one subscribe and one unsubscribe per partition. Transport
//! events and gap timer ticks are processed one at a time on the task that
//! drives the client, so subscription state needs no locking.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use datastream_core::{
    ConfigError, IdGenerator, RequestId, ResendSpec, StreamMessage, StreamPartition,
    SubscriptionId,
};
use datastream_crypto::{GroupKey, GroupKeyStore};
use datastream_order::{gap_tick_channel, GapFillConfig, GapTick, GapTickReceiver, GapTickSender};
use datastream_protocol::{
    ControlMessage, ProtocolError, SignatureVerifier, Subscription, SubscriptionConfig,
    SubscriptionEvent, SubscriptionState, Transport, TransportEvent, Verifier,
};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// What to subscribe to and how.
#[derive(Debug, Clone)]
pub struct SubscribeOptions {
    pub stream: StreamPartition,
    /// History to request. Conflicting fields fail at subscribe time.
    pub resend: ResendSpec,
    /// Overrides the client's `order_messages`.
    pub order_messages: Option<bool>,
    /// Overrides the client's gap-fill settings.
    pub gap_fill: Option<GapFillConfig>,
    pub group_keys: GroupKeyStore,
}

impl SubscribeOptions {
    pub fn new(stream_id: impl Into<String>, partition: u32) -> Self {
        Self {
            stream: StreamPartition::new(stream_id, partition),
            resend: ResendSpec::default(),
            order_messages: None,
            gap_fill: None,
            group_keys: GroupKeyStore::new(),
        }
    }

    pub fn with_resend(mut self, resend: ResendSpec) -> Self {
        self.resend = resend;
        self
    }

    pub fn with_gap_fill(mut self, gap_fill: GapFillConfig) -> Self {
        self.gap_fill = Some(gap_fill);
        self
    }

    /// Deliver messages in arrival order.
    pub fn unordered(mut self) -> Self {
        self.order_messages = Some(false);
        self
    }

    /// Seed a publisher's group key.
    pub fn with_group_key(mut self, publisher_id: &str, key: GroupKey) -> Self {
        self.group_keys.set(publisher_id, key);
        self
    }
}

/// Consumer side of a subscription.
#[derive(Debug)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    stream: StreamPartition,
    state: watch::Receiver<SubscriptionState>,
    events: mpsc::UnboundedReceiver<SubscriptionEvent>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn stream(&self) -> &StreamPartition {
        &self.stream
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    /// Watch for state changes.
    pub fn state_changes(&self) -> watch::Receiver<SubscriptionState> {
        self.state.clone()
    }

    /// Wait for the next event. `None` once the subscription is gone and
    /// every event has been read.
    pub async fn next_event(&mut self) -> Option<SubscriptionEvent> {
        self.events.recv().await
    }

    /// Next event if one is ready.
    pub fn try_next_event(&mut self) -> Option<SubscriptionEvent> {
        self.events.try_recv().ok()
    }
}

/// Coordinates subscriptions, resend requests and gap filling.
pub struct Client<T: Transport> {
    transport: T,
    config: ClientConfig,
    ids: Arc<IdGenerator>,
    verifier: Arc<dyn Verifier>,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    by_stream: HashMap<StreamPartition, Vec<SubscriptionId>>,
    /// Last local subscriptions of a stream, waiting for the unsubscribe reply.
    closing: HashMap<StreamPartition, Vec<Subscription>>,
    requests: HashMap<RequestId, SubscriptionId>,
    ticks_tx: GapTickSender,
    ticks_rx: GapTickReceiver,
}

enum Input {
    Transport(TransportEvent),
    Tick(GapTick),
}

impl<T: Transport> Client<T> {
    /// Create a client. The configuration is validated first.
    pub fn new(transport: T, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let (ticks_tx, ticks_rx) = gap_tick_channel();
        Ok(Self {
            transport,
            verifier: Arc::new(SignatureVerifier::new(config.verify_signatures)),
            config,
            ids: Arc::new(IdGenerator::new()),
            subscriptions: HashMap::new(),
            by_stream: HashMap::new(),
            closing: HashMap::new(),
            requests: HashMap::new(),
            ticks_tx,
            ticks_rx,
        })
    }

    /// Share an id generator with other components.
    pub fn with_id_generator(mut self, ids: Arc<IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Replace the signature verifier.
    pub fn with_verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn subscription_state(&self, id: SubscriptionId) -> Option<SubscriptionState> {
        self.subscriptions.get(&id).map(Subscription::state)
    }

    /// Number of local subscriptions to a stream partition.
    pub fn subscription_count(&self, stream: &StreamPartition) -> usize {
        self.by_stream.get(stream).map_or(0, Vec::len)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Connection
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn connect(&self) -> Result<()> {
        self.transport.connect().await?;
        Ok(())
    }

    /// Disconnect. Every subscription is unsubscribed and its gap timers
    /// cancelled before this returns.
    pub async fn disconnect(&mut self) -> Result<()> {
        self.on_disconnected();
        self.transport.disconnect().await?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Subscriptions
    // ─────────────────────────────────────────────────────────────────────────

    /// Subscribe to a stream partition.
    ///
    /// Invalid options are rejected here, before anything is sent.
    pub async fn subscribe(&mut self, options: SubscribeOptions) -> Result<SubscriptionHandle> {
        if options.stream.stream_id.is_empty() {
            return Err(ConfigError::MissingField("stream_id").into());
        }
        let resend = options.resend.into_options()?;
        if let Some(gap_fill) = &options.gap_fill {
            if gap_fill.interval.is_zero() || gap_fill.max_gap_requests == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "gap_fill",
                    reason: "interval and max_gap_requests must be positive".into(),
                }
                .into());
            }
        }

        let mut ordering = self.config.ordering();
        if let Some(order_messages) = options.order_messages {
            ordering.order_messages = order_messages;
        }
        if let Some(gap_fill) = options.gap_fill {
            ordering.gap_fill = gap_fill;
        }

        let id = self.ids.next_subscription_id();
        let stream = options.stream;
        let (mut subscription, channels) = Subscription::new(
            id,
            stream.clone(),
            SubscriptionConfig {
                resend,
                ordering,
                group_keys: options.group_keys,
            },
            Arc::clone(&self.verifier),
            Some(self.ticks_tx.clone()),
        );
        info!(subscription = %id, stream = %stream, "subscribing");

        // A sibling on the same stream means the network side is already
        // taken care of.
        let sibling_state = self.stream_state(&stream);
        match sibling_state {
            Some(SubscriptionState::Subscribed) => subscription.set_state(SubscriptionState::Subscribed),
            Some(SubscriptionState::Subscribing) => subscription.set_state(SubscriptionState::Subscribing),
            _ => {}
        }
        self.by_stream.entry(stream.clone()).or_default().push(id);
        self.subscriptions.insert(id, subscription);

        match sibling_state {
            Some(SubscriptionState::Subscribed) => self.request_resend(id).await?,
            Some(SubscriptionState::Subscribing) => {}
            _ if self.transport.is_connected() => self.send_subscribe(&stream).await?,
            _ if self.config.auto_connect => self.transport.connect().await?,
            _ => debug!(subscription = %id, "not connected; subscribing on connect"),
        }

        Ok(SubscriptionHandle {
            id,
            stream,
            state: channels.state,
            events: channels.events,
        })
    }

    /// Remove a local subscription. The network is told only when it was
    /// the last one for its stream.
    pub async fn unsubscribe(&mut self, id: SubscriptionId) -> Result<()> {
        let mut subscription = self
            .subscriptions
            .remove(&id)
            .ok_or(ClientError::UnknownSubscription(id))?;
        subscription.clear_gaps();
        for request_id in subscription.pending_resends() {
            self.requests.remove(&request_id);
        }

        let stream = subscription.stream().clone();
        let last = match self.by_stream.get_mut(&stream) {
            Some(ids) => {
                ids.retain(|other| *other != id);
                ids.is_empty()
            }
            None => true,
        };
        if last {
            self.by_stream.remove(&stream);
        }
        info!(subscription = %id, stream = %stream, last, "unsubscribing");

        let on_network = matches!(
            subscription.state(),
            SubscriptionState::Subscribed | SubscriptionState::Subscribing
        );
        if last && on_network && self.transport.is_connected() {
            subscription.set_state(SubscriptionState::Unsubscribing);
            let request_id = self.ids.next_request_id();
            self.transport
                .send(ControlMessage::Unsubscribe {
                    stream: stream.clone(),
                    request_id,
                })
                .await?;
            self.closing.entry(stream).or_default().push(subscription);
        } else {
            subscription.set_state(SubscriptionState::Unsubscribed);
        }
        Ok(())
    }

    /// Supply a publisher's group key to a subscription.
    pub async fn set_group_key(
        &mut self,
        id: SubscriptionId,
        publisher_id: &str,
        key: GroupKey,
    ) -> Result<()> {
        let subscription = self
            .subscriptions
            .get_mut(&id)
            .ok_or(ClientError::UnknownSubscription(id))?;
        subscription.set_group_key(publisher_id, key);
        self.finish_done(&[id]).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Event processing
    // ─────────────────────────────────────────────────────────────────────────

    /// Process transport events and gap ticks until the event stream ends.
    ///
    /// Failures while reacting to one event are logged and do not stop the
    /// loop.
    pub async fn run(&mut self, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        loop {
            let input = tokio::select! {
                event = events.recv() => event.map(Input::Transport),
                tick = self.ticks_rx.recv() => tick.map(Input::Tick),
            };
            let result = match input {
                Some(Input::Transport(event)) => self.handle_transport_event(event).await,
                Some(Input::Tick(tick)) => self.handle_gap_tick(tick).await,
                None => break,
            };
            if let Err(e) = result {
                warn!(error = %e, "event handling failed");
            }
        }
        debug!("transport event stream ended");
    }

    /// Wait for the next gap timer tick of any subscription.
    pub async fn next_gap_tick(&mut self) -> Option<GapTick> {
        self.ticks_rx.recv().await
    }

    /// React to one transport event.
    pub async fn handle_transport_event(&mut self, event: TransportEvent) -> Result<()> {
        match event {
            TransportEvent::Connected => self.on_connected().await,
            TransportEvent::Disconnected => {
                self.on_disconnected();
                Ok(())
            }
            TransportEvent::Error(message) => {
                warn!(error = %message, "transport error");
                let ids: Vec<_> = self.subscriptions.keys().copied().collect();
                for id in ids {
                    if let Some(subscription) = self.subscriptions.get_mut(&id) {
                        subscription
                            .handle_error(ProtocolError::Transport(message.clone()))
                            .await;
                    }
                }
                Ok(())
            }
            TransportEvent::SubscribeResponse { stream } => self.on_subscribed(&stream).await,
            TransportEvent::UnsubscribeResponse { stream } => {
                for mut subscription in self.closing.remove(&stream).unwrap_or_default() {
                    subscription.set_state(SubscriptionState::Unsubscribed);
                }
                Ok(())
            }
            TransportEvent::ResendResponseResending { request_id, .. } => {
                if let Some(subscription) = self.subscription_for_request(request_id) {
                    subscription.handle_resending(request_id);
                }
                Ok(())
            }
            TransportEvent::ResendResponseResent { request_id, .. } => {
                let Some(id) = self.requests.remove(&request_id) else {
                    debug!(request = %request_id, "resent for unknown request");
                    return Ok(());
                };
                if let Some(subscription) = self.subscriptions.get_mut(&id) {
                    subscription.handle_resent(request_id).await;
                }
                self.finish_done(&[id]).await
            }
            TransportEvent::ResendResponseNoResend { request_id, .. } => {
                let Some(id) = self.requests.remove(&request_id) else {
                    debug!(request = %request_id, "no_resend for unknown request");
                    return Ok(());
                };
                if let Some(subscription) = self.subscriptions.get_mut(&id) {
                    subscription.handle_no_resend(request_id).await;
                }
                self.finish_done(&[id]).await
            }
            TransportEvent::ErrorResponse {
                request_id: Some(request_id),
                message,
            } => {
                let Some(id) = self.requests.remove(&request_id) else {
                    warn!(request = %request_id, error = %message, "error response for unknown request");
                    return Ok(());
                };
                if let Some(subscription) = self.subscriptions.get_mut(&id) {
                    subscription.handle_resend_error(request_id, message).await;
                }
                self.finish_done(&[id]).await
            }
            TransportEvent::ErrorResponse {
                request_id: None,
                message,
            } => {
                warn!(error = %message, "error response");
                let ids: Vec<_> = self.subscriptions.keys().copied().collect();
                for id in ids {
                    if let Some(subscription) = self.subscriptions.get_mut(&id) {
                        subscription
                            .handle_error(ProtocolError::Server(message.clone()))
                            .await;
                    }
                }
                Ok(())
            }
            TransportEvent::BroadcastMessage(message) => self.on_broadcast(message).await,
            TransportEvent::UnicastMessage {
                request_id,
                message,
            } => self.on_unicast(request_id, message).await,
            TransportEvent::InvalidPayload { message, reason } => {
                let Some(message) = message else {
                    warn!(reason = %reason, "undecodable frame");
                    return Ok(());
                };
                let ids = self.stream_subscriptions(&message.stream());
                for id in &ids {
                    if let Some(subscription) = self.subscriptions.get_mut(id) {
                        subscription
                            .handle_error(ProtocolError::InvalidPayload {
                                message: Some(Box::new(message.clone())),
                                reason: reason.clone(),
                            })
                            .await;
                    }
                }
                self.finish_done(&ids).await
            }
        }
    }

    /// React to a gap timer tick: ask for the missing range unless the
    /// subscription is already receiving a resend.
    pub async fn handle_gap_tick(&mut self, tick: GapTick) -> Result<()> {
        let Some(subscription) = self.subscriptions.get_mut(&tick.owner) else {
            trace!(subscription = %tick.owner, "gap tick for removed subscription");
            return Ok(());
        };
        let Some(gap) = subscription.handle_gap_tick(&tick) else {
            return Ok(());
        };
        if subscription.is_resending() {
            debug!(subscription = %tick.owner, chain = %tick.chain, "resend in progress; gap fill deferred");
            return Ok(());
        }

        let request_id = self.ids.next_request_id();
        let request = ControlMessage::gap_fill(subscription.stream().clone(), request_id, &gap);
        info!(
            subscription = %tick.owner,
            request = %request_id,
            publisher = %gap.publisher_id,
            from = %gap.from,
            to = %gap.to,
            "requesting gap fill"
        );
        self.send_resend(tick.owner, request).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    async fn on_connected(&mut self) -> Result<()> {
        info!("connected");
        let streams: Vec<StreamPartition> = self
            .by_stream
            .iter()
            .filter(|(_, ids)| {
                ids.iter().any(|id| {
                    self.subscriptions.get(id).map(Subscription::state)
                        == Some(SubscriptionState::Unsubscribed)
                })
            })
            .map(|(stream, _)| stream.clone())
            .collect();
        for stream in streams {
            self.send_subscribe(&stream).await?;
        }
        Ok(())
    }

    fn on_disconnected(&mut self) {
        info!("disconnected");
        for subscription in self.subscriptions.values_mut() {
            subscription.handle_disconnected();
        }
        for (_, closing) in self.closing.drain() {
            for mut subscription in closing {
                subscription.set_state(SubscriptionState::Unsubscribed);
            }
        }
        self.requests.clear();
    }

    async fn on_subscribed(&mut self, stream: &StreamPartition) -> Result<()> {
        let ids = self.stream_subscriptions(stream);
        for id in ids {
            let Some(subscription) = self.subscriptions.get_mut(&id) else {
                continue;
            };
            if subscription.state() != SubscriptionState::Subscribing {
                continue;
            }
            subscription.set_state(SubscriptionState::Subscribed);
            self.request_resend(id).await?;
        }
        Ok(())
    }

    async fn on_broadcast(&mut self, message: StreamMessage) -> Result<()> {
        let ids = self.stream_subscriptions(&message.stream());
        if ids.is_empty() {
            trace!(stream = %message.stream(), "broadcast for stream without subscriptions");
            return Ok(());
        }
        for id in &ids {
            if let Some(subscription) = self.subscriptions.get_mut(id) {
                subscription.handle_broadcast_message(message.clone()).await;
            }
        }
        self.finish_done(&ids).await
    }

    async fn on_unicast(&mut self, request_id: RequestId, message: StreamMessage) -> Result<()> {
        // Without a known request, let the stream's subscriptions report it.
        let ids = match self.requests.get(&request_id) {
            Some(id) => vec![*id],
            None => self.stream_subscriptions(&message.stream()),
        };
        for id in &ids {
            if let Some(subscription) = self.subscriptions.get_mut(id) {
                subscription
                    .handle_resent_message(message.clone(), request_id)
                    .await;
            }
        }
        self.finish_done(&ids).await
    }

    async fn send_subscribe(&mut self, stream: &StreamPartition) -> Result<()> {
        let request_id = self.ids.next_request_id();
        debug!(stream = %stream, request = %request_id, "sending subscribe");
        self.transport
            .send(ControlMessage::Subscribe {
                stream: stream.clone(),
                request_id,
            })
            .await?;
        for id in self.stream_subscriptions(stream) {
            if let Some(subscription) = self.subscriptions.get_mut(&id) {
                if subscription.state() == SubscriptionState::Unsubscribed {
                    subscription.set_state(SubscriptionState::Subscribing);
                }
            }
        }
        Ok(())
    }

    async fn request_resend(&mut self, id: SubscriptionId) -> Result<()> {
        let Some(subscription) = self.subscriptions.get(&id) else {
            return Ok(());
        };
        let Some(options) = subscription.effective_resend() else {
            return Ok(());
        };
        let request_id = self.ids.next_request_id();
        let request = ControlMessage::resend(subscription.stream().clone(), request_id, &options);
        debug!(subscription = %id, request = %request_id, options = ?options, "requesting resend");
        self.send_resend(id, request).await
    }

    async fn send_resend(&mut self, id: SubscriptionId, request: ControlMessage) -> Result<()> {
        let request_id = request.request_id();
        self.transport.send(request).await?;
        if let Some(subscription) = self.subscriptions.get_mut(&id) {
            subscription.expect_resend(request_id);
            self.requests.insert(request_id, id);
        }
        Ok(())
    }

    async fn finish_done(&mut self, ids: &[SubscriptionId]) -> Result<()> {
        for id in ids {
            if self.subscriptions.get(id).is_some_and(Subscription::is_done) {
                info!(subscription = %id, "stream done");
                self.unsubscribe(*id).await?;
            }
        }
        Ok(())
    }

    fn subscription_for_request(&mut self, request_id: RequestId) -> Option<&mut Subscription> {
        let id = self.requests.get(&request_id)?;
        self.subscriptions.get_mut(id)
    }

    fn stream_subscriptions(&self, stream: &StreamPartition) -> Vec<SubscriptionId> {
        self.by_stream.get(stream).cloned().unwrap_or_default()
    }

    // State of the stream's network subscription, as seen by its existing
    // local subscriptions.
    fn stream_state(&self, stream: &StreamPartition) -> Option<SubscriptionState> {
        let ids = self.by_stream.get(stream)?;
        let states: Vec<_> = ids
            .iter()
            .filter_map(|id| self.subscriptions.get(id).map(Subscription::state))
            .collect();
        [SubscriptionState::Subscribed, SubscriptionState::Subscribing]
            .into_iter()
            .find(|state| states.contains(state))
            .or(states.first().copied())
    }
}

impl<T: Transport> std::fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("subscriptions", &self.subscriptions.len())
            .field("streams", &self.by_stream.len())
            .field("pending_requests", &self.requests.len())
            .finish_non_exhaustive()
    }
}
