//! Subscription state machine.
//!
//! A subscription receives live (broadcast) and historical (resent) messages
//! for one stream partition and turns them into a single ordered sequence of
//! [`SubscriptionEvent`]s:
//!
//! ```text
//! message -> verify -> reorder per chain -> decrypt (or queue) -> parse -> event
//! ```
//!
//! While a resend is in flight, broadcast messages are held back and replayed
//! once the last pending resend completes, so history is delivered before
//! the live messages that arrived during it.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use datastream_core::{
    is_bye_content, MessageRef, RequestId, ResendOptions, StreamMessage, StreamPartition,
    SubscriptionId,
};
use datastream_crypto::{DecryptOutcome, Decryptor, GroupKey, GroupKeyStore, RetryOutcome};
use datastream_order::{ChainReorderRegistry, GapRequest, GapTick, GapTickSender, OrderingConfig};

use crate::error::ProtocolError;
use crate::events::{SubscriptionEvent, SubscriptionState};
use crate::verify::Verifier;

/// Per-subscription settings.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionConfig {
    /// History to request when subscribing.
    pub resend: Option<ResendOptions>,
    pub ordering: OrderingConfig,
    /// Keys known before the first message arrives.
    pub group_keys: GroupKeyStore,
}

/// Consumer side of a subscription.
#[derive(Debug)]
pub struct SubscriptionChannels {
    pub events: mpsc::UnboundedReceiver<SubscriptionEvent>,
    pub state: watch::Receiver<SubscriptionState>,
}

/// One local subscription to a stream partition.
pub struct Subscription {
    id: SubscriptionId,
    stream: StreamPartition,
    state: watch::Sender<SubscriptionState>,
    events: mpsc::UnboundedSender<SubscriptionEvent>,
    resend: Option<ResendOptions>,
    resending: bool,
    pending_resends: HashSet<RequestId>,
    /// Broadcast messages that arrived while resending.
    queued: VecDeque<StreamMessage>,
    registry: ChainReorderRegistry,
    decryptor: Decryptor,
    verifier: Arc<dyn Verifier>,
    last_received: Option<MessageRef>,
    done: bool,
}

impl Subscription {
    /// Create an unsubscribed subscription.
    ///
    /// Gap timers post into `ticks`; without it they must be driven by hand.
    pub fn new(
        id: SubscriptionId,
        stream: StreamPartition,
        config: SubscriptionConfig,
        verifier: Arc<dyn Verifier>,
        ticks: Option<GapTickSender>,
    ) -> (Self, SubscriptionChannels) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SubscriptionState::Unsubscribed);
        let subscription = Self {
            id,
            stream,
            state: state_tx,
            events: events_tx,
            resend: config.resend,
            resending: false,
            pending_resends: HashSet::new(),
            queued: VecDeque::new(),
            registry: ChainReorderRegistry::new(id, config.ordering, ticks),
            decryptor: Decryptor::with_keys(config.group_keys),
            verifier,
            last_received: None,
            done: false,
        };
        let channels = SubscriptionChannels {
            events: events_rx,
            state: state_rx,
        };
        (subscription, channels)
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn stream(&self) -> &StreamPartition {
        &self.stream
    }

    pub fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    /// Move to `state`, emitting `Subscribed` / `Unsubscribed` on entry.
    pub fn set_state(&mut self, state: SubscriptionState) {
        let previous = self.state.send_replace(state);
        if previous == state {
            return;
        }
        debug!(subscription = %self.id, stream = %self.stream, from = ?previous, to = ?state, "state change");
        match state {
            SubscriptionState::Subscribed => self.emit(SubscriptionEvent::Subscribed),
            SubscriptionState::Unsubscribed => self.emit(SubscriptionEvent::Unsubscribed),
            SubscriptionState::Subscribing | SubscriptionState::Unsubscribing => {}
        }
    }

    pub fn resend_options(&self) -> Option<&ResendOptions> {
        self.resend.as_ref()
    }

    /// History to request when (re)subscribing.
    ///
    /// After messages have been received, continue from the latest one
    /// rather than repeating the original request.
    pub fn effective_resend(&self) -> Option<ResendOptions> {
        let options = self.resend.as_ref()?;
        Some(match self.last_received {
            Some(from) => ResendOptions::From {
                from,
                publisher_id: None,
                msg_chain_id: None,
            },
            None => options.clone(),
        })
    }

    /// Ref of the newest message handed to the in-order stage.
    pub fn last_received(&self) -> Option<MessageRef> {
        self.last_received
    }

    pub fn is_resending(&self) -> bool {
        self.resending
    }

    pub fn pending_resends(&self) -> impl Iterator<Item = RequestId> + '_ {
        self.pending_resends.iter().copied()
    }

    /// Whether the publisher ended the stream.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Register a resend request that was just sent.
    ///
    /// Broadcast messages are held back until every registered request has
    /// finished.
    pub fn expect_resend(&mut self, request_id: RequestId) {
        self.pending_resends.insert(request_id);
        self.resending = true;
    }

    /// Live message from the stream.
    pub async fn handle_broadcast_message(&mut self, message: StreamMessage) {
        if !self.accepts_messages() {
            trace!(subscription = %self.id, state = ?self.state(), "dropping broadcast message");
            return;
        }
        if self.resending {
            trace!(subscription = %self.id, msg_ref = %message.message_ref(), "holding broadcast during resend");
            self.queued.push_back(message);
            return;
        }
        self.process(message).await;
    }

    /// Historical message answering `request_id`.
    pub async fn handle_resent_message(&mut self, message: StreamMessage, request_id: RequestId) {
        if !self.pending_resends.contains(&request_id) {
            self.emit(SubscriptionEvent::Error(ProtocolError::UnexpectedResend {
                request_id,
            }));
            return;
        }
        if !self.accepts_messages() {
            return;
        }
        self.process(message).await;
    }

    pub fn handle_resending(&mut self, request_id: RequestId) {
        if !self.pending_resends.contains(&request_id) {
            debug!(subscription = %self.id, request = %request_id, "ignoring resending for unknown request");
            return;
        }
        self.emit(SubscriptionEvent::Resending { request_id });
    }

    pub async fn handle_resent(&mut self, request_id: RequestId) {
        self.finish_resend(request_id, SubscriptionEvent::Resent { request_id })
            .await;
    }

    pub async fn handle_no_resend(&mut self, request_id: RequestId) {
        self.finish_resend(request_id, SubscriptionEvent::NoResend { request_id })
            .await;
    }

    /// The network refused the resend request.
    pub async fn handle_resend_error(&mut self, request_id: RequestId, reason: String) {
        let event = SubscriptionEvent::Error(ProtocolError::ResendFailed {
            request_id,
            reason,
        });
        self.finish_resend(request_id, event).await;
    }

    /// Surface an error. An undecodable message that was next in its chain
    /// still counts as received, so it does not leave a gap behind.
    pub async fn handle_error(&mut self, error: ProtocolError) {
        let unblocked = match &error {
            ProtocolError::InvalidPayload {
                message: Some(message),
                ..
            } if self.registry.is_next(message) => self.registry.mark_explicitly(message),
            _ => Vec::new(),
        };
        self.emit(SubscriptionEvent::Error(error));
        self.deliver_all(unblocked);
    }

    /// Route a gap timer tick. Returns the range to request, if any.
    pub fn handle_gap_tick(&mut self, tick: &GapTick) -> Option<GapRequest> {
        match self.registry.on_gap_tick(tick) {
            Ok(Some(gap)) => {
                self.emit(SubscriptionEvent::Gap(gap.clone()));
                Some(gap)
            }
            Ok(None) => None,
            Err(e) => {
                self.emit(SubscriptionEvent::Error(e.into()));
                None
            }
        }
    }

    /// Supply a publisher's group key and retry the messages waiting for it.
    pub fn set_group_key(&mut self, publisher_id: &str, key: GroupKey) {
        debug!(subscription = %self.id, publisher = %publisher_id, key_id = %key.id(), "group key set");
        for outcome in self.decryptor.set_group_key(publisher_id, key) {
            match outcome {
                RetryOutcome::Ready(message) => self.emit_content(message),
                RetryOutcome::UnableToDecrypt { message, error } => {
                    self.emit(SubscriptionEvent::UnableToDecrypt { message, error })
                }
            }
        }
    }

    /// Cancel every gap timer of this subscription.
    pub fn clear_gaps(&mut self) {
        self.registry.clear_all_gaps();
    }

    /// The connection dropped: timers and in-flight resends are void.
    pub fn handle_disconnected(&mut self) {
        self.clear_gaps();
        self.pending_resends.clear();
        self.resending = false;
        if !self.queued.is_empty() {
            debug!(subscription = %self.id, dropped = self.queued.len(), "discarding held broadcasts");
            self.queued.clear();
        }
        self.set_state(SubscriptionState::Unsubscribed);
    }

    fn accepts_messages(&self) -> bool {
        matches!(
            self.state(),
            SubscriptionState::Subscribing | SubscriptionState::Subscribed
        )
    }

    async fn finish_resend(&mut self, request_id: RequestId, terminal: SubscriptionEvent) {
        if !self.pending_resends.remove(&request_id) {
            debug!(subscription = %self.id, request = %request_id, "ignoring response for unknown request");
            return;
        }
        self.emit(terminal);
        if !self.pending_resends.is_empty() {
            return;
        }

        self.resending = false;
        if !self.queued.is_empty() {
            debug!(subscription = %self.id, count = self.queued.len(), "replaying held broadcasts");
        }
        while let Some(message) = self.queued.pop_front() {
            self.process(message).await;
        }
    }

    async fn process(&mut self, message: StreamMessage) {
        match self.verifier.verify(&message).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    subscription = %self.id,
                    publisher = %message.publisher_id(),
                    msg_ref = %message.message_ref(),
                    "rejecting message with invalid signature"
                );
                self.emit(SubscriptionEvent::Error(ProtocolError::InvalidSignature {
                    publisher_id: message.publisher_id().to_string(),
                    msg_ref: message.message_ref(),
                }));
                return;
            }
            Err(e) => {
                self.emit(SubscriptionEvent::Error(e.into()));
                return;
            }
        }
        let ready = self.registry.add(message);
        self.deliver_all(ready);
    }

    fn deliver_all(&mut self, messages: Vec<StreamMessage>) {
        for message in messages {
            self.deliver_in_order(message);
        }
    }

    fn deliver_in_order(&mut self, message: StreamMessage) {
        let message_ref = message.message_ref();
        if self.last_received.map_or(true, |last| message_ref > last) {
            self.last_received = Some(message_ref);
        }

        match self.decryptor.decrypt_or_queue(message) {
            DecryptOutcome::Ready(plaintext) => self.emit_content(plaintext),
            DecryptOutcome::Queued {
                publisher_id,
                key_requested,
            } => {
                if key_requested {
                    info!(subscription = %self.id, publisher = %publisher_id, "group key missing");
                    self.emit(SubscriptionEvent::KeyMissing { publisher_id });
                }
            }
        }
    }

    fn emit_content(&mut self, message: StreamMessage) {
        if self.done {
            trace!(subscription = %self.id, "dropping message after end of stream");
            return;
        }
        match message.parse_content() {
            Ok(content) if is_bye_content(&content) => {
                info!(subscription = %self.id, publisher = %message.publisher_id(), "stream ended by publisher");
                self.done = true;
                self.emit(SubscriptionEvent::Done);
            }
            Ok(content) => self.emit(SubscriptionEvent::Message { message, content }),
            Err(e) => self.emit(SubscriptionEvent::Error(e.into())),
        }
    }

    fn emit(&self, event: SubscriptionEvent) {
        if let Err(mpsc::error::SendError(event)) = self.events.send(event) {
            trace!(subscription = %self.id, kind = event.kind(), "event receiver dropped");
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("stream", &self.stream)
            .field("state", &self.state())
            .field("resending", &self.resending)
            .finish_non_exhaustive()
    }
}
