//! Reorder buffer for a single (publisher, chain).
//!
//! Messages arrive in any order, possibly duplicated. The buffer releases
//! them strictly in chain order, exactly once each, and detects holes in the
//! chain so the missing range can be requested again.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Duration;

use tracing::{debug, trace, warn};

use datastream_core::{ChainKey, MessageRef, StreamMessage, SubscriptionId};

use crate::error::{OrderError, Result};
use crate::timer::{GapTick, GapTickSender, GapTimer};

/// Default delay between gap-fill requests.
pub const DEFAULT_GAP_FILL_INTERVAL: Duration = Duration::from_secs(5);

/// Default number of gap-fill requests before giving up on a gap.
pub const DEFAULT_MAX_GAP_REQUESTS: u32 = 10;

/// Gap-fill behaviour of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapFillConfig {
    pub interval: Duration,
    pub max_gap_requests: u32,
    /// When false, gaps are buffered but never requested.
    pub enabled: bool,
}

impl Default for GapFillConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_GAP_FILL_INTERVAL,
            max_gap_requests: DEFAULT_MAX_GAP_REQUESTS,
            enabled: true,
        }
    }
}

/// A range of a chain that should be resent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GapRequest {
    pub from: MessageRef,
    pub to: MessageRef,
    pub publisher_id: String,
    pub msg_chain_id: String,
}

// Heap entry ordered by message ref only.
#[derive(Debug)]
struct Pending(StreamMessage);

impl Pending {
    fn message_ref(&self) -> MessageRef {
        self.0.message_ref()
    }
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.message_ref() == other.message_ref()
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.message_ref().cmp(&other.message_ref())
    }
}

/// Orders one chain's messages and tracks its gap.
///
/// # Invariants
///
/// - Every delivered message has a ref strictly greater than the one before.
/// - `last_delivered` never decreases.
/// - A gap timer is armed only while `pending` holds a message that is not
///   next in the chain.
#[derive(Debug)]
pub struct ChainReorderBuffer {
    owner: SubscriptionId,
    chain: ChainKey,
    config: GapFillConfig,
    ticks: Option<GapTickSender>,
    last_delivered: Option<MessageRef>,
    pending: BinaryHeap<Reverse<Pending>>,
    gap_timer: Option<GapTimer>,
    gap_retry_count: u32,
    generation: u64,
}

impl ChainReorderBuffer {
    /// Create a buffer whose timers post ticks into `ticks`.
    ///
    /// Without a sender, gap timers are armed in manual mode and ticks have
    /// to be fed to [`on_gap_tick`](Self::on_gap_tick) by the caller.
    pub fn new(
        owner: SubscriptionId,
        chain: ChainKey,
        config: GapFillConfig,
        ticks: Option<GapTickSender>,
    ) -> Self {
        Self {
            owner,
            chain,
            config,
            ticks,
            last_delivered: None,
            pending: BinaryHeap::new(),
            gap_timer: None,
            gap_retry_count: 0,
            generation: 0,
        }
    }

    pub fn chain(&self) -> &ChainKey {
        &self.chain
    }

    /// High-water mark of this chain.
    pub fn last_delivered(&self) -> Option<MessageRef> {
        self.last_delivered
    }

    /// Number of messages waiting for a predecessor.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Generation of the armed gap timer, if any.
    pub fn gap_generation(&self) -> Option<u64> {
        self.gap_timer.as_ref().map(GapTimer::generation)
    }

    pub fn gap_retry_count(&self) -> u32 {
        self.gap_retry_count
    }

    /// Offer a message. Returns every message that became deliverable, in
    /// chain order.
    pub fn add(&mut self, message: StreamMessage) -> Vec<StreamMessage> {
        let message_ref = message.message_ref();
        if self.is_delivered(message_ref) {
            trace!(chain = %self.chain, msg_ref = %message_ref, "discarding already delivered message");
            return Vec::new();
        }

        if self.is_next(&message) {
            let mut delivered = vec![message];
            self.advance(message_ref);
            self.drain(&mut delivered);
            self.ensure_gap_timer();
            delivered
        } else if self.is_forked(&message) {
            warn!(
                chain = %self.chain,
                msg_ref = %message_ref,
                prev = ?message.prev_msg_ref(),
                last = ?self.last_delivered,
                "discarding message that branches off before the delivered history"
            );
            Vec::new()
        } else {
            trace!(
                chain = %self.chain,
                msg_ref = %message_ref,
                last = ?self.last_delivered,
                "buffering out-of-order message"
            );
            self.pending.push(Reverse(Pending(message)));
            self.ensure_gap_timer();
            Vec::new()
        }
    }

    /// Whether `message` directly follows what has been delivered.
    ///
    /// A message without a back-reference is accepted whenever it is not
    /// older than the high-water mark. Such chains carry no evidence of a
    /// missing predecessor, so holes in them go undetected.
    pub fn is_next(&self, message: &StreamMessage) -> bool {
        let Some(last) = self.last_delivered else {
            return true;
        };
        match message.prev_msg_ref() {
            Some(prev) => prev == last,
            None => message.message_ref() >= last,
        }
    }

    /// Count a message as delivered without releasing it.
    ///
    /// Used for messages that were dropped downstream (e.g. unparseable), so
    /// their absence does not open a false gap. Returns any buffered messages
    /// this unblocks.
    pub fn mark_explicitly(&mut self, message_ref: MessageRef) -> Vec<StreamMessage> {
        if self.is_delivered(message_ref) {
            return Vec::new();
        }
        debug!(chain = %self.chain, msg_ref = %message_ref, "marking message as received");
        self.advance(message_ref);

        let mut delivered = Vec::new();
        self.drain(&mut delivered);
        self.ensure_gap_timer();
        delivered
    }

    /// Handle a tick of the gap timer with the given generation.
    ///
    /// Returns the range to request, `None` for a stale tick, or
    /// [`OrderError::GapFillFailed`] once the retry budget is spent. The
    /// timer is cancelled on failure.
    pub fn on_gap_tick(&mut self, generation: u64) -> Result<Option<GapRequest>> {
        if self.gap_generation() != Some(generation) {
            trace!(chain = %self.chain, generation, "ignoring stale gap tick");
            return Ok(None);
        }

        let Some((from, to)) = self.gap_range() else {
            self.clear_gap();
            return Ok(None);
        };

        if self.gap_retry_count >= self.config.max_gap_requests {
            warn!(
                chain = %self.chain,
                from = %from,
                to = %to,
                attempts = self.gap_retry_count,
                "gap fill failed"
            );
            let attempts = self.gap_retry_count;
            self.clear_gap();
            return Err(OrderError::GapFillFailed {
                chain: self.chain.clone(),
                from,
                to,
                attempts,
            });
        }

        self.gap_retry_count += 1;
        debug!(
            chain = %self.chain,
            from = %from,
            to = %to,
            attempt = self.gap_retry_count,
            "requesting gap fill"
        );
        Ok(Some(GapRequest {
            from,
            to,
            publisher_id: self.chain.publisher_id.clone(),
            msg_chain_id: self.chain.msg_chain_id.clone(),
        }))
    }

    /// Cancel the gap timer. Idempotent.
    pub fn clear_gap(&mut self) {
        if self.gap_timer.take().is_some() {
            trace!(chain = %self.chain, "gap timer cleared");
        }
        self.gap_retry_count = 0;
    }

    fn is_delivered(&self, message_ref: MessageRef) -> bool {
        self.last_delivered.is_some_and(|last| message_ref <= last)
    }

    // A predecessor older than the high-water mark can never become "next",
    // since the mark only moves forward.
    fn is_forked(&self, message: &StreamMessage) -> bool {
        matches!(
            (self.last_delivered, message.prev_msg_ref()),
            (Some(last), Some(prev)) if prev < last
        )
    }

    // Moves the high-water mark forward. Whatever gap was being chased is
    // either filled or a different hole now, so the timer starts over.
    fn advance(&mut self, message_ref: MessageRef) {
        self.last_delivered = Some(match self.last_delivered {
            Some(last) => last.max(message_ref),
            None => message_ref,
        });
        self.clear_gap();
    }

    fn drain(&mut self, delivered: &mut Vec<StreamMessage>) {
        while let Some(Reverse(head)) = self.pending.peek() {
            let head_ref = head.message_ref();
            if self.is_delivered(head_ref) {
                self.pending.pop();
            } else if self.is_forked(&head.0) {
                warn!(
                    chain = %self.chain,
                    msg_ref = %head_ref,
                    "discarding buffered message that branches off before the delivered history"
                );
                self.pending.pop();
            } else if self.is_next(&head.0) {
                if let Some(Reverse(Pending(message))) = self.pending.pop() {
                    self.advance(head_ref);
                    delivered.push(message);
                }
            } else {
                break;
            }
        }
    }

    // Gap bounds: just after the high-water mark up to the predecessor of the
    // smallest buffered message. Never inverted.
    fn gap_range(&self) -> Option<(MessageRef, MessageRef)> {
        let last = self.last_delivered?;
        let Reverse(head) = self.pending.peek()?;
        let from = last.next_in_sequence();
        let to = head.0.prev_msg_ref().unwrap_or_else(|| head.message_ref());
        if to < from {
            warn!(chain = %self.chain, from = %from, to = %to, "no range to request");
            return None;
        }
        Some((from, to))
    }

    fn ensure_gap_timer(&mut self) {
        if !self.config.enabled || self.gap_timer.is_some() || self.pending.is_empty() {
            return;
        }
        self.generation += 1;
        let timer = match &self.ticks {
            Some(sender) => GapTimer::spawn(
                self.config.interval,
                GapTick {
                    owner: self.owner,
                    chain: self.chain.clone(),
                    generation: self.generation,
                },
                sender.clone(),
            ),
            None => GapTimer::manual(self.generation),
        };
        trace!(chain = %self.chain, generation = self.generation, "gap timer armed");
        self.gap_timer = Some(timer);
        self.gap_retry_count = 0;
    }
}
