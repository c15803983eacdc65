//! Routes messages to the reorder buffer of their chain.

use std::collections::HashMap;

use tracing::debug;

use datastream_core::{ChainKey, StreamMessage, SubscriptionId};

use crate::buffer::{ChainReorderBuffer, GapFillConfig, GapRequest};
use crate::error::Result;
use crate::timer::{GapTick, GapTickSender};

/// Ordering settings of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderingConfig {
    /// When false, messages pass through in arrival order.
    pub order_messages: bool,
    pub gap_fill: GapFillConfig,
}

impl Default for OrderingConfig {
    fn default() -> Self {
        Self {
            order_messages: true,
            gap_fill: GapFillConfig::default(),
        }
    }
}

/// One [`ChainReorderBuffer`] per (publisher, chain), created on first use.
///
/// Chains are independent: a gap in one never holds back another.
#[derive(Debug)]
pub struct ChainReorderRegistry {
    owner: SubscriptionId,
    config: OrderingConfig,
    ticks: Option<GapTickSender>,
    buffers: HashMap<ChainKey, ChainReorderBuffer>,
}

impl ChainReorderRegistry {
    pub fn new(owner: SubscriptionId, config: OrderingConfig, ticks: Option<GapTickSender>) -> Self {
        Self {
            owner,
            config,
            ticks,
            buffers: HashMap::new(),
        }
    }

    pub fn config(&self) -> &OrderingConfig {
        &self.config
    }

    /// Buffer of a chain, if any message of it was seen.
    pub fn buffer(&self, chain: &ChainKey) -> Option<&ChainReorderBuffer> {
        self.buffers.get(chain)
    }

    /// Offer a message; returns what became deliverable for its chain.
    pub fn add(&mut self, message: StreamMessage) -> Vec<StreamMessage> {
        if !self.config.order_messages {
            return vec![message];
        }
        let chain = message.chain_key();
        self.buffer_mut(chain).add(message)
    }

    /// Whether `message` is next in its chain. Unknown chains accept anything.
    pub fn is_next(&self, message: &StreamMessage) -> bool {
        if !self.config.order_messages {
            return true;
        }
        self.buffers
            .get(&message.chain_key())
            .map_or(true, |buffer| buffer.is_next(message))
    }

    /// Count `message` as delivered in its chain without releasing it.
    pub fn mark_explicitly(&mut self, message: &StreamMessage) -> Vec<StreamMessage> {
        if !self.config.order_messages {
            return Vec::new();
        }
        self.buffer_mut(message.chain_key())
            .mark_explicitly(message.message_ref())
    }

    /// Route a timer tick to its buffer.
    ///
    /// Ticks for chains this registry does not know are stale.
    pub fn on_gap_tick(&mut self, tick: &GapTick) -> Result<Option<GapRequest>> {
        match self.buffers.get_mut(&tick.chain) {
            Some(buffer) => buffer.on_gap_tick(tick.generation),
            None => Ok(None),
        }
    }

    /// Cancel every gap timer.
    pub fn clear_all_gaps(&mut self) {
        for buffer in self.buffers.values_mut() {
            buffer.clear_gap();
        }
    }

    fn buffer_mut(&mut self, chain: ChainKey) -> &mut ChainReorderBuffer {
        let owner = self.owner;
        let gap_fill = self.config.gap_fill;
        let ticks = self.ticks.clone();
        self.buffers.entry(chain).or_insert_with_key(|chain| {
            debug!(owner = %owner, chain = %chain, "new chain buffer");
            ChainReorderBuffer::new(owner, chain.clone(), gap_fill, ticks)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datastream_core::{MessageChain, StreamPartition};

    fn registry(config: OrderingConfig) -> ChainReorderRegistry {
        ChainReorderRegistry::new(SubscriptionId(0), config, None)
    }

    fn chain(publisher: &str) -> MessageChain {
        MessageChain::new(StreamPartition::new("s", 0), publisher, "c")
    }

    #[test]
    fn test_publishers_are_independent() {
        let mut reg = registry(OrderingConfig::default());
        let mut a = chain("a");
        let mut b = chain("b");

        reg.add(a.next_message(1, "{}"));
        a.next_message(2, "{}");
        assert!(reg.add(a.next_message(3, "{}")).is_empty());

        assert_eq!(reg.add(b.next_message(1, "{}")).len(), 1);
        assert_eq!(reg.add(b.next_message(2, "{}")).len(), 1);

        let key_a = ChainKey::new("a", "c");
        let key_b = ChainKey::new("b", "c");
        assert!(reg.buffer(&key_a).unwrap().gap_generation().is_some());
        assert!(reg.buffer(&key_b).unwrap().gap_generation().is_none());
    }

    #[test]
    fn test_unordered_mode_passes_through() {
        let mut reg = registry(OrderingConfig {
            order_messages: false,
            ..OrderingConfig::default()
        });
        let mut a = chain("a");
        let m1 = a.next_message(1, "{}");
        let m2 = a.next_message(2, "{}");

        assert_eq!(reg.add(m2.clone()), vec![m2.clone()]);
        assert_eq!(reg.add(m1.clone()), vec![m1]);
        assert_eq!(reg.add(m2.clone()), vec![m2]);
        assert!(reg.buffer(&ChainKey::new("a", "c")).is_none());
    }

    #[test]
    fn test_tick_for_unknown_chain_is_ignored() {
        let mut reg = registry(OrderingConfig::default());
        let tick = GapTick {
            owner: SubscriptionId(0),
            chain: ChainKey::new("nobody", "c"),
            generation: 1,
        };
        assert_eq!(reg.on_gap_tick(&tick).unwrap(), None);
    }

    #[test]
    fn test_clear_all_gaps() {
        let mut reg = registry(OrderingConfig::default());
        for publisher in ["a", "b"] {
            let mut c = chain(publisher);
            reg.add(c.next_message(1, "{}"));
            c.next_message(2, "{}");
            reg.add(c.next_message(3, "{}"));
        }
        reg.clear_all_gaps();
        for publisher in ["a", "b"] {
            let buffer = reg.buffer(&ChainKey::new(publisher, "c")).unwrap();
            assert!(buffer.gap_generation().is_none());
        }
    }

    #[test]
    fn test_is_next_for_unknown_chain() {
        let reg = registry(OrderingConfig::default());
        assert!(reg.is_next(&chain("a").next_message(5, "{}")));
    }
}
