//! Delivery order across publishers under arbitrary arrival orders.

use proptest::prelude::*;

use datastream_core::{MessageRef, StreamMessage, SubscriptionId};
use datastream_order::{ChainReorderRegistry, OrderingConfig};
use datastream_testkit::fixtures::{multi_publisher_fixtures, test_stream};
use datastream_testkit::generators::arrival_order;

fn publish(count: usize) -> (Vec<StreamMessage>, Vec<StreamMessage>) {
    let mut publishers = multi_publisher_fixtures(test_stream(), 2);
    let bob = publishers.pop().unwrap().publish_numbered(count as i64);
    let alice = publishers.pop().unwrap().publish_numbered(count as i64);
    (alice, bob)
}

fn refs_of(delivered: &[StreamMessage], publisher_id: &str) -> Vec<MessageRef> {
    delivered
        .iter()
        .filter(|m| m.publisher_id() == publisher_id)
        .map(StreamMessage::message_ref)
        .collect()
}

proptest! {
    #[test]
    fn each_publisher_is_delivered_exactly_once_in_order(
        alice_order in arrival_order(16),
        bob_order in arrival_order(16),
    ) {
        let (alice, bob) = publish(16);
        let mut registry = ChainReorderRegistry::new(SubscriptionId(0), OrderingConfig::default(), None);

        // Interleave the two arrival sequences.
        let mut delivered = Vec::new();
        let longest = alice_order.len().max(bob_order.len());
        for i in 0..longest {
            if let Some(&a) = alice_order.get(i) {
                delivered.extend(registry.add(alice[a].clone()));
            }
            if let Some(&b) = bob_order.get(i) {
                delivered.extend(registry.add(bob[b].clone()));
            }
        }

        let expected_alice: Vec<_> = alice.iter().map(StreamMessage::message_ref).collect();
        let expected_bob: Vec<_> = bob.iter().map(StreamMessage::message_ref).collect();
        prop_assert_eq!(refs_of(&delivered, alice[0].publisher_id()), expected_alice);
        prop_assert_eq!(refs_of(&delivered, bob[0].publisher_id()), expected_bob);
    }

    #[test]
    fn unordered_registry_passes_everything_through(order in arrival_order(10)) {
        let (alice, _) = publish(10);
        let config = OrderingConfig { order_messages: false, ..OrderingConfig::default() };
        let mut registry = ChainReorderRegistry::new(SubscriptionId(0), config, None);

        let mut delivered = 0;
        for &i in &order {
            delivered += registry.add(alice[i].clone()).len();
        }
        prop_assert_eq!(delivered, order.len());
    }
}

#[test]
fn gap_is_pending_until_predecessor_arrives() {
    let (alice, _) = publish(4);
    let mut registry = ChainReorderRegistry::new(SubscriptionId(0), OrderingConfig::default(), None);

    assert_eq!(registry.add(alice[0].clone()).len(), 1);
    assert!(registry.add(alice[2].clone()).is_empty());
    assert!(registry.add(alice[3].clone()).is_empty());

    let buffer = registry.buffer(&alice[0].chain_key()).unwrap();
    assert_eq!(buffer.pending_len(), 2);
    assert!(buffer.gap_generation().is_some());

    let released = registry.add(alice[1].clone());
    assert_eq!(released.len(), 3);
    let buffer = registry.buffer(&alice[0].chain_key()).unwrap();
    assert_eq!(buffer.pending_len(), 0);
    assert_eq!(buffer.gap_generation(), None);
}
