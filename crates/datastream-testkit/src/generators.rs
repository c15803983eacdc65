//! Proptest generators for property-based testing.

use proptest::prelude::*;

use datastream_core::{MessageRef, ResendSpec};

/// Generate an arrival order for `len` messages of one chain.
///
/// Index 0 always arrives first, since the first message a subscriber sees
/// fixes where the chain starts for it. The rest arrive shuffled, followed by
/// up to `len / 2` duplicates of arbitrary indices.
pub fn arrival_order(len: usize) -> impl Strategy<Value = Vec<usize>> {
    assert!(len > 0, "arrival order needs at least one message");
    let rest: Vec<usize> = (1..len).collect();
    (
        Just(rest).prop_shuffle(),
        prop::collection::vec(0..len, 0..=len / 2),
    )
        .prop_map(|(shuffled, duplicates)| {
            let mut order = Vec::with_capacity(1 + shuffled.len() + duplicates.len());
            order.push(0);
            order.extend(shuffled);
            order.extend(duplicates);
            order
        })
}

/// Generate a message ref.
pub fn message_ref() -> impl Strategy<Value = MessageRef> {
    (0i64..=1_700_000_000_000i64, 0u64..16).prop_map(|(ts, seq)| MessageRef::new(ts, seq))
}

/// Generate a raw resend spec with any combination of fields set.
pub fn resend_spec() -> impl Strategy<Value = ResendSpec> {
    (
        proptest::option::of(1u64..1000),
        proptest::option::of(message_ref()),
        proptest::option::of(message_ref()),
        proptest::option::of("[0-9a-f]{8}"),
        proptest::option::of("chain-[0-9]"),
    )
        .prop_map(|(last, from, to, publisher_id, msg_chain_id)| ResendSpec {
            last,
            from,
            to,
            publisher_id,
            msg_chain_id,
        })
}
