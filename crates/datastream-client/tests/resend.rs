//! Resend requests and gap filling.

mod common;

use std::time::Duration;

use tokio::time::Instant;

use datastream_client::core::RequestId;
use datastream_client::order::{GapFillConfig, OrderError};
use datastream_client::protocol::{ControlMessage, ProtocolError};
use datastream_client::{ClientConfig, ResendSpec, SubscriptionEvent, TransportEvent};
use datastream_testkit::fixtures::{test_stream, PublisherFixture};

use common::{drain, kinds, numbers, options, Harness};

fn last(count: u64) -> ResendSpec {
    ResendSpec {
        last: Some(count),
        ..ResendSpec::default()
    }
}

#[tokio::test]
async fn broadcasts_wait_for_the_resend() {
    let mut h = Harness::connected(ClientConfig::default()).await;
    let mut handle = h.subscribed(options().with_resend(last(2))).await;
    let request = h.take_sent().await.pop().unwrap();
    assert!(matches!(request, ControlMessage::ResendLast { count: 2, .. }));

    let messages = PublisherFixture::new(test_stream()).publish_numbered(3);
    h.broadcast(messages[2].clone()).await;
    h.resend(&request, &messages[..2]).await;

    let events = drain(&mut handle);
    assert_eq!(
        kinds(&events),
        vec!["subscribed", "resending", "message", "message", "resent", "message"]
    );
    assert_eq!(numbers(&events), vec![1, 2, 3]);
}

#[tokio::test]
async fn failed_resend_releases_held_broadcasts() {
    let mut h = Harness::connected(ClientConfig::default()).await;
    let mut handle = h.subscribed(options().with_resend(last(2))).await;
    let request = h.take_sent().await.pop().unwrap();

    let mut publisher = PublisherFixture::new(test_stream());
    h.broadcast(publisher.publish(&serde_json::json!({ "n": 1 }))).await;
    h.inject(TransportEvent::ErrorResponse {
        request_id: Some(request.request_id()),
        message: "storage unavailable".into(),
    })
    .await;

    let events = drain(&mut handle);
    assert!(matches!(
        &events[1],
        SubscriptionEvent::Error(ProtocolError::ResendFailed { request_id, .. })
            if *request_id == request.request_id()
    ));
    assert_eq!(numbers(&events), vec![1]);
}

#[tokio::test]
async fn resent_message_for_unknown_request_is_reported() {
    let mut h = Harness::connected(ClientConfig::default()).await;
    let mut handle = h.subscribed(options()).await;
    drain(&mut handle);

    let message = PublisherFixture::new(test_stream()).publish(&serde_json::json!({ "n": 1 }));
    h.inject(TransportEvent::UnicastMessage {
        request_id: RequestId(999),
        message,
    })
    .await;

    assert!(matches!(
        drain(&mut handle).as_slice(),
        [SubscriptionEvent::Error(ProtocolError::UnexpectedResend { request_id: RequestId(999) })]
    ));
}

#[tokio::test(start_paused = true)]
async fn gap_is_requested_and_filled() {
    let mut h = Harness::connected(ClientConfig::default()).await;
    let mut handle = h.subscribed(options()).await;
    h.take_sent().await;
    let mut publisher = PublisherFixture::new(test_stream());
    let messages = publisher.publish_numbered(3);

    h.broadcast(messages[0].clone()).await;
    h.broadcast(messages[2].clone()).await;

    let start = Instant::now();
    h.gap_tick().await;
    assert_eq!(start.elapsed(), Duration::from_secs(5));

    let sent = h.take_sent().await;
    let [request @ ControlMessage::ResendRange {
        from,
        to,
        publisher_id,
        msg_chain_id,
        ..
    }] = sent.as_slice()
    else {
        panic!("expected one ranged resend, got {sent:?}");
    };
    assert_eq!(*from, messages[0].message_ref().next_in_sequence());
    assert_eq!(*to, messages[1].message_ref());
    assert_eq!(publisher_id.as_deref(), Some(publisher.publisher_id().as_str()));
    assert_eq!(msg_chain_id.as_deref(), Some("chain-0"));

    h.resend(request, &messages[1..2]).await;

    let events = drain(&mut handle);
    assert_eq!(
        kinds(&events),
        vec!["subscribed", "message", "gap", "resending", "message", "message", "resent"]
    );
    assert_eq!(numbers(&events), vec![1, 2, 3]);

    // Nothing left to chase.
    let next = tokio::time::timeout(Duration::from_secs(60), h.client.next_gap_tick()).await;
    assert!(next.is_err());
}

#[tokio::test(start_paused = true)]
async fn unfilled_gap_gives_up_after_max_requests() {
    let mut h = Harness::connected(ClientConfig::default()).await;
    let mut handle = h.subscribed(options()).await;
    h.take_sent().await;
    let messages = PublisherFixture::new(test_stream()).publish_numbered(3);

    h.broadcast(messages[0].clone()).await;
    h.broadcast(messages[2].clone()).await;

    let mut requests = 0;
    for _ in 0..11 {
        h.gap_tick().await;
        for request in h.take_sent().await {
            assert!(matches!(request, ControlMessage::ResendRange { .. }));
            requests += 1;
            h.resend(&request, &[]).await;
        }
    }
    assert_eq!(requests, 10);

    let events = drain(&mut handle);
    assert_eq!(kinds(&events).iter().filter(|k| **k == "gap").count(), 10);
    assert!(matches!(
        events.last(),
        Some(SubscriptionEvent::Error(ProtocolError::Order(OrderError::GapFillFailed {
            attempts: 10,
            ..
        })))
    ));

    let next = tokio::time::timeout(Duration::from_secs(60), h.client.next_gap_tick()).await;
    assert!(next.is_err());
}

#[tokio::test(start_paused = true)]
async fn no_gap_fill_while_resending() {
    let mut h = Harness::connected(ClientConfig::default()).await;
    let mut handle = h.subscribed(options().with_resend(last(3))).await;
    let request = h.take_sent().await.pop().unwrap();
    let messages = PublisherFixture::new(test_stream()).publish_numbered(3);

    // The resend itself has a hole.
    for message in [&messages[0], &messages[2]] {
        h.inject(TransportEvent::UnicastMessage {
            request_id: request.request_id(),
            message: message.clone(),
        })
        .await;
    }

    h.gap_tick().await;
    assert!(h.take_sent().await.is_empty());

    h.inject(TransportEvent::ResendResponseResent {
        stream: test_stream(),
        request_id: request.request_id(),
    })
    .await;

    h.gap_tick().await;
    assert!(matches!(
        h.take_sent().await.as_slice(),
        [ControlMessage::ResendRange { .. }]
    ));
    assert_eq!(numbers(&drain(&mut handle)), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn subscription_gap_settings_override_the_client() {
    let mut h = Harness::connected(ClientConfig::default()).await;
    let gap_fill = GapFillConfig {
        interval: Duration::from_secs(1),
        max_gap_requests: 1,
        enabled: true,
    };
    let mut handle = h.subscribed(options().with_gap_fill(gap_fill)).await;
    h.take_sent().await;
    let messages = PublisherFixture::new(test_stream()).publish_numbered(3);

    h.broadcast(messages[0].clone()).await;
    h.broadcast(messages[2].clone()).await;

    let start = Instant::now();
    h.gap_tick().await;
    assert_eq!(start.elapsed(), Duration::from_secs(1));
    let request = h.take_sent().await.pop().unwrap();
    h.resend(&request, &[]).await;

    h.gap_tick().await;
    assert_eq!(start.elapsed(), Duration::from_secs(2));
    assert!(h.take_sent().await.is_empty());
    assert!(matches!(
        drain(&mut handle).last(),
        Some(SubscriptionEvent::Error(ProtocolError::Order(_)))
    ));
}

#[tokio::test(start_paused = true)]
async fn gap_fill_disabled_only_buffers() {
    let config = ClientConfig {
        gap_fill: false,
        ..ClientConfig::default()
    };
    let mut h = Harness::connected(config).await;
    let mut handle = h.subscribed(options()).await;
    let messages = PublisherFixture::new(test_stream()).publish_numbered(3);

    h.broadcast(messages[0].clone()).await;
    h.broadcast(messages[2].clone()).await;

    let next = tokio::time::timeout(Duration::from_secs(60), h.client.next_gap_tick()).await;
    assert!(next.is_err());

    h.broadcast(messages[1].clone()).await;
    assert_eq!(numbers(&drain(&mut handle)), vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn unsubscribe_cancels_pending_gap_fill() {
    let mut h = Harness::connected(ClientConfig::default()).await;
    let handle = h.subscribed(options()).await;
    h.take_sent().await;
    let messages = PublisherFixture::new(test_stream()).publish_numbered(3);

    h.broadcast(messages[0].clone()).await;
    h.broadcast(messages[2].clone()).await;
    h.client.unsubscribe(handle.id()).await.unwrap();

    let next = tokio::time::timeout(Duration::from_secs(60), h.client.next_gap_tick()).await;
    assert!(next.is_err());
    assert!(matches!(
        h.take_sent().await.as_slice(),
        [ControlMessage::Unsubscribe { .. }]
    ));
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_gap_fill() {
    let mut h = Harness::connected(ClientConfig::default()).await;
    let _handle = h.subscribed(options()).await;
    h.take_sent().await;
    let messages = PublisherFixture::new(test_stream()).publish_numbered(3);

    h.broadcast(messages[0].clone()).await;
    h.broadcast(messages[2].clone()).await;
    h.client.disconnect().await.unwrap();

    let next = tokio::time::timeout(Duration::from_secs(60), h.client.next_gap_tick()).await;
    assert!(next.is_err());
    assert!(h.take_sent().await.is_empty());
}
