// ABOUTME: Tests for the Steam delivery queue
// ABOUTME: FIFO flush, no double delivery, idempotent flush and failure retention

mod common;

use chatrelay_core::delivery::{ConnectionState, Delivery, DeliveryQueue};
use chatrelay_core::traits::OutboundMessage;
use common::MockSteam;

fn msg(text: &str) -> OutboundMessage {
    OutboundMessage::plain(text)
}

#[test]
fn test_new_queue_is_connecting_and_empty() {
    let queue = DeliveryQueue::new();
    assert_eq!(queue.state(), ConnectionState::Connecting);
    assert_eq!(queue.pending_len(), 0);
}

#[test]
fn test_example_scenario_hello_world() {
    let steam = MockSteam::new();
    let mut queue = DeliveryQueue::new();

    for text in ["hello", "world", "!"] {
        assert_eq!(queue.enqueue_or_send(&steam, msg(text)), Delivery::Queued);
    }
    let pending: Vec<_> = queue.pending().map(|m| m.text.as_str()).collect();
    assert_eq!(pending, vec!["hello", "world", "!"]);
    assert!(steam.sent().is_empty());

    assert_eq!(queue.on_authenticated(&steam).unwrap(), 3);
    assert_eq!(steam.sent(), vec!["hello", "world", "!"]);
    assert_eq!(queue.pending_len(), 0);
    assert_eq!(queue.state(), ConnectionState::Authenticated);

    assert_eq!(queue.enqueue_or_send(&steam, msg("late")), Delivery::Sent);
    assert_eq!(steam.sent(), vec!["hello", "world", "!", "late"]);
    assert_eq!(queue.pending_len(), 0);
}

#[test]
fn test_fifo_preserved_for_many_messages() {
    let steam = MockSteam::new();
    let mut queue = DeliveryQueue::new();
    queue.on_disconnected();

    let expected: Vec<String> = (0..250).map(|i| format!("message {}", i)).collect();
    for text in &expected {
        queue.enqueue_or_send(&steam, msg(text));
    }

    assert_eq!(queue.on_authenticated(&steam).unwrap(), expected.len());
    assert_eq!(steam.sent(), expected);
}

#[test]
fn test_no_double_delivery_across_reconnects() {
    let steam = MockSteam::new();
    let mut queue = DeliveryQueue::new();

    queue.enqueue_or_send(&steam, msg("queued"));
    queue.on_authenticated(&steam).unwrap();
    queue.enqueue_or_send(&steam, msg("direct"));

    // Second authentication must not resend anything
    queue.on_disconnected();
    assert_eq!(queue.on_authenticated(&steam).unwrap(), 0);
    assert_eq!(steam.sent(), vec!["queued", "direct"]);
}

#[test]
fn test_empty_flush_only_changes_state() {
    let steam = MockSteam::new();
    let mut queue = DeliveryQueue::new();

    assert_eq!(queue.on_authenticated(&steam).unwrap(), 0);
    assert_eq!(queue.state(), ConnectionState::Authenticated);
    assert!(steam.calls().is_empty());
}

#[test]
fn test_messages_after_disconnect_are_queued_again() {
    let steam = MockSteam::new();
    let mut queue = DeliveryQueue::new();
    queue.on_authenticated(&steam).unwrap();
    queue.on_disconnected();

    assert_eq!(queue.enqueue_or_send(&steam, msg("while down")), Delivery::Queued);
    assert!(steam.sent().is_empty());
    assert_eq!(queue.state(), ConnectionState::Disconnected);
}

#[test]
fn test_failed_flush_keeps_remaining_messages_in_order() {
    let steam = MockSteam::new();
    let mut queue = DeliveryQueue::new();
    for text in ["a", "b", "c"] {
        queue.enqueue_or_send(&steam, msg(text));
    }

    steam.set_fail_sends(true);
    let err = queue.on_authenticated(&steam).unwrap_err();
    assert!(format!("{:#}", err).contains("3 still queued"));
    assert_eq!(queue.state(), ConnectionState::Disconnected);
    let pending: Vec<_> = queue.pending().map(|m| m.text.clone()).collect();
    assert_eq!(pending, vec!["a", "b", "c"]);

    steam.set_fail_sends(false);
    assert_eq!(queue.on_authenticated(&steam).unwrap(), 3);
    assert_eq!(steam.sent(), vec!["a", "b", "c"]);
}

#[test]
fn test_failed_immediate_send_is_queued_not_dropped() {
    let steam = MockSteam::new();
    let mut queue = DeliveryQueue::new();
    queue.on_authenticated(&steam).unwrap();

    steam.set_fail_sends(true);
    assert_eq!(queue.enqueue_or_send(&steam, msg("first")), Delivery::Queued);
    assert_eq!(queue.state(), ConnectionState::Disconnected);
    assert_eq!(queue.enqueue_or_send(&steam, msg("second")), Delivery::Queued);

    steam.set_fail_sends(false);
    queue.on_authenticated(&steam).unwrap();
    assert_eq!(steam.sent(), vec!["first", "second"]);
}
