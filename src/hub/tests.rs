use super::*;
use crate::connection::OutboundFrame;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_test::assert_ok;

fn test_config() -> HubConfig {
    HubConfig {
        submission_timeout_ms: 1_000,
        send_timeout_ms: 100,
        outbound_buffer: 8,
    }
}

fn peer(topic: &str) -> (Connection, mpsc::Receiver<OutboundFrame>) {
    peer_with_capacity(topic, 8)
}

fn peer_with_capacity(topic: &str, capacity: usize) -> (Connection, mpsc::Receiver<OutboundFrame>) {
    let (tx, rx) = mpsc::channel(capacity);
    let conn = Connection::from_parts(ConnectionId::new(), topic, tx, Duration::from_millis(100));
    (conn, rx)
}

/// Commands are applied in submission order, so a stats round-trip
/// guarantees every previously submitted operation has been applied.
async fn settled(hub: &Hub) -> HubStats {
    hub.stats().await.unwrap()
}

#[tokio::test]
async fn broadcast_reaches_only_the_matching_topic() {
    let hub = Hub::spawn(test_config());
    let (a, mut rx_a) = peer("42");
    let (b, mut rx_b) = peer("43");

    assert_ok!(hub.register(a).await);
    assert_ok!(hub.register(b).await);
    assert_ok!(hub.broadcast("42", b"hi".to_vec()).await);
    settled(&hub).await;

    assert_eq!(rx_a.try_recv(), Ok(OutboundFrame::Payload(b"hi".to_vec())));
    assert_eq!(rx_b.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test]
async fn registered_connection_receives_exact_payload() {
    let hub = Hub::spawn(test_config());
    let (a, mut rx_a) = peer("42");

    assert_ok!(hub.register(a).await);
    assert_ok!(hub.broadcast("42", b"hello".to_vec()).await);

    assert_eq!(rx_a.recv().await, Some(OutboundFrame::Payload(b"hello".to_vec())));
}

#[tokio::test]
async fn broadcast_all_reaches_only_untagged_connections() {
    let hub = Hub::spawn(test_config());
    let (a, mut rx_a) = peer("");
    let (b, mut rx_b) = peer("7");

    assert_ok!(hub.register(a).await);
    assert_ok!(hub.register(b).await);
    assert_ok!(hub.broadcast_all(b"ping".to_vec()).await);
    settled(&hub).await;

    assert_eq!(rx_a.try_recv(), Ok(OutboundFrame::Payload(b"ping".to_vec())));
    assert_eq!(rx_b.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test]
async fn empty_topic_broadcast_selects_the_untagged_group() {
    let hub = Hub::spawn(test_config());
    let (a, mut rx_a) = peer("");
    let (b, mut rx_b) = peer("7");

    assert_ok!(hub.register(a).await);
    assert_ok!(hub.register(b).await);
    assert_ok!(hub.broadcast("", b"x".to_vec()).await);
    settled(&hub).await;

    assert_eq!(rx_a.try_recv(), Ok(OutboundFrame::Payload(b"x".to_vec())));
    assert_eq!(rx_b.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test]
async fn unregister_is_idempotent() {
    let hub = Hub::spawn(test_config());
    let (a, mut rx_a) = peer("1");
    let id = a.id();

    assert_ok!(hub.register(a).await);
    assert_ok!(hub.unregister(id).await);
    assert_ok!(hub.unregister(id).await);
    assert_ok!(hub.unregister(ConnectionId::new()).await);
    assert_ok!(hub.broadcast("1", b"bye".to_vec()).await);
    let stats = settled(&hub).await;

    assert_eq!(stats.connections, 0);
    // The first unregister closed the connection; nothing was delivered and
    // no second close was issued. The handle itself was dropped with the
    // registry entry, so the channel reports disconnection after the one
    // close frame.
    assert_eq!(rx_a.try_recv(), Ok(OutboundFrame::Close));
    assert_eq!(rx_a.try_recv(), Err(TryRecvError::Disconnected));
}

#[tokio::test]
async fn failed_delivery_evicts_the_connection() {
    let hub = Hub::spawn(test_config());
    let (a, rx_a) = peer("5");
    let id = a.id();
    drop(rx_a); // peer is gone before the broadcast

    assert_ok!(hub.register(a).await);
    assert_ok!(hub.broadcast("5", b"x".to_vec()).await);
    let stats = settled(&hub).await;

    assert_eq!(stats.connections, 0);
    // Eviction already removed it; a later unregister is a silent no-op.
    assert_ok!(hub.unregister(id).await);
}

#[tokio::test]
async fn evicted_connection_is_skipped_by_later_broadcasts() {
    let hub = Hub::spawn(test_config());
    let (alive, mut rx_alive) = peer("5");
    let (dead, rx_dead) = peer("5");
    drop(rx_dead);

    assert_ok!(hub.register(alive).await);
    assert_ok!(hub.register(dead).await);
    assert_ok!(hub.broadcast("5", b"first".to_vec()).await);
    assert_ok!(hub.broadcast("5", b"second".to_vec()).await);
    let stats = settled(&hub).await;

    assert_eq!(stats.connections, 1);
    assert_eq!(rx_alive.try_recv(), Ok(OutboundFrame::Payload(b"first".to_vec())));
    assert_eq!(rx_alive.try_recv(), Ok(OutboundFrame::Payload(b"second".to_vec())));
}

#[tokio::test]
async fn slow_peer_is_evicted_when_its_buffer_stays_full() {
    let hub = Hub::spawn(test_config());
    let (tx, _rx) = mpsc::channel(1);
    tx.try_send(OutboundFrame::Payload(b"stuck".to_vec())).unwrap();
    let slow = Connection::from_parts(ConnectionId::new(), "5", tx, Duration::from_millis(50));

    assert_ok!(hub.register(slow).await);
    assert_ok!(hub.broadcast("5", b"x".to_vec()).await);
    let stats = settled(&hub).await;

    assert_eq!(stats.connections, 0);
}

#[tokio::test]
async fn broadcast_with_no_matching_connections_is_a_no_op() {
    let hub = Hub::spawn(test_config());
    let (a, mut rx_a) = peer("1");

    assert_ok!(hub.register(a).await);
    assert_ok!(hub.broadcast("9", b"x".to_vec()).await);
    let stats = settled(&hub).await;

    assert_eq!(stats.connections, 1);
    assert_eq!(rx_a.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test]
async fn registration_completing_first_is_applied_before_broadcast() {
    let hub = Hub::spawn(test_config());
    let (a, mut rx_a) = peer("t");

    // register's submission completes before broadcast is submitted, so the
    // broadcast must observe the registration.
    assert_ok!(hub.register(a).await);
    assert_ok!(hub.broadcast("t", b"m".to_vec()).await);

    assert_eq!(rx_a.recv().await, Some(OutboundFrame::Payload(b"m".to_vec())));
}

#[tokio::test]
async fn broadcasts_are_delivered_in_submission_order() {
    let hub = Hub::spawn(test_config());
    let (a, mut rx_a) = peer("t");

    assert_ok!(hub.register(a).await);
    assert_ok!(hub.broadcast("t", b"one".to_vec()).await);
    assert_ok!(hub.broadcast("t", b"two".to_vec()).await);
    settled(&hub).await;

    assert_eq!(rx_a.try_recv(), Ok(OutboundFrame::Payload(b"one".to_vec())));
    assert_eq!(rx_a.try_recv(), Ok(OutboundFrame::Payload(b"two".to_vec())));
}

#[tokio::test]
async fn re_registering_an_identity_replaces_the_previous_handle() {
    let hub = Hub::spawn(test_config());
    let id = ConnectionId::new();
    let (tx_old, mut rx_old) = mpsc::channel(8);
    let (tx_new, mut rx_new) = mpsc::channel(8);
    let old = Connection::from_parts(id, "t", tx_old, Duration::from_millis(100));
    let new = Connection::from_parts(id, "t", tx_new, Duration::from_millis(100));

    assert_ok!(hub.register(old).await);
    assert_ok!(hub.register(new).await);
    assert_ok!(hub.broadcast("t", b"m".to_vec()).await);
    let stats = settled(&hub).await;

    assert_eq!(stats.connections, 1);
    assert_eq!(rx_new.try_recv(), Ok(OutboundFrame::Payload(b"m".to_vec())));
    // The replaced handle was dropped without delivery.
    assert_eq!(rx_old.try_recv(), Err(TryRecvError::Disconnected));
}

#[tokio::test]
async fn stats_counts_connections_per_topic() {
    let hub = Hub::spawn(test_config());
    let (a, _rx_a) = peer("1");
    let (b, _rx_b) = peer("1");
    let (c, _rx_c) = peer("2");
    let (d, _rx_d) = peer("");

    assert_ok!(hub.register(a).await);
    assert_ok!(hub.register(b).await);
    assert_ok!(hub.register(c).await);
    assert_ok!(hub.register(d).await);
    let stats = settled(&hub).await;

    assert_eq!(stats.connections, 4);
    assert_eq!(stats.untagged, 1);
    assert_eq!(stats.topics.get("1"), Some(&2));
    assert_eq!(stats.topics.get("2"), Some(&1));
}

#[tokio::test]
async fn shutdown_closes_every_registered_connection() {
    let hub = Hub::spawn(test_config());
    let (a, mut rx_a) = peer("1");
    let (b, mut rx_b) = peer("2");

    assert_ok!(hub.register(a).await);
    assert_ok!(hub.register(b).await);
    assert_ok!(hub.shutdown().await);

    assert_eq!(rx_a.recv().await, Some(OutboundFrame::Close));
    assert_eq!(rx_b.recv().await, Some(OutboundFrame::Close));

    // The loop is gone: new operations fail, a second shutdown succeeds.
    let (late, _rx_late) = peer("3");
    assert!(matches!(hub.register(late).await, Err(HubError::Closed)));
    assert_ok!(hub.shutdown().await);
}

#[tokio::test]
async fn submission_times_out_when_the_loop_is_stalled() {
    let hub = Hub::spawn(HubConfig {
        submission_timeout_ms: 50,
        send_timeout_ms: 500,
        outbound_buffer: 8,
    });
    let (tx, _rx) = mpsc::channel(1);
    tx.try_send(OutboundFrame::Payload(b"stuck".to_vec())).unwrap();
    let slow = Connection::from_parts(ConnectionId::new(), "t", tx, Duration::from_millis(500));

    assert_ok!(hub.register(slow).await);
    // First broadcast is accepted and stalls the loop inside its bounded
    // send; the second occupies the submission channel; the third cannot be
    // accepted within the submission timeout.
    assert_ok!(hub.broadcast("t", b"a".to_vec()).await);
    assert_ok!(hub.broadcast("t", b"b".to_vec()).await);
    assert!(matches!(
        hub.broadcast("t", b"c".to_vec()).await,
        Err(HubError::SubmissionTimeout)
    ));
}
