use super::*;
use tokio::time::{Duration, timeout};

fn channel() -> (mpsc::Sender<Utf8Bytes>, mpsc::Receiver<Utf8Bytes>) {
    mpsc::channel(8)
}

async fn recv_message(rx: &mut mpsc::Receiver<Utf8Bytes>) -> ChatMessage {
    let text = timeout(Duration::from_millis(200), rx.recv())
        .await
        .expect("broadcast receive timed out")
        .expect("channel closed unexpectedly");
    envelope::decode(text.as_str()).expect("broadcast should be a valid envelope")
}

fn assert_no_message(rx: &mut mpsc::Receiver<Utf8Bytes>) {
    assert!(rx.try_recv().is_err(), "expected no broadcast");
}

// =============================================================================
// USERNAMES
// =============================================================================

#[test]
fn generated_username_has_prefix_and_bounded_suffix() {
    for _ in 0..200 {
        let name = generate_username();
        let suffix = name.strip_prefix("User").expect("User prefix");
        let n: u32 = suffix.parse().expect("numeric suffix");
        assert!(n < 1000);
    }
}

// =============================================================================
// REGISTER / UNREGISTER
// =============================================================================

#[tokio::test]
async fn register_returns_username_and_tracks_entry() {
    let registry = Registry::new();
    let (tx, _rx) = channel();
    let id = Uuid::new_v4();

    let name = registry.register(id, tx).await;

    assert!(name.starts_with("User"));
    assert!(registry.contains(id).await);
    assert_eq!(registry.usernames().await, vec![name]);
}

#[tokio::test]
async fn usernames_follow_connection_order() {
    let registry = Registry::new();
    let mut expected = Vec::new();
    let mut keep = Vec::new();
    for _ in 0..4 {
        let (tx, rx) = channel();
        keep.push(rx);
        expected.push(registry.register(Uuid::new_v4(), tx).await);
    }
    assert_eq!(registry.usernames().await, expected);
}

#[tokio::test]
async fn unregister_returns_username_once() {
    let registry = Registry::new();
    let (tx, _rx) = channel();
    let id = Uuid::new_v4();
    let name = registry.register(id, tx).await;

    assert_eq!(registry.unregister(id).await, Some(name));
    assert_eq!(registry.unregister(id).await, None);
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn unregister_unknown_connection_is_noop() {
    let registry = Registry::new();
    let (tx, _rx) = channel();
    registry.register(Uuid::new_v4(), tx).await;

    assert_eq!(registry.unregister(Uuid::new_v4()).await, None);
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn reregistering_same_connection_keeps_single_entry() {
    let registry = Registry::new();
    let id = Uuid::new_v4();
    let (tx_a, _rx_a) = channel();
    let (tx_b, _rx_b) = channel();

    registry.register(id, tx_a).await;
    let second = registry.register(id, tx_b).await;

    assert_eq!(registry.len().await, 1);
    assert_eq!(registry.usernames().await, vec![second]);
}

#[tokio::test]
async fn mixed_register_unregister_sequence_leaves_exact_survivors() {
    let registry = Registry::new();
    let ids: Vec<Uuid> = (0..6).map(|_| Uuid::new_v4()).collect();
    let mut keep = Vec::new();
    for id in &ids {
        let (tx, rx) = channel();
        keep.push(rx);
        registry.register(*id, tx).await;
    }

    registry.unregister(ids[1]).await;
    registry.unregister(ids[4]).await;
    registry.unregister(ids[1]).await;

    for (i, id) in ids.iter().enumerate() {
        assert_eq!(registry.contains(*id).await, i != 1 && i != 4, "entry {i}");
    }
    assert_eq!(registry.len().await, 4);
}

// =============================================================================
// BROADCAST
// =============================================================================

#[tokio::test]
async fn broadcast_without_exclusion_reaches_everyone() {
    let registry = Registry::new();
    let (tx_a, mut rx_a) = channel();
    let (tx_b, mut rx_b) = channel();
    registry.register(Uuid::new_v4(), tx_a).await;
    registry.register(Uuid::new_v4(), tx_b).await;

    registry.broadcast(&ChatMessage::system("hello all"), None).await;

    assert_eq!(recv_message(&mut rx_a).await.data, "hello all");
    assert_eq!(recv_message(&mut rx_b).await.data, "hello all");
}

#[tokio::test]
async fn broadcast_skips_excluded_connection() {
    let registry = Registry::new();
    let a = Uuid::new_v4();
    let (tx_a, mut rx_a) = channel();
    let (tx_b, mut rx_b) = channel();
    let (tx_c, mut rx_c) = channel();
    registry.register(a, tx_a).await;
    registry.register(Uuid::new_v4(), tx_b).await;
    registry.register(Uuid::new_v4(), tx_c).await;

    registry.broadcast(&ChatMessage::system("not for a"), Some(a)).await;

    assert_eq!(recv_message(&mut rx_b).await.data, "not for a");
    assert_eq!(recv_message(&mut rx_c).await.data, "not for a");
    assert_no_message(&mut rx_a);
}

#[tokio::test]
async fn broadcast_skips_closed_connections_and_continues() {
    let registry = Registry::new();
    let (tx_dead, rx_dead) = channel();
    let (tx_live, mut rx_live) = channel();
    registry.register(Uuid::new_v4(), tx_dead).await;
    registry.register(Uuid::new_v4(), tx_live).await;
    drop(rx_dead);

    registry.broadcast(&ChatMessage::system("still delivered"), None).await;

    assert_eq!(recv_message(&mut rx_live).await.data, "still delivered");
}

#[tokio::test]
async fn broadcast_drops_for_full_queue_without_blocking_others() {
    let registry = Registry::new();
    let (tx_full, mut rx_full) = mpsc::channel(1);
    let (tx_live, mut rx_live) = channel();
    registry.register(Uuid::new_v4(), tx_full).await;
    registry.register(Uuid::new_v4(), tx_live).await;

    registry.broadcast(&ChatMessage::system("first"), None).await;
    registry.broadcast(&ChatMessage::system("second"), None).await;

    assert_eq!(recv_message(&mut rx_full).await.data, "first");
    assert_no_message(&mut rx_full);
    assert_eq!(recv_message(&mut rx_live).await.data, "first");
    assert_eq!(recv_message(&mut rx_live).await.data, "second");
}

#[tokio::test]
async fn broadcast_to_empty_registry_is_noop() {
    let registry = Registry::new();
    registry.broadcast(&ChatMessage::system("nobody"), None).await;
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn broadcast_sends_identical_wire_text_to_all() {
    let registry = Registry::new();
    let (tx_a, mut rx_a) = channel();
    let (tx_b, mut rx_b) = channel();
    registry.register(Uuid::new_v4(), tx_a).await;
    registry.register(Uuid::new_v4(), tx_b).await;

    registry.broadcast(&ChatMessage::chat("User1", "same"), None).await;

    let a = rx_a.recv().await.expect("a");
    let b = rx_b.recv().await.expect("b");
    assert_eq!(a.as_str(), b.as_str());
}
