//! Integration tests for the in-memory channel's delivery semantics.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::SagaId;
use messaging::{Envelope, InMemoryChannel, MessageChannel, MessageHandler, handler_fn};
use tokio::sync::mpsc;

fn counting_handler(counter: Arc<AtomicUsize>) -> Arc<dyn MessageHandler> {
    handler_fn(move |_m: Envelope| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    })
}

async fn settle() {
    // Delivery runs on spawned tasks; give them a chance to drain.
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test]
async fn test_queue_group_delivers_each_message_once() {
    let channel = InMemoryChannel::new();
    let a = Arc::new(AtomicUsize::new(0));
    let b = Arc::new(AtomicUsize::new(0));

    let _sa = channel
        .subscribe("cmd", "workers", counting_handler(a.clone()))
        .await
        .unwrap();
    let _sb = channel
        .subscribe("cmd", "workers", counting_handler(b.clone()))
        .await
        .unwrap();

    for _ in 0..10 {
        channel
            .publish("cmd", Envelope::new("cmd", SagaId::new(), serde_json::Value::Null))
            .await
            .unwrap();
    }
    settle().await;

    let total = a.load(Ordering::SeqCst) + b.load(Ordering::SeqCst);
    assert_eq!(total, 10);
    // Round-robin spreads the load across competing consumers.
    assert_eq!(a.load(Ordering::SeqCst), 5);
    assert_eq!(b.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_distinct_queue_groups_each_get_a_copy() {
    let channel = InMemoryChannel::new();
    let a = Arc::new(AtomicUsize::new(0));
    let b = Arc::new(AtomicUsize::new(0));

    let _sa = channel
        .subscribe("evt", "audit", counting_handler(a.clone()))
        .await
        .unwrap();
    let _sb = channel
        .subscribe("evt", "billing", counting_handler(b.clone()))
        .await
        .unwrap();

    channel
        .publish("evt", Envelope::new("evt", SagaId::new(), serde_json::Value::Null))
        .await
        .unwrap();
    settle().await;

    assert_eq!(a.load(Ordering::SeqCst), 1);
    assert_eq!(b.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_subjects_are_isolated() {
    let channel = InMemoryChannel::new();
    let a = Arc::new(AtomicUsize::new(0));
    let _sa = channel
        .subscribe("one", "g", counting_handler(a.clone()))
        .await
        .unwrap();

    channel
        .publish("two", Envelope::new("two", SagaId::new(), serde_json::Value::Null))
        .await
        .unwrap();
    settle().await;

    assert_eq!(a.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery() {
    let channel = InMemoryChannel::new();
    let a = Arc::new(AtomicUsize::new(0));
    let sub = channel
        .subscribe("cmd", "g", counting_handler(a.clone()))
        .await
        .unwrap();
    sub.unsubscribe();

    channel
        .publish("cmd", Envelope::new("cmd", SagaId::new(), serde_json::Value::Null))
        .await
        .unwrap();
    settle().await;

    assert_eq!(a.load(Ordering::SeqCst), 0);
    assert_eq!(channel.subscriber_count("cmd"), 0);
}

#[tokio::test]
async fn test_duplicate_delivery_redelivers_same_message() {
    let channel = InMemoryChannel::new();
    channel.set_duplicate_delivery(true);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = channel
        .subscribe(
            "cmd",
            "g",
            handler_fn(move |m: Envelope| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(m);
                }
            }),
        )
        .await
        .unwrap();

    let saga_id = SagaId::new();
    channel
        .publish("cmd", Envelope::new("cmd", saga_id, serde_json::Value::Null))
        .await
        .unwrap();

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(first.message_id, second.message_id);
    assert_eq!(first.correlation_id, saga_id);
}

#[tokio::test]
async fn test_panicking_handler_does_not_stop_delivery() {
    let channel = InMemoryChannel::new();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();

    let _sub = channel
        .subscribe(
            "cmd",
            "g",
            handler_fn(move |m: Envelope| {
                let counter = counter.clone();
                async move {
                    if m.attempt == 1 {
                        panic!("handler fault");
                    }
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }),
        )
        .await
        .unwrap();

    channel
        .publish("cmd", Envelope::new("cmd", SagaId::new(), serde_json::Value::Null))
        .await
        .unwrap();
    channel
        .publish(
            "cmd",
            Envelope::new("cmd", SagaId::new(), serde_json::Value::Null).with_attempt(2),
        )
        .await
        .unwrap();
    settle().await;

    assert_eq!(seen.load(Ordering::SeqCst), 1);
}
