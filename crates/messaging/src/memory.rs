//! In-process message channel.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::channel::{MessageChannel, MessageHandler, Subscription};
use crate::envelope::Envelope;
use crate::error::{Result, TransportError};

struct Member {
    id: u64,
    tx: mpsc::UnboundedSender<Envelope>,
}

struct QueueGroup {
    name: String,
    members: Vec<Member>,
    cursor: usize,
}

impl QueueGroup {
    /// Hands `message` to the next live member, round-robin.
    ///
    /// Members whose delivery task has gone away are pruned on the way.
    fn deliver(&mut self, message: &Envelope, copies: usize) -> bool {
        while !self.members.is_empty() {
            let idx = self.cursor % self.members.len();
            self.cursor = self.cursor.wrapping_add(1);
            let member = &self.members[idx];
            let sent = (0..copies).all(|_| member.tx.send(message.clone()).is_ok());
            if sent {
                return true;
            }
            self.members.remove(idx);
        }
        false
    }
}

/// Number of published messages [`InMemoryChannel::new`] keeps for inspection.
pub const DEFAULT_HISTORY: usize = 1024;

/// Most recent published messages, oldest dropped first.
struct History {
    messages: VecDeque<Envelope>,
    capacity: usize,
}

impl History {
    fn record(&mut self, message: Envelope) {
        if self.capacity == 0 {
            return;
        }
        if self.messages.len() == self.capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(message);
    }
}

struct Inner {
    routes: Mutex<HashMap<String, Vec<QueueGroup>>>,
    published: Mutex<History>,
    next_member_id: AtomicU64,
    closed: AtomicBool,
    fail_on_publish: AtomicBool,
    duplicate_delivery: AtomicBool,
}

impl Inner {
    fn new(history: usize) -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            published: Mutex::new(History {
                messages: VecDeque::with_capacity(history.min(DEFAULT_HISTORY)),
                capacity: history,
            }),
            next_member_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            fail_on_publish: AtomicBool::new(false),
            duplicate_delivery: AtomicBool::new(false),
        }
    }

    fn detach(&self, subject: &str, member_id: u64) {
        let mut routes = self.routes.lock().unwrap();
        let now_empty = match routes.get_mut(subject) {
            Some(groups) => {
                for group in groups.iter_mut() {
                    group.members.retain(|m| m.id != member_id);
                }
                groups.retain(|g| !g.members.is_empty());
                groups.is_empty()
            }
            None => false,
        };
        if now_empty {
            routes.remove(subject);
        }
    }
}

/// In-process channel with queue-group semantics.
///
/// Each subscription owns a delivery task, so different subjects are
/// delivered concurrently while messages within one subscription are
/// handed to the handler in publish order. A panicking handler only loses
/// the message it was handling.
///
/// Cloning yields another handle to the same channel.
#[derive(Clone)]
pub struct InMemoryChannel {
    inner: Arc<Inner>,
}

impl Default for InMemoryChannel {
    fn default() -> Self {
        Self::with_history(DEFAULT_HISTORY)
    }
}

impl InMemoryChannel {
    /// Creates a new open channel with no subscribers that keeps the last
    /// [`DEFAULT_HISTORY`] published messages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a channel keeping at most `history` published messages.
    /// Zero disables recording.
    pub fn with_history(history: usize) -> Self {
        Self {
            inner: Arc::new(Inner::new(history)),
        }
    }

    /// Closes the channel.
    ///
    /// Subsequent publish and subscribe calls fail with
    /// [`TransportError::Closed`]. Delivery tasks finish the messages already
    /// queued to them and then exit.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.routes.lock().unwrap().clear();
        tracing::info!("message channel closed");
    }

    /// Returns true once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Makes every publish fail while set.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.inner.fail_on_publish.store(fail, Ordering::SeqCst);
    }

    /// Delivers every message twice to the chosen member while set.
    pub fn set_duplicate_delivery(&self, duplicate: bool) {
        self.inner.duplicate_delivery.store(duplicate, Ordering::SeqCst);
    }

    /// Returns the recorded messages published on `subject`, in publish order.
    pub fn published(&self, subject: &str) -> Vec<Envelope> {
        self.inner
            .published
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|m| m.subject == subject)
            .cloned()
            .collect()
    }

    /// Returns the number of subscribers currently attached to `subject`.
    pub fn subscriber_count(&self, subject: &str) -> usize {
        self.inner
            .routes
            .lock()
            .unwrap()
            .get(subject)
            .map(|groups| groups.iter().map(|g| g.members.len()).sum())
            .unwrap_or(0)
    }
}

#[async_trait]
impl MessageChannel for InMemoryChannel {
    async fn publish(&self, subject: &str, mut message: Envelope) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if self.inner.fail_on_publish.load(Ordering::SeqCst) {
            metrics::counter!("channel_publish_failures_total").increment(1);
            return Err(TransportError::Publish {
                subject: subject.to_string(),
                reason: "publisher unavailable".to_string(),
            });
        }

        message.subject = subject.to_string();
        let copies = if self.inner.duplicate_delivery.load(Ordering::SeqCst) {
            2
        } else {
            1
        };

        let mut delivered_groups = 0usize;
        {
            let mut routes = self.inner.routes.lock().unwrap();
            if let Some(groups) = routes.get_mut(subject) {
                for group in groups.iter_mut() {
                    if group.deliver(&message, copies) {
                        delivered_groups += 1;
                    }
                }
                groups.retain(|g| !g.members.is_empty());
            }
        }

        tracing::trace!(
            subject,
            correlation_id = %message.correlation_id,
            delivered_groups,
            "message published"
        );
        metrics::counter!("channel_messages_published_total").increment(1);
        self.inner.published.lock().unwrap().record(message);
        Ok(())
    }

    async fn subscribe(
        &self,
        subject: &str,
        queue_group: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Subscription> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
        let member_id = self.inner.next_member_id.fetch_add(1, Ordering::Relaxed);

        {
            let mut routes = self.inner.routes.lock().unwrap();
            let groups = routes.entry(subject.to_string()).or_default();
            match groups.iter_mut().find(|g| g.name == queue_group) {
                Some(group) => group.members.push(Member { id: member_id, tx }),
                None => groups.push(QueueGroup {
                    name: queue_group.to_string(),
                    members: vec![Member { id: member_id, tx }],
                    cursor: 0,
                }),
            }
        }

        let task_subject = subject.to_string();
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let handler = handler.clone();
                let correlation_id = message.correlation_id;
                if let Err(e) = tokio::spawn(async move { handler.handle(message).await }).await {
                    tracing::error!(
                        subject = %task_subject,
                        %correlation_id,
                        error = %e,
                        "message handler aborted"
                    );
                }
            }
        });

        tracing::debug!(subject, queue_group, member_id, "subscribed");

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let detach_subject = subject.to_string();
        Ok(Subscription::new(subject, queue_group, move || {
            if let Some(inner) = weak.upgrade() {
                inner.detach(&detach_subject, member_id);
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::handler_fn;
    use common::SagaId;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn recorder() -> (Arc<dyn MessageHandler>, UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = handler_fn(move |m: Envelope| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(m);
            }
        });
        (handler, rx)
    }

    fn message() -> Envelope {
        Envelope::new("ignored", SagaId::new(), serde_json::json!({"n": 1}))
    }

    #[tokio::test]
    async fn test_publish_sets_subject_and_records() {
        let channel = InMemoryChannel::new();
        channel.publish("bookings", message()).await.unwrap();

        let published = channel.published("bookings");
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].subject, "bookings");
    }

    #[tokio::test]
    async fn test_history_keeps_only_the_latest_messages() {
        let channel = InMemoryChannel::with_history(3);
        let mut ids = Vec::new();
        for _ in 0..10 {
            let m = message();
            ids.push(m.correlation_id);
            channel.publish("bookings", m).await.unwrap();
        }

        let kept: Vec<_> = channel
            .published("bookings")
            .iter()
            .map(|m| m.correlation_id)
            .collect();
        assert_eq!(kept, ids[7..]);
    }

    #[tokio::test]
    async fn test_zero_history_records_nothing_but_still_delivers() {
        let channel = InMemoryChannel::with_history(0);
        let (handler, mut rx) = recorder();
        let _sub = channel.subscribe("bookings", "g", handler).await.unwrap();

        for _ in 0..100 {
            channel.publish("bookings", message()).await.unwrap();
        }

        assert!(channel.published("bookings").is_empty());
        for _ in 0..100 {
            assert!(rx.recv().await.is_some());
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_not_an_error() {
        let channel = InMemoryChannel::new();
        assert!(channel.publish("nobody", message()).await.is_ok());
    }

    #[tokio::test]
    async fn test_fail_on_publish() {
        let channel = InMemoryChannel::new();
        channel.set_fail_on_publish(true);

        let result = channel.publish("bookings", message()).await;
        assert!(matches!(result, Err(TransportError::Publish { .. })));
        assert!(channel.published("bookings").is_empty());
    }

    #[tokio::test]
    async fn test_closed_channel_rejects_traffic() {
        let channel = InMemoryChannel::new();
        channel.close();

        assert!(matches!(
            channel.publish("bookings", message()).await,
            Err(TransportError::Closed)
        ));
        let (handler, _rx) = recorder();
        assert!(matches!(
            channel.subscribe("bookings", "g", handler).await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_subscriber_count_tracks_detach() {
        let channel = InMemoryChannel::new();
        let (h1, _rx1) = recorder();
        let (h2, _rx2) = recorder();
        let s1 = channel.subscribe("bookings", "g", h1).await.unwrap();
        let _s2 = channel.subscribe("bookings", "other", h2).await.unwrap();
        assert_eq!(channel.subscriber_count("bookings"), 2);

        s1.unsubscribe();
        assert_eq!(channel.subscriber_count("bookings"), 1);
    }
}
