//! Publish/subscribe contract.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::envelope::Envelope;
use crate::error::Result;

/// Receives messages delivered to a subscription.
///
/// Handlers return nothing: whatever goes wrong inside a handler is resolved
/// there (usually by replying with a failure outcome) and never reaches the
/// delivery loop.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handles one delivered message.
    async fn handle(&self, message: Envelope);
}

/// Topic-addressed publish/subscribe channel.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Publishes a message on `subject`.
    ///
    /// Errors are reported synchronously; the channel performs no retries.
    async fn publish(&self, subject: &str, message: Envelope) -> Result<()>;

    /// Subscribes `handler` to `subject` as a member of `queue_group`.
    ///
    /// Members of the same queue group compete for messages: each message
    /// on the subject is delivered to exactly one of them.
    async fn subscribe(
        &self,
        subject: &str,
        queue_group: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Subscription>;
}

type Detach = Box<dyn FnOnce() + Send>;

/// A live subscription. Dropping it detaches the subscriber.
pub struct Subscription {
    subject: String,
    queue_group: String,
    detach: Option<Detach>,
}

impl Subscription {
    /// Creates a subscription that runs `detach` once when unsubscribed or dropped.
    pub fn new(
        subject: impl Into<String>,
        queue_group: impl Into<String>,
        detach: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            subject: subject.into(),
            queue_group: queue_group.into(),
            detach: Some(Box::new(detach)),
        }
    }

    /// Returns the subscribed subject.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns the queue group this subscriber belongs to.
    pub fn queue_group(&self) -> &str {
        &self.queue_group
    }

    /// Stops delivery to this subscriber.
    pub fn unsubscribe(mut self) {
        self.run_detach();
    }

    fn run_detach(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
            tracing::debug!(
                subject = %self.subject,
                queue_group = %self.queue_group,
                "subscription detached"
            );
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("subject", &self.subject)
            .field("queue_group", &self.queue_group)
            .field("active", &self.detach.is_some())
            .finish()
    }
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Envelope) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    async fn handle(&self, message: Envelope) {
        (self.0)(message).await;
    }
}

/// Wraps an async closure as a [`MessageHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn MessageHandler>
where
    F: Fn(Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn detach_runs_once_on_unsubscribe() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let sub = Subscription::new("a", "g", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(sub.subject(), "a");
        assert_eq!(sub.queue_group(), "g");

        sub.unsubscribe();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn detach_runs_on_drop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        {
            let _sub = Subscription::new("a", "g", move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
