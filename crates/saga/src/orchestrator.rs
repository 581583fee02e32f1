//! Saga orchestrator: drives create-accommodation sagas over a message channel.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use accommodation::NewAccommodation;
use async_trait::async_trait;
use common::SagaId;
use messaging::{Envelope, MessageChannel, MessageHandler, Subscription};
use tokio::sync::{Notify, watch};
use tokio::time::Instant;

use crate::compensation::Compensation;
use crate::create_accommodation::{SAGA_TYPE, STEP_CREATE_ACCOMMODATION, SagaSubjects};
use crate::error::{Result, SagaError};
use crate::instance::SagaInstance;
use crate::messages::{
    CODE_MALFORMED_REPLY, CreateAccommodationCommand, CreateAccommodationReply, ErrorDescriptor,
    ReplyOutcome,
};
use crate::policy::RetryPolicy;
use crate::state::SagaStatus;

/// Finished sagas kept queryable; the oldest are evicted first.
const ARCHIVE_CAPACITY: usize = 10_000;

/// What the orchestrator did with a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyDisposition {
    /// The reply advanced the saga to this status.
    Applied(SagaStatus),
    /// The saga already reached a terminal status; the reply was dropped.
    AlreadyTerminal,
    /// No saga with this correlation id is known.
    Unknown,
    /// The payload could not be decoded.
    Malformed,
}

struct SagaSlot {
    instance: tokio::sync::Mutex<SagaInstance>,
    status: watch::Sender<SagaStatus>,
    started: Instant,
}

impl SagaSlot {
    fn new(instance: SagaInstance) -> Self {
        let (status, _) = watch::channel(instance.status());
        Self {
            instance: tokio::sync::Mutex::new(instance),
            status,
            started: Instant::now(),
        }
    }
}

#[derive(Default)]
struct Archive {
    sagas: HashMap<SagaId, SagaInstance>,
    order: VecDeque<SagaId>,
}

impl Archive {
    fn insert(&mut self, instance: SagaInstance, capacity: usize) {
        let id = instance.id();
        if self.sagas.insert(id, instance).is_none() {
            self.order.push_back(id);
        }
        while self.order.len() > capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.sagas.remove(&oldest);
            }
        }
    }
}

struct Inner {
    channel: Arc<dyn MessageChannel>,
    subjects: SagaSubjects,
    policy: RetryPolicy,
    compensations: RwLock<Vec<(String, Arc<dyn Compensation>)>>,
    live: Mutex<HashMap<SagaId, Arc<SagaSlot>>>,
    archive: Mutex<Archive>,
    accepting: AtomicBool,
    settled: Notify,
    replies: Mutex<Option<Subscription>>,
}

/// Coordinates create-accommodation sagas.
///
/// Every saga runs on its own state: replies for different sagas are
/// processed concurrently, while replies and timeouts for one saga are
/// serialized by a per-saga lock. Finished sagas move to a bounded archive
/// so their outcome stays queryable.
///
/// The handle is cheap to clone; clones share the same sagas.
#[derive(Clone)]
pub struct SagaOrchestrator {
    inner: Arc<Inner>,
}

impl SagaOrchestrator {
    /// Creates an orchestrator publishing on `subjects.command` and
    /// consuming replies from `subjects.reply`.
    pub fn new(channel: Arc<dyn MessageChannel>, subjects: SagaSubjects, policy: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                channel,
                subjects,
                policy,
                compensations: RwLock::new(Vec::new()),
                live: Mutex::new(HashMap::new()),
                archive: Mutex::new(Archive::default()),
                accepting: AtomicBool::new(true),
                settled: Notify::new(),
                replies: Mutex::new(None),
            }),
        }
    }

    /// Registers the compensating action for a completed `step`.
    pub fn with_compensation(self, step: impl Into<String>, compensation: Arc<dyn Compensation>) -> Self {
        self.inner
            .compensations
            .write()
            .unwrap()
            .push((step.into(), compensation));
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.inner.policy
    }

    /// Subscribes to the reply subject. Replies only advance sagas after this.
    pub async fn listen(&self) -> Result<()> {
        let listener = Arc::new(ReplyListener {
            inner: Arc::downgrade(&self.inner),
        });
        let subscription = self
            .inner
            .channel
            .subscribe(
                &self.inner.subjects.reply,
                &self.inner.subjects.queue_group,
                listener,
            )
            .await?;
        tracing::info!(subject = %self.inner.subjects.reply, "saga orchestrator listening for replies");
        *self.inner.replies.lock().unwrap() = Some(subscription);
        Ok(())
    }

    /// Starts a saga and returns its id without waiting for the outcome.
    ///
    /// The saga is registered before the command is published, so a reply
    /// can never arrive for an unknown saga.
    #[tracing::instrument(skip(self, payload), fields(saga_type = SAGA_TYPE))]
    pub async fn start(&self, payload: NewAccommodation) -> Result<SagaId> {
        if !self.inner.accepting.load(Ordering::SeqCst) {
            return Err(SagaError::ShuttingDown);
        }

        let saga_id = SagaId::new();
        let command = CreateAccommodationCommand {
            payload: payload.clone(),
        };
        let envelope = Envelope::encode(&self.inner.subjects.command, saga_id, &command)?;
        let slot = Arc::new(SagaSlot::new(SagaInstance::start(saga_id, payload)));

        // Hold the saga lock until the command is out so an early reply waits.
        let guard = slot.instance.lock().await;
        self.inner
            .live
            .lock()
            .unwrap()
            .insert(saga_id, slot.clone());

        if let Err(e) = self
            .inner
            .channel
            .publish(&self.inner.subjects.command, envelope)
            .await
        {
            self.inner.live.lock().unwrap().remove(&saga_id);
            drop(guard);
            tracing::error!(%saga_id, error = %e, "failed to publish command");
            metrics::counter!("saga_start_failures_total").increment(1);
            return Err(e.into());
        }
        drop(guard);

        metrics::counter!("saga_started_total").increment(1);
        metrics::gauge!("saga_in_flight").increment(1.0);
        tracing::info!(%saga_id, "saga started");

        tokio::spawn(Inner::watch_replies(self.inner.clone(), saga_id));
        Ok(saga_id)
    }

    /// Applies a reply to the saga it correlates with.
    pub async fn on_reply(&self, message: Envelope) -> ReplyDisposition {
        self.inner.on_reply(message).await
    }

    /// Waits until the saga is terminal and returns its final state.
    ///
    /// Giving up with [`SagaError::WaitTimeout`] does not affect the saga.
    pub async fn wait(&self, saga_id: SagaId, timeout: Duration) -> Result<SagaInstance> {
        let slot = self.inner.slot(saga_id);
        let Some(slot) = slot else {
            return self.inner.archived(saga_id).ok_or(SagaError::NotFound(saga_id));
        };
        let mut status = slot.status.subscribe();
        drop(slot);

        // A closed sender also ends the wait: the slot was archived.
        let settled = tokio::time::timeout(timeout, status.wait_for(|s| s.is_terminal()))
            .await
            .is_ok();
        if !settled {
            return Err(SagaError::WaitTimeout(saga_id));
        }
        self.inner.archived(saga_id).ok_or(SagaError::NotFound(saga_id))
    }

    /// Returns a snapshot of a live or archived saga.
    pub async fn status(&self, saga_id: SagaId) -> Option<SagaInstance> {
        match self.inner.slot(saga_id) {
            Some(slot) => Some(slot.instance.lock().await.clone()),
            None => self.inner.archived(saga_id),
        }
    }

    /// Number of sagas that have not reached a terminal status.
    pub fn in_flight(&self) -> usize {
        self.inner.live.lock().unwrap().len()
    }

    /// Stops accepting sagas and waits up to `grace` for in-flight ones.
    ///
    /// Returns the number of sagas still unfinished when the grace period
    /// ended. The reply subscription is released either way.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self, grace: Duration) -> usize {
        self.inner.accepting.store(false, Ordering::SeqCst);
        let deadline = Instant::now() + grace;

        loop {
            let settled = self.inner.settled.notified();
            if self.in_flight() == 0 {
                break;
            }
            if tokio::time::timeout_at(deadline, settled).await.is_err() {
                break;
            }
        }

        if let Some(subscription) = self.inner.replies.lock().unwrap().take() {
            subscription.unsubscribe();
        }

        let remaining = self.in_flight();
        if remaining > 0 {
            tracing::warn!(remaining, "shutdown grace period elapsed with sagas in flight");
        } else {
            tracing::info!("saga orchestrator drained");
        }
        remaining
    }
}

impl Inner {
    fn slot(&self, saga_id: SagaId) -> Option<Arc<SagaSlot>> {
        self.live.lock().unwrap().get(&saga_id).cloned()
    }

    fn archived(&self, saga_id: SagaId) -> Option<SagaInstance> {
        self.archive.lock().unwrap().sagas.get(&saga_id).cloned()
    }

    #[tracing::instrument(
        skip(self, message),
        fields(saga_id = %message.correlation_id, attempt = message.attempt)
    )]
    async fn on_reply(&self, message: Envelope) -> ReplyDisposition {
        let saga_id = message.correlation_id;
        let Some(slot) = self.slot(saga_id) else {
            return self.discard(saga_id);
        };

        let reply: CreateAccommodationReply = match message.decode() {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "malformed reply discarded");
                metrics::counter!("saga_replies_discarded_total", "reason" => "malformed")
                    .increment(1);
                return ReplyDisposition::Malformed;
            }
        };

        let mut instance = slot.instance.lock().await;
        if instance.is_terminal() {
            drop(instance);
            return self.discard(saga_id);
        }

        let applied = match (reply.outcome, reply.accommodation) {
            (ReplyOutcome::Success, Some(accommodation)) => instance
                .record_created(accommodation)
                .and_then(|_| instance.complete()),
            (ReplyOutcome::Success, None) => {
                self.compensate(
                    &mut instance,
                    ErrorDescriptor::new(CODE_MALFORMED_REPLY, "success reply without a record"),
                    Some(STEP_CREATE_ACCOMMODATION),
                )
                .await
            }
            (ReplyOutcome::Failure { error }, _) => {
                tracing::info!(code = %error.code, "participant reported failure");
                self.compensate(&mut instance, error, None).await
            }
        };

        if let Err(e) = applied {
            tracing::error!(error = %e, "reply could not be applied");
            return ReplyDisposition::Applied(instance.status());
        }

        let status = instance.status();
        self.finish(&slot, &instance);
        ReplyDisposition::Applied(status)
    }

    fn discard(&self, saga_id: SagaId) -> ReplyDisposition {
        if self.archived(saga_id).is_some() {
            tracing::debug!("reply for finished saga discarded");
            metrics::counter!("saga_replies_discarded_total", "reason" => "terminal").increment(1);
            ReplyDisposition::AlreadyTerminal
        } else {
            tracing::warn!("reply for unknown saga discarded");
            metrics::counter!("saga_replies_discarded_total", "reason" => "unknown").increment(1);
            ReplyDisposition::Unknown
        }
    }

    /// Runs compensations for completed steps in reverse order and moves the
    /// saga to `Compensated` or `Failed`.
    ///
    /// `unconfirmed` names a step whose command went out without a usable
    /// reply. It may still have taken effect, so its compensation runs first.
    /// Cleaning it up does not count as compensating the saga.
    async fn compensate(
        &self,
        instance: &mut SagaInstance,
        failure: ErrorDescriptor,
        unconfirmed: Option<&str>,
    ) -> Result<()> {
        instance.begin_compensation(failure)?;

        let steps: Vec<String> = instance.completed_steps().iter().rev().cloned().collect();
        let mut compensated = !steps.is_empty();

        if let Some(step) = unconfirmed
            && !steps.iter().any(|s| s == step)
        {
            match self.compensation_for(step) {
                Some(compensation) => {
                    if let Err(e) = compensation.compensate(instance).await {
                        tracing::error!(step, error = %e, "cleanup of unconfirmed step failed");
                        compensated = false;
                    }
                }
                None => tracing::debug!(step, "no compensation for unconfirmed step"),
            }
        }

        for step in steps {
            match self.compensation_for(&step) {
                Some(compensation) => {
                    if let Err(e) = compensation.compensate(instance).await {
                        tracing::error!(step = %step, error = %e, "compensation failed");
                        compensated = false;
                    }
                }
                None => {
                    tracing::warn!(step = %step, "no compensation registered");
                    compensated = false;
                }
            }
        }

        instance.finish_compensation(compensated)
    }

    fn compensation_for(&self, step: &str) -> Option<Arc<dyn Compensation>> {
        self.compensations
            .read()
            .unwrap()
            .iter()
            .find(|(name, _)| name == step)
            .map(|(_, c)| c.clone())
    }

    /// Archives a terminal saga and wakes its waiters.
    fn finish(&self, slot: &SagaSlot, instance: &SagaInstance) {
        let saga_id = instance.id();
        let status = instance.status();

        self.archive
            .lock()
            .unwrap()
            .insert(instance.clone(), ARCHIVE_CAPACITY);
        self.live.lock().unwrap().remove(&saga_id);
        slot.status.send_replace(status);
        self.settled.notify_waiters();

        let elapsed = slot.started.elapsed().as_secs_f64();
        metrics::histogram!("saga_duration_seconds").record(elapsed);
        metrics::gauge!("saga_in_flight").decrement(1.0);
        match status {
            SagaStatus::Completed => {
                metrics::counter!("saga_completed_total").increment(1);
                tracing::info!(%saga_id, duration_secs = elapsed, "saga completed");
            }
            _ => {
                let code = instance
                    .failure()
                    .map(|f| f.code.clone())
                    .unwrap_or_default();
                metrics::counter!("saga_failed_total", "code" => code.clone()).increment(1);
                tracing::warn!(%saga_id, %status, code = %code, duration_secs = elapsed, "saga failed");
            }
        }
    }

    /// Re-publishes the command while no reply arrives, then fails the saga.
    async fn watch_replies(self: Arc<Self>, saga_id: SagaId) {
        loop {
            tokio::time::sleep(self.policy.reply_timeout).await;

            let Some(slot) = self.slot(saga_id) else {
                return;
            };
            let attempt = {
                let instance = slot.instance.lock().await;
                if instance.status() != SagaStatus::Started {
                    return;
                }
                instance.attempt()
            };

            if !self.policy.can_retry(attempt) {
                let mut instance = slot.instance.lock().await;
                if instance.status() != SagaStatus::Started {
                    return;
                }
                tracing::warn!(%saga_id, attempts = attempt, "no reply within retry budget");
                match self
                    .compensate(
                        &mut instance,
                        ErrorDescriptor::timeout(attempt),
                        Some(STEP_CREATE_ACCOMMODATION),
                    )
                    .await
                {
                    Ok(()) => self.finish(&slot, &instance),
                    Err(e) => tracing::error!(%saga_id, error = %e, "timeout could not be applied"),
                }
                return;
            }

            tokio::time::sleep(self.policy.delay_before(attempt + 1)).await;

            let mut instance = slot.instance.lock().await;
            if instance.status() != SagaStatus::Started {
                return;
            }
            let attempt = instance.next_attempt();
            let command = CreateAccommodationCommand {
                payload: instance.payload().clone(),
            };
            let published = match Envelope::encode(&self.subjects.command, saga_id, &command) {
                Ok(envelope) => self
                    .channel
                    .publish(&self.subjects.command, envelope.with_attempt(attempt))
                    .await
                    .map_err(SagaError::from),
                Err(e) => Err(e.into()),
            };
            drop(instance);

            metrics::counter!("saga_redeliveries_total").increment(1);
            match published {
                Ok(()) => tracing::info!(%saga_id, attempt, "command redelivered"),
                Err(e) => tracing::warn!(%saga_id, attempt, error = %e, "redelivery failed"),
            }
        }
    }
}

struct ReplyListener {
    inner: Weak<Inner>,
}

#[async_trait]
impl MessageHandler for ReplyListener {
    async fn handle(&self, message: Envelope) {
        if let Some(inner) = self.inner.upgrade() {
            inner.on_reply(message).await;
        }
    }
}
