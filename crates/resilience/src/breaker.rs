//! Circuit breaker.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::BreakerError;

/// How an error returned by a guarded call should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The dependency answered and refused the request (bad credentials,
    /// missing role). It is healthy; the outcome does not count.
    ClientRejection,
    /// The dependency is unhealthy or unreachable.
    ServerFailure,
}

/// Classifies errors of a guarded call.
pub trait Classify {
    fn classify(&self) -> FailureClass;
}

/// State of a [`CircuitBreaker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakerState {
    /// Calls pass through.
    Closed,
    /// Calls are rejected without reaching the dependency.
    Open,
    /// One probe call is allowed to test the dependency.
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }

    fn gauge_value(&self) -> f64 {
        match self {
            BreakerState::Closed => 0.0,
            BreakerState::Open => 1.0,
            BreakerState::HalfOpen => 2.0,
        }
    }
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSettings {
    /// Name used in logs, errors and metric labels.
    pub name: String,
    /// Consecutive counted failures that open the breaker.
    pub trip_after: u32,
    /// Time spent open before a probe is allowed.
    pub cool_down: Duration,
    /// Upper bound for a single call. Elapsing counts as a failure.
    pub call_timeout: Option<Duration>,
}

impl BreakerSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn trip_after(mut self, failures: u32) -> Self {
        self.trip_after = failures.max(1);
        self
    }

    pub fn cool_down(mut self, cool_down: Duration) -> Self {
        self.cool_down = cool_down;
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            trip_after: 3,
            cool_down: Duration::from_secs(10),
            call_timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Ignored,
    Failure,
}

#[derive(Debug)]
struct Core {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    /// Bumped on every transition; results of calls admitted earlier are dropped.
    generation: u64,
}

/// Guards calls to one dependency.
///
/// State transitions are serialized under a mutex; the guarded call runs
/// outside of it, so any number of calls may be in flight while closed.
#[derive(Debug)]
pub struct CircuitBreaker {
    settings: BreakerSettings,
    core: Mutex<Core>,
}

impl CircuitBreaker {
    pub fn new(settings: BreakerSettings) -> Self {
        metrics::gauge!("circuit_breaker_state", "name" => settings.name.clone())
            .set(BreakerState::Closed.gauge_value());
        Self {
            settings,
            core: Mutex::new(Core {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
                generation: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    /// Current state. An open breaker whose cool-down elapsed reports `HalfOpen`.
    pub fn state(&self) -> BreakerState {
        let mut core = self.core.lock().unwrap();
        self.refresh(&mut core);
        core.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.core.lock().unwrap().consecutive_failures
    }

    /// Runs `call` if the breaker admits it and records the outcome.
    pub async fn call<F, Fut, T, E>(&self, call: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        let mut ticket = self.admit::<E>()?;

        let result = match self.settings.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, call()).await {
                Ok(result) => result,
                Err(_) => {
                    ticket.record(Outcome::Failure);
                    return Err(BreakerError::Timeout(limit));
                }
            },
            None => call().await,
        };

        match result {
            Ok(value) => {
                ticket.record(Outcome::Success);
                Ok(value)
            }
            Err(e) => match e.classify() {
                FailureClass::ClientRejection => {
                    ticket.record(Outcome::Ignored);
                    Err(BreakerError::Rejected(e))
                }
                FailureClass::ServerFailure => {
                    ticket.record(Outcome::Failure);
                    Err(BreakerError::Failed(e))
                }
            },
        }
    }

    fn admit<E>(&self) -> Result<Ticket<'_>, BreakerError<E>> {
        let mut core = self.core.lock().unwrap();
        self.refresh(&mut core);

        match core.state {
            BreakerState::Closed => Ok(Ticket::new(self, core.generation, false)),
            BreakerState::HalfOpen if !core.probe_in_flight => {
                core.probe_in_flight = true;
                tracing::debug!(breaker = %self.settings.name, "probe admitted");
                Ok(Ticket::new(self, core.generation, true))
            }
            BreakerState::HalfOpen => {
                self.count_rejection("probe_in_flight");
                Err(BreakerError::ProbeInFlight {
                    name: self.settings.name.clone(),
                })
            }
            BreakerState::Open => {
                self.count_rejection("open");
                Err(BreakerError::Open {
                    name: self.settings.name.clone(),
                })
            }
        }
    }

    fn count_rejection(&self, reason: &'static str) {
        metrics::counter!(
            "circuit_breaker_rejections_total",
            "name" => self.settings.name.clone(),
            "reason" => reason
        )
        .increment(1);
    }

    /// Moves an open breaker to half-open once the cool-down elapsed.
    fn refresh(&self, core: &mut Core) {
        if core.state == BreakerState::Open
            && core
                .opened_at
                .is_some_and(|at| at.elapsed() >= self.settings.cool_down)
        {
            self.transition(core, BreakerState::HalfOpen);
        }
    }

    fn record(&self, generation: u64, outcome: Outcome) {
        let mut core = self.core.lock().unwrap();
        if core.generation != generation {
            tracing::trace!(breaker = %self.settings.name, "stale outcome dropped");
            return;
        }

        match (core.state, outcome) {
            (BreakerState::Closed, Outcome::Success) => core.consecutive_failures = 0,
            (BreakerState::Closed, Outcome::Ignored) => {}
            (BreakerState::Closed, Outcome::Failure) => {
                core.consecutive_failures += 1;
                if core.consecutive_failures >= self.settings.trip_after {
                    self.transition(&mut core, BreakerState::Open);
                }
            }
            (BreakerState::HalfOpen, Outcome::Success | Outcome::Ignored) => {
                self.transition(&mut core, BreakerState::Closed);
            }
            (BreakerState::HalfOpen, Outcome::Failure) => {
                self.transition(&mut core, BreakerState::Open);
            }
            (BreakerState::Open, _) => {}
        }
    }

    fn abandon_probe(&self, generation: u64) {
        let mut core = self.core.lock().unwrap();
        if core.generation == generation && core.state == BreakerState::HalfOpen {
            core.probe_in_flight = false;
        }
    }

    fn transition(&self, core: &mut Core, to: BreakerState) {
        let from = core.state;
        core.state = to;
        core.generation += 1;
        core.probe_in_flight = false;
        match to {
            BreakerState::Open => core.opened_at = Some(Instant::now()),
            BreakerState::Closed => {
                core.consecutive_failures = 0;
                core.opened_at = None;
            }
            BreakerState::HalfOpen => {}
        }

        tracing::warn!(
            breaker = %self.settings.name,
            %from,
            %to,
            failures = core.consecutive_failures,
            "circuit breaker state changed"
        );
        metrics::gauge!("circuit_breaker_state", "name" => self.settings.name.clone())
            .set(to.gauge_value());
    }
}

/// Admission of one call. Dropping an unrecorded probe frees the probe slot.
struct Ticket<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    probe: bool,
    recorded: bool,
}

impl<'a> Ticket<'a> {
    fn new(breaker: &'a CircuitBreaker, generation: u64, probe: bool) -> Self {
        Self {
            breaker,
            generation,
            probe,
            recorded: false,
        }
    }

    fn record(&mut self, outcome: Outcome) {
        self.recorded = true;
        self.breaker.record(self.generation, outcome);
    }
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        if self.probe && !self.recorded {
            self.breaker.abandon_probe(self.generation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq)]
    enum TestError {
        Down,
        Forbidden,
    }

    impl Classify for TestError {
        fn classify(&self) -> FailureClass {
            match self {
                TestError::Down => FailureClass::ServerFailure,
                TestError::Forbidden => FailureClass::ClientRejection,
            }
        }
    }

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            BreakerSettings::new("test")
                .trip_after(3)
                .cool_down(Duration::from_secs(10)),
        )
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<(), BreakerError<TestError>> {
        breaker.call(|| async { Err::<(), _>(TestError::Down) }).await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<u32, BreakerError<TestError>> {
        breaker.call(|| async { Ok::<_, TestError>(7) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_trips_after_consecutive_failures() {
        let breaker = breaker();
        for _ in 0..2 {
            assert!(matches!(fail(&breaker).await, Err(BreakerError::Failed(_))));
        }
        assert_eq!(breaker.state(), BreakerState::Closed);

        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_counter() {
        let breaker = breaker();
        fail(&breaker).await.unwrap_err();
        fail(&breaker).await.unwrap_err();
        assert_eq!(succeed(&breaker).await.unwrap(), 7);
        assert_eq!(breaker.consecutive_failures(), 0);

        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_rejects_without_calling() {
        let breaker = breaker();
        for _ in 0..3 {
            fail(&breaker).await.unwrap_err();
        }

        let calls = AtomicUsize::new(0);
        let result = breaker
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TestError>(())
            })
            .await;

        assert!(matches!(result, Err(BreakerError::Open { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_rejections_never_trip() {
        let breaker = breaker();
        for _ in 0..10 {
            let result = breaker
                .call(|| async { Err::<(), _>(TestError::Forbidden) })
                .await;
            assert!(matches!(result, Err(BreakerError::Rejected(TestError::Forbidden))));
        }
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_after_cool_down_and_probe_closes() {
        let breaker = breaker();
        for _ in 0..3 {
            fail(&breaker).await.unwrap_err();
        }

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(breaker.state(), BreakerState::Open);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        assert_eq!(succeed(&breaker).await.unwrap(), 7);
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_reopens() {
        let breaker = breaker();
        for _ in 0..3 {
            fail(&breaker).await.unwrap_err();
        }
        tokio::time::advance(Duration::from_secs(10)).await;

        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), BreakerState::Open);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(matches!(
            succeed(&breaker).await,
            Err(BreakerError::Open { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_probe_closes() {
        let breaker = breaker();
        for _ in 0..3 {
            fail(&breaker).await.unwrap_err();
        }
        tokio::time::advance(Duration::from_secs(10)).await;

        breaker
            .call(|| async { Err::<(), _>(TestError::Forbidden) })
            .await
            .unwrap_err();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_one_probe_in_flight() {
        let breaker = Arc::new(breaker());
        for _ in 0..3 {
            fail(&breaker).await.unwrap_err();
        }
        tokio::time::advance(Duration::from_secs(10)).await;

        let (release, wait) = tokio::sync::oneshot::channel::<()>();
        let probe = {
            let breaker = breaker.clone();
            tokio::spawn(async move {
                breaker
                    .call(|| async move {
                        let _ = wait.await;
                        Ok::<_, TestError>(1)
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        assert!(matches!(
            succeed(&breaker).await,
            Err(BreakerError::ProbeInFlight { .. })
        ));

        release.send(()).unwrap();
        assert_eq!(probe.await.unwrap().unwrap(), 1);
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_probe_frees_slot() {
        let breaker = breaker();
        for _ in 0..3 {
            fail(&breaker).await.unwrap_err();
        }
        tokio::time::advance(Duration::from_secs(10)).await;

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            breaker.call(|| std::future::pending::<Result<(), TestError>>()),
        )
        .await;
        assert!(abandoned.is_err());

        assert_eq!(succeed(&breaker).await.unwrap(), 7);
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_timeout_counts_as_failure() {
        let breaker = CircuitBreaker::new(
            BreakerSettings::new("slow")
                .trip_after(1)
                .call_timeout(Duration::from_millis(50)),
        );

        let result = breaker
            .call(|| async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, TestError>(())
            })
            .await;

        assert!(matches!(result, Err(BreakerError::Timeout(_))));
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_outcome_does_not_affect_new_state() {
        let breaker = Arc::new(CircuitBreaker::new(BreakerSettings::new("stale").trip_after(1)));

        let (release, wait) = tokio::sync::oneshot::channel::<()>();
        let slow = {
            let breaker = breaker.clone();
            tokio::spawn(async move {
                breaker
                    .call(|| async move {
                        let _ = wait.await;
                        Ok::<_, TestError>(())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), BreakerState::Open);

        release.send(()).unwrap();
        slow.await.unwrap().unwrap();
        assert_eq!(breaker.state(), BreakerState::Open);
    }
}
