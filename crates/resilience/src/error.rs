//! Resilience error types.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by [`CircuitBreaker::call`](crate::CircuitBreaker::call).
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The breaker is open; the dependency was not called.
    #[error("Circuit breaker '{name}' is open")]
    Open { name: String },

    /// Another caller is probing the dependency; the dependency was not called.
    #[error("Circuit breaker '{name}' is probing the dependency")]
    ProbeInFlight { name: String },

    /// The call did not finish in time. Counted as a failure.
    #[error("Call timed out after {0:?}")]
    Timeout(Duration),

    /// The dependency answered and refused the request. Not counted.
    #[error("Dependency rejected the call: {0}")]
    Rejected(E),

    /// The dependency failed. Counted as a failure.
    #[error("Dependency failed: {0}")]
    Failed(E),
}

/// Errors returned by [`ReadThroughCache::fetch`](crate::ReadThroughCache::fetch).
#[derive(Debug, Error)]
pub enum CacheError<E> {
    /// The backing store failed on a miss.
    #[error("Backing store error: {0}")]
    Store(E),

    /// The backing store did not answer within the fetch timeout.
    #[error("Backing store timed out after {0:?}")]
    Timeout(Duration),
}
