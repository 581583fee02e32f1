//! Saga error types.

use accommodation::StoreError;
use common::SagaId;
use messaging::TransportError;
use thiserror::Error;

use crate::messages::ErrorDescriptor;
use crate::state::SagaStatus;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Publishing or subscribing failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Store error raised by a participant or compensation.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// No reply arrived within the retry budget.
    #[error("Saga {saga_id} timed out after {attempts} attempt(s)")]
    Timeout { saga_id: SagaId, attempts: u32 },

    /// The caller stopped waiting; the saga keeps running.
    #[error("Gave up waiting for saga {0}")]
    WaitTimeout(SagaId),

    /// No live or archived saga with this id.
    #[error("Saga not found: {0}")]
    NotFound(SagaId),

    /// The state machine does not allow this transition.
    #[error("Invalid saga transition: {from} -> {to}")]
    InvalidTransition { from: SagaStatus, to: SagaStatus },

    /// Saga is in an invalid state for the requested operation.
    #[error("Invalid saga state: expected {expected}, actual {actual}")]
    InvalidState { expected: String, actual: SagaStatus },

    /// A saga step failed.
    #[error("Saga step '{step}' failed: {error}")]
    StepFailed { step: String, error: ErrorDescriptor },

    /// A compensation step failed.
    #[error("Compensation step '{step}' failed: {reason}")]
    CompensationFailed { step: String, reason: String },

    /// The orchestrator no longer accepts new sagas.
    #[error("Saga orchestrator is shutting down")]
    ShuttingDown,
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
