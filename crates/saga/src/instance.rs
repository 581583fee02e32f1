//! Saga instance: the orchestrator's record of one saga run.

use accommodation::{Accommodation, NewAccommodation};
use chrono::{DateTime, Utc};
use common::SagaId;
use serde::Serialize;

use crate::create_accommodation::{SAGA_TYPE, STEP_CREATE_ACCOMMODATION};
use crate::error::{Result, SagaError};
use crate::messages::ErrorDescriptor;
use crate::state::SagaStatus;

/// Kind of saga an instance runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SagaType {
    CreateAccommodation,
}

impl SagaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaType::CreateAccommodation => SAGA_TYPE,
        }
    }
}

impl std::fmt::Display for SagaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of one saga run.
///
/// Status only changes through the transition methods, which enforce the
/// [`SagaStatus`] state machine and keep the history in order.
#[derive(Debug, Clone, Serialize)]
pub struct SagaInstance {
    id: SagaId,
    saga_type: SagaType,
    status: SagaStatus,
    payload: NewAccommodation,
    attempt: u32,
    completed_steps: Vec<String>,
    accommodation: Option<Accommodation>,
    failure: Option<ErrorDescriptor>,
    history: Vec<SagaStatus>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SagaInstance {
    /// Creates a saga in `Started` on its first attempt.
    pub fn start(id: SagaId, payload: NewAccommodation) -> Self {
        let now = Utc::now();
        Self {
            id,
            saga_type: SagaType::CreateAccommodation,
            status: SagaStatus::Started,
            payload,
            attempt: 1,
            completed_steps: Vec::new(),
            accommodation: None,
            failure: None,
            history: vec![SagaStatus::Started],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> SagaId {
        self.id
    }

    pub fn saga_type(&self) -> SagaType {
        self.saga_type
    }

    pub fn status(&self) -> SagaStatus {
        self.status
    }

    pub fn payload(&self) -> &NewAccommodation {
        &self.payload
    }

    /// Current delivery attempt (1-based).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Steps that completed, in execution order.
    pub fn completed_steps(&self) -> &[String] {
        &self.completed_steps
    }

    pub fn accommodation(&self) -> Option<&Accommodation> {
        self.accommodation.as_ref()
    }

    pub fn failure(&self) -> Option<&ErrorDescriptor> {
        self.failure.as_ref()
    }

    /// Every status the saga has held, oldest first.
    pub fn history(&self) -> &[SagaStatus] {
        &self.history
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Moves to `next` if the state machine allows it.
    pub fn transition(&mut self, next: SagaStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(SagaError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.history.push(next);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Bumps the attempt counter for a redelivery and returns the new value.
    pub fn next_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.updated_at = Utc::now();
        self.attempt
    }

    /// Records a successful creation reply.
    pub fn record_created(&mut self, accommodation: Accommodation) -> Result<()> {
        self.transition(SagaStatus::AccommodationCreated)?;
        self.completed_steps
            .push(STEP_CREATE_ACCOMMODATION.to_string());
        self.accommodation = Some(accommodation);
        Ok(())
    }

    pub fn complete(&mut self) -> Result<()> {
        self.transition(SagaStatus::Completed)
    }

    /// Enters `Compensating`, recording why the saga failed.
    pub fn begin_compensation(&mut self, failure: ErrorDescriptor) -> Result<()> {
        self.transition(SagaStatus::Compensating)?;
        self.failure = Some(failure);
        Ok(())
    }

    /// Leaves `Compensating`: `Compensated` if every completed step was undone,
    /// `Failed` otherwise.
    pub fn finish_compensation(&mut self, compensated: bool) -> Result<()> {
        if compensated {
            self.transition(SagaStatus::Compensated)
        } else {
            self.transition(SagaStatus::Failed)
        }
    }

    /// Converts a terminal instance into the created record or the failure.
    pub fn result(&self) -> Result<Accommodation> {
        match (self.status, &self.accommodation, &self.failure) {
            (SagaStatus::Completed, Some(accommodation), _) => Ok(accommodation.clone()),
            (SagaStatus::Failed | SagaStatus::Compensated, _, Some(error))
                if error.is_timeout() =>
            {
                Err(SagaError::Timeout {
                    saga_id: self.id,
                    attempts: self.attempt,
                })
            }
            (SagaStatus::Failed | SagaStatus::Compensated, _, Some(error)) => {
                Err(SagaError::StepFailed {
                    step: STEP_CREATE_ACCOMMODATION.to_string(),
                    error: error.clone(),
                })
            }
            (status, _, _) => Err(SagaError::InvalidState {
                expected: "terminal".to_string(),
                actual: status,
            }),
        }
    }
}
