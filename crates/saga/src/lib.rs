//! Saga orchestration for creating accommodations.
//!
//! Creating an accommodation is agreed upon over asynchronous messaging
//! only: the orchestrator publishes a command, a participant persists the
//! record and replies, and the orchestrator advances or compensates the
//! saga based on the reply (or on the lack of one).
//!
//! The create-accommodation saga has a single step:
//! 1. Create accommodation (`create_accommodation`)
//!
//! If the saga fails, completed steps are compensated in reverse order
//! through registered [`Compensation`]s.

pub mod compensation;
pub mod create_accommodation;
pub mod error;
pub mod handler;
pub mod instance;
pub mod messages;
pub mod orchestrator;
pub mod policy;
pub mod state;

pub use compensation::{Compensation, RemoveCreatedAccommodation};
pub use create_accommodation::SagaSubjects;
pub use error::{Result, SagaError};
pub use handler::CreateAccommodationHandler;
pub use instance::{SagaInstance, SagaType};
pub use messages::{CreateAccommodationCommand, CreateAccommodationReply, ErrorDescriptor, ReplyOutcome};
pub use orchestrator::{ReplyDisposition, SagaOrchestrator};
pub use policy::RetryPolicy;
pub use state::SagaStatus;
