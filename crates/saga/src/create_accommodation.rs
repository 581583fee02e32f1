//! Create-accommodation saga constants and subject wiring.

/// The saga type identifier for accommodation creation.
pub const SAGA_TYPE: &str = "CreateAccommodation";

/// Step name: persist the accommodation.
pub const STEP_CREATE_ACCOMMODATION: &str = "create_accommodation";

/// Default subject for creation commands.
pub const DEFAULT_COMMAND_SUBJECT: &str = "accommodation.create.command";

/// Default subject for creation replies.
pub const DEFAULT_REPLY_SUBJECT: &str = "accommodation.create.reply";

/// Queue group shared by all replicas of this service.
pub const DEFAULT_QUEUE_GROUP: &str = "accommodation_service";

/// Subjects and queue group used by one saga step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SagaSubjects {
    pub command: String,
    pub reply: String,
    pub queue_group: String,
}

impl SagaSubjects {
    pub fn new(
        command: impl Into<String>,
        reply: impl Into<String>,
        queue_group: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            reply: reply.into(),
            queue_group: queue_group.into(),
        }
    }
}

impl Default for SagaSubjects {
    fn default() -> Self {
        Self::new(
            DEFAULT_COMMAND_SUBJECT,
            DEFAULT_REPLY_SUBJECT,
            DEFAULT_QUEUE_GROUP,
        )
    }
}
