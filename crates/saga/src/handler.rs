//! Participant side of the saga: consumes creation commands and replies.

use std::sync::Arc;

use accommodation::{AccommodationStore, InsertOutcome};
use async_trait::async_trait;
use messaging::{Envelope, MessageChannel, MessageHandler, Subscription};

use crate::create_accommodation::SagaSubjects;
use crate::error::Result;
use crate::messages::{
    CreateAccommodationCommand, CreateAccommodationReply, ErrorDescriptor, ReplyOutcome,
};

/// Persists accommodations on behalf of the creation saga.
///
/// Duplicate deliveries of a command are detected through the saga id:
/// the store returns the record created by the first delivery and the
/// handler replies with it again.
pub struct CreateAccommodationHandler {
    store: Arc<dyn AccommodationStore>,
    channel: Arc<dyn MessageChannel>,
    subjects: SagaSubjects,
}

impl CreateAccommodationHandler {
    pub fn new(
        store: Arc<dyn AccommodationStore>,
        channel: Arc<dyn MessageChannel>,
        subjects: SagaSubjects,
    ) -> Self {
        Self {
            store,
            channel,
            subjects,
        }
    }

    /// Subscribes this handler to the command subject in the service queue group.
    pub async fn listen(self: &Arc<Self>) -> Result<Subscription> {
        let subscription = self
            .channel
            .subscribe(
                &self.subjects.command,
                &self.subjects.queue_group,
                self.clone(),
            )
            .await?;
        tracing::info!(
            subject = %self.subjects.command,
            queue_group = %self.subjects.queue_group,
            "command handler listening"
        );
        Ok(subscription)
    }

    /// Processes one command and publishes the reply.
    ///
    /// Returns the outcome that was sent. A reply that cannot be published is
    /// logged; the orchestrator's redelivery covers the loss.
    #[tracing::instrument(
        skip(self, message),
        fields(saga_id = %message.correlation_id, attempt = message.attempt)
    )]
    pub async fn handle_command(&self, message: &Envelope) -> ReplyOutcome {
        let reply = self.process(message).await;
        let outcome = reply.outcome.clone();

        match Envelope::encode(&self.subjects.reply, message.correlation_id, &reply) {
            Ok(envelope) => {
                let envelope = envelope.with_attempt(message.attempt);
                if let Err(e) = self.channel.publish(&self.subjects.reply, envelope).await {
                    tracing::error!(error = %e, "failed to publish reply");
                    metrics::counter!("saga_reply_publish_failures_total").increment(1);
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to encode reply"),
        }
        outcome
    }

    async fn process(&self, message: &Envelope) -> CreateAccommodationReply {
        let command: CreateAccommodationCommand = match message.decode() {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!(error = %e, "malformed command");
                return CreateAccommodationReply::failure(ErrorDescriptor::malformed(e));
            }
        };

        if let Err(e) = command.payload.validate() {
            tracing::info!(error = %e, "accommodation rejected");
            return CreateAccommodationReply::failure(ErrorDescriptor::validation(&e));
        }

        match self
            .store
            .insert_for_saga(message.correlation_id, command.payload)
            .await
        {
            Ok(InsertOutcome::Inserted(accommodation)) => {
                tracing::info!(accommodation_id = %accommodation.id, "accommodation created");
                CreateAccommodationReply::success(accommodation)
            }
            Ok(InsertOutcome::Existing(accommodation)) => {
                tracing::debug!(
                    accommodation_id = %accommodation.id,
                    "duplicate command, replying with existing record"
                );
                CreateAccommodationReply::success(accommodation)
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to persist accommodation");
                CreateAccommodationReply::failure(ErrorDescriptor::storage(e))
            }
        }
    }
}

#[async_trait]
impl MessageHandler for CreateAccommodationHandler {
    async fn handle(&self, message: Envelope) {
        self.handle_command(&message).await;
    }
}
