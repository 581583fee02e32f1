//! Message envelope carried over a channel.

use chrono::{DateTime, Utc};
use common::SagaId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An opaque payload plus the routing metadata every saga message needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique per publish. Redeliveries of the same step get a new id.
    pub message_id: Uuid,
    /// Subject the message was published on. Set by the channel on publish.
    pub subject: String,
    /// Saga this message belongs to; stable across retries of one step.
    pub correlation_id: SagaId,
    /// Delivery attempt of the step that produced this message (1-based).
    pub attempt: u32,
    /// Step-specific data.
    pub payload: serde_json::Value,
    /// When the sender built the message.
    pub published_at: DateTime<Utc>,
}

impl Envelope {
    /// Builds an envelope around an already serialized payload.
    pub fn new(
        subject: impl Into<String>,
        correlation_id: SagaId,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            subject: subject.into(),
            correlation_id,
            attempt: 1,
            payload,
            published_at: Utc::now(),
        }
    }

    /// Serializes `payload` into a new envelope.
    pub fn encode<T: Serialize>(
        subject: impl Into<String>,
        correlation_id: SagaId,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            subject,
            correlation_id,
            serde_json::to_value(payload)?,
        ))
    }

    /// Deserializes the payload into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    /// Sets the delivery attempt.
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        name: String,
    }

    #[test]
    fn encode_then_decode_returns_payload() {
        let saga_id = SagaId::new();
        let envelope = Envelope::encode(
            "test.subject",
            saga_id,
            &Ping {
                name: "Cabin".to_string(),
            },
        )
        .unwrap();

        assert_eq!(envelope.correlation_id, saga_id);
        assert_eq!(envelope.attempt, 1);
        assert_eq!(envelope.subject, "test.subject");
        let decoded: Ping = envelope.decode().unwrap();
        assert_eq!(decoded.name, "Cabin");
    }

    #[test]
    fn decode_into_wrong_shape_fails() {
        let envelope = Envelope::new("s", SagaId::new(), serde_json::json!([1, 2, 3]));
        assert!(envelope.decode::<Ping>().is_err());
    }

    #[test]
    fn each_envelope_gets_a_fresh_message_id() {
        let saga_id = SagaId::new();
        let a = Envelope::new("s", saga_id, serde_json::Value::Null);
        let b = Envelope::new("s", saga_id, serde_json::Value::Null).with_attempt(2);
        assert_ne!(a.message_id, b.message_id);
        assert_eq!(a.correlation_id, b.correlation_id);
        assert_eq!(b.attempt, 2);
    }
}
