use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

// ============================================================================
// Event Envelope - Outbox Metadata
// ============================================================================
//
// Wraps a domain event with the metadata written to the outbox table in the
// same transaction as the aggregate change.
//
// ============================================================================

/// Generic Event Envelope - wraps any domain event with metadata
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EventEnvelope<E> {
    // Event Identity
    pub event_id: Uuid,
    pub aggregate_id: Uuid,
    pub sequence_number: i64,

    // Event Type Information
    pub event_type: String,
    pub event_version: i32,

    // Event Payload
    pub event_data: E,

    // Causation & Correlation
    pub causation_id: Option<Uuid>,
    pub correlation_id: Uuid,

    // Who triggered this event
    pub user_id: Option<i64>,

    pub timestamp: DateTime<Utc>,

    pub metadata: HashMap<String, String>,
}

impl<E: DomainEvent> EventEnvelope<E> {
    pub fn new(
        aggregate_id: Uuid,
        sequence_number: i64,
        event_data: E,
        correlation_id: Uuid,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            aggregate_id,
            sequence_number,
            event_type: event_data.event_type().to_string(),
            event_version: E::event_version(),
            event_data,
            causation_id: None,
            correlation_id,
            user_id: None,
            timestamp,
            metadata: HashMap::new(),
        }
    }

    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_causation(mut self, causation_id: Uuid) -> Self {
        self.causation_id = Some(causation_id);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Wrap a batch of freshly applied events.
///
/// `version_after` is the aggregate version once every event has been applied,
/// so the first event gets `version_after - events.len() + 1`.
pub fn envelopes_for<E: DomainEvent>(
    aggregate_id: Uuid,
    version_after: i64,
    events: Vec<E>,
    correlation_id: Uuid,
    timestamp: DateTime<Utc>,
) -> Vec<EventEnvelope<E>> {
    let first = version_after - events.len() as i64 + 1;
    events
        .into_iter()
        .enumerate()
        .map(|(offset, event)| {
            EventEnvelope::new(aggregate_id, first + offset as i64, event, correlation_id, timestamp)
        })
        .collect()
}

// ============================================================================
// Domain Event Trait
// ============================================================================

/// All events written to the outbox implement this trait.
pub trait DomainEvent: Serialize + for<'de> Deserialize<'de> + Clone + Send + Sync {
    fn event_type(&self) -> &'static str;
    fn event_version() -> i32 where Self: Sized { 1 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize, Clone, Debug)]
    enum TestEvent {
        Opened { note: String },
        Closed,
    }

    impl DomainEvent for TestEvent {
        fn event_type(&self) -> &'static str {
            match self {
                TestEvent::Opened { .. } => "TestOpened",
                TestEvent::Closed => "TestClosed",
            }
        }
    }

    #[test]
    fn test_event_envelope_creation() {
        let aggregate_id = Uuid::new_v4();
        let correlation_id = Uuid::new_v4();
        let now = Utc::now();

        let envelope = EventEnvelope::new(
            aggregate_id,
            1,
            TestEvent::Opened { note: "first".to_string() },
            correlation_id,
            now,
        )
        .with_user(42)
        .with_metadata("order_number", "ORD-20260314-AAAAAAAA");

        assert_eq!(envelope.aggregate_id, aggregate_id);
        assert_eq!(envelope.sequence_number, 1);
        assert_eq!(envelope.event_type, "TestOpened");
        assert_eq!(envelope.correlation_id, correlation_id);
        assert_eq!(envelope.user_id, Some(42));
        assert_eq!(envelope.timestamp, now);
        assert_eq!(envelope.metadata["order_number"], "ORD-20260314-AAAAAAAA");
        assert!(envelope.causation_id.is_none());
    }

    #[test]
    fn test_envelopes_for_numbers_events_up_to_version() {
        let envelopes = envelopes_for(
            Uuid::new_v4(),
            5,
            vec![TestEvent::Opened { note: "a".to_string() }, TestEvent::Closed],
            Uuid::new_v4(),
            Utc::now(),
        );

        let sequence: Vec<i64> = envelopes.iter().map(|e| e.sequence_number).collect();
        assert_eq!(sequence, vec![4, 5]);
        assert_eq!(envelopes[1].event_type, "TestClosed");
    }
}
