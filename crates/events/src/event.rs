//! The logical occurrence that gets fanned out to webhook endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An application-level occurrence dispatched to zero or more endpoints.
///
/// Events are immutable once created and are not persisted independently
/// of the deliveries that reference them — the engine embeds a copy of
/// the `Event` in every `Delivery` it creates for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event instance.
    pub id: String,
    /// The event type string, e.g. `"user.created"`. Matched exactly,
    /// case-sensitively; only the literal `"*"` filter is a wildcard.
    pub event_type: String,
    /// Opaque structured payload. The engine never inspects this.
    pub data: Value,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Creates a new event with a fresh id and the current timestamp.
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_assigns_a_distinct_id_per_event() {
        let a = Event::new("user.created", serde_json::json!({"uid": 1}));
        let b = Event::new("user.created", serde_json::json!({"uid": 1}));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn carries_the_event_type_verbatim() {
        let e = Event::new("order.created", serde_json::json!(null));
        assert_eq!(e.event_type, "order.created");
    }
}
