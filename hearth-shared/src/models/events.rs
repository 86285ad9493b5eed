use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventTopic {
    SlotReserved,
    HoldExpired,
    HoldReleased,
    BookingConfirmed,
}

impl EventTopic {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventTopic::SlotReserved => "slot_reserved",
            EventTopic::HoldExpired => "hold_expired",
            EventTopic::HoldReleased => "hold_released",
            EventTopic::BookingConfirmed => "booking_confirmed",
        }
    }
}

impl fmt::Display for EventTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifiers a client needs to reconcile its view after an event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventPayload {
    pub reservation_id: Uuid,
    pub slot_id: Uuid,
    pub provider_id: Uuid,
    pub customer_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub topic: EventTopic,
    pub payload: EventPayload,
    pub occurred_at: DateTime<Utc>,
}

impl LifecycleEvent {
    pub fn new(topic: EventTopic, payload: EventPayload, occurred_at: DateTime<Utc>) -> Self {
        Self {
            topic,
            payload,
            occurred_at,
        }
    }

    /// Partition key for external brokers; keeps one reservation's events in order.
    pub fn key(&self) -> String {
        self.payload.reservation_id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_wire_names() {
        let json = serde_json::to_string(&EventTopic::BookingConfirmed).unwrap();
        assert_eq!(json, "\"booking_confirmed\"");
        assert_eq!(EventTopic::HoldExpired.to_string(), "hold_expired");
    }

    #[test]
    fn test_payload_skips_empty_fields() {
        let event = LifecycleEvent::new(
            EventTopic::HoldReleased,
            EventPayload {
                reservation_id: Uuid::new_v4(),
                slot_id: Uuid::new_v4(),
                provider_id: Uuid::new_v4(),
                customer_id: "customer-1".to_string(),
                booking_id: None,
                expires_at: None,
            },
            Utc::now(),
        );

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["topic"], "hold_released");
        assert!(value["payload"].get("booking_id").is_none());
        assert_eq!(event.key(), event.payload.reservation_id.to_string());
    }
}
