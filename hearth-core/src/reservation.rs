use chrono::{DateTime, Duration, Utc};
use hearth_shared::{EventPayload, EventTopic, LifecycleEvent};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::slot::Slot;
use crate::CoreError;

/// Reservation lifecycle. `Hold` is the only non-terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Hold,
    Confirmed,
    Expired,
    Released,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Hold => "HOLD",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Expired => "EXPIRED",
            ReservationStatus::Released => "RELEASED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Hold)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HOLD" => Ok(ReservationStatus::Hold),
            "CONFIRMED" => Ok(ReservationStatus::Confirmed),
            "EXPIRED" => Ok(ReservationStatus::Expired),
            "RELEASED" => Ok(ReservationStatus::Released),
            other => Err(CoreError::UnknownStatus(other.to_string())),
        }
    }
}

/// A customer's time-bounded claim on a slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reservation {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub provider_id: Uuid,
    pub customer_id: String,
    pub status: ReservationStatus,
    pub hold_expires_at: DateTime<Utc>,
    /// Slot version produced by the `AVAILABLE -> HELD` transition. Every later
    /// transition on behalf of this reservation must present it.
    pub slot_version: i64,
    pub checkout_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Build the `HOLD` row for a slot that has just been moved to `HELD`.
    pub fn hold(held_slot: &Slot, customer_id: &str, now: DateTime<Utc>, hold: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            slot_id: held_slot.id,
            provider_id: held_slot.provider_id,
            customer_id: customer_id.to_string(),
            status: ReservationStatus::Hold,
            hold_expires_at: now + hold,
            slot_version: held_slot.version,
            checkout_session_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, customer_id: &str) -> bool {
        self.customer_id == customer_id
    }

    /// A hold stays valid strictly before `hold_expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.hold_expires_at
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Hold && !self.is_expired_at(now)
    }

    /// Lifecycle event describing this reservation as it is now.
    pub fn event(&self, topic: EventTopic, at: DateTime<Utc>) -> LifecycleEvent {
        LifecycleEvent::new(
            topic,
            EventPayload {
                reservation_id: self.id,
                slot_id: self.slot_id,
                provider_id: self.provider_id,
                customer_id: self.customer_id.clone(),
                booking_id: None,
                expires_at: (self.status == ReservationStatus::Hold).then_some(self.hold_expires_at),
            },
            at,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::SlotStatus;
    use hearth_shared::Money;

    fn held_slot() -> Slot {
        let start = Utc::now() + Duration::days(1);
        let mut slot = Slot::new(Uuid::new_v4(), Uuid::new_v4(), start, start + Duration::hours(1), Money::new(9000, "USD")).unwrap();
        slot.status = SlotStatus::Held;
        slot.version = 1;
        slot
    }

    #[test]
    fn test_hold_captures_slot_version() {
        let slot = held_slot();
        let now = Utc::now();
        let reservation = Reservation::hold(&slot, "customer-1", now, Duration::minutes(15));

        assert_eq!(reservation.status, ReservationStatus::Hold);
        assert_eq!(reservation.slot_version, 1);
        assert_eq!(reservation.provider_id, slot.provider_id);
        assert_eq!(reservation.hold_expires_at, now + Duration::minutes(15));
        assert!(reservation.is_owned_by("customer-1"));
        assert!(!reservation.is_owned_by("customer-2"));
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let reservation = Reservation::hold(&held_slot(), "customer-1", now, Duration::minutes(15));
        let deadline = reservation.hold_expires_at;

        assert!(reservation.is_active_at(deadline - Duration::milliseconds(1)));
        assert!(reservation.is_expired_at(deadline));
        assert!(!reservation.is_active_at(deadline));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!ReservationStatus::Hold.is_terminal());
        assert!(ReservationStatus::Confirmed.is_terminal());
        assert!(ReservationStatus::Expired.is_terminal());
        assert!(ReservationStatus::Released.is_terminal());
        assert_eq!("RELEASED".parse::<ReservationStatus>().unwrap(), ReservationStatus::Released);
    }

    #[test]
    fn test_event_carries_expiry_only_while_held() {
        let now = Utc::now();
        let mut reservation = Reservation::hold(&held_slot(), "customer-1", now, Duration::minutes(15));

        let reserved = reservation.event(EventTopic::SlotReserved, now);
        assert_eq!(reserved.payload.expires_at, Some(reservation.hold_expires_at));
        assert_eq!(reserved.payload.customer_id, "customer-1");

        reservation.status = ReservationStatus::Expired;
        let expired = reservation.event(EventTopic::HoldExpired, now);
        assert!(expired.payload.expires_at.is_none());
        assert_eq!(expired.payload.slot_id, reservation.slot_id);
    }
}
