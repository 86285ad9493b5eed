use chrono::{DateTime, Utc};
use hearth_shared::Money;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::reservation::Reservation;
use crate::CoreError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Paid,
    Cancelled,
    Refunded,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Paid => "PAID",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Refunded => "REFUNDED",
        }
    }

    /// Cancellation and refund are driven from outside; this only guards the direction.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Paid, BookingStatus::Cancelled)
                | (BookingStatus::Paid, BookingStatus::Refunded)
                | (BookingStatus::Cancelled, BookingStatus::Refunded)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PAID" => Ok(BookingStatus::Paid),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            "REFUNDED" => Ok(BookingStatus::Refunded),
            other => Err(CoreError::UnknownStatus(other.to_string())),
        }
    }
}

/// Durable, paid record of a confirmed reservation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Booking {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub customer_id: String,
    pub provider_id: Uuid,
    pub slot_id: Uuid,
    pub status: BookingStatus,
    pub transaction_id: String,
    pub amount: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn paid(reservation: &Reservation, transaction_id: &str, amount: Money, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            reservation_id: reservation.id,
            customer_id: reservation.customer_id.clone(),
            provider_id: reservation.provider_id,
            slot_id: reservation.slot_id,
            status: BookingStatus::Paid,
            transaction_id: transaction_id.to_string(),
            amount,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition_to(&mut self, next: BookingStatus, now: DateTime<Utc>) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_status_transitions() {
        assert!(BookingStatus::Paid.can_transition_to(BookingStatus::Cancelled));
        assert!(BookingStatus::Paid.can_transition_to(BookingStatus::Refunded));
        assert!(BookingStatus::Cancelled.can_transition_to(BookingStatus::Refunded));
        assert!(!BookingStatus::Refunded.can_transition_to(BookingStatus::Paid));
        assert!(!BookingStatus::Cancelled.can_transition_to(BookingStatus::Paid));
        assert!(!BookingStatus::Paid.can_transition_to(BookingStatus::Paid));
    }

    #[test]
    fn test_invalid_transition_is_rejected() {
        let now = Utc::now();
        let mut booking = Booking {
            id: Uuid::new_v4(),
            reservation_id: Uuid::new_v4(),
            customer_id: "customer-1".to_string(),
            provider_id: Uuid::new_v4(),
            slot_id: Uuid::new_v4(),
            status: BookingStatus::Refunded,
            transaction_id: "txn_1".to_string(),
            amount: Money::new(1000, "USD"),
            created_at: now,
            updated_at: now,
        };

        let err = booking.transition_to(BookingStatus::Paid, now).unwrap_err();
        assert_eq!(
            err,
            CoreError::InvalidTransition { from: "REFUNDED".to_string(), to: "PAID".to_string() }
        );
    }
}
