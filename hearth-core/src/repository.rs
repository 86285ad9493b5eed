use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::booking::{Booking, BookingStatus};
use crate::reservation::{Reservation, ReservationStatus};
use crate::slot::{Slot, SlotStatus, TimeWindow};

/// Infrastructure failures. Contention is never reported through this type.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Duplicate record: {0}")]
    Duplicate(String),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of a compare-and-swap on a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Status and version matched; carries the slot after the update.
    Applied(Slot),
    /// Status or version did not match; carries the slot as observed.
    Conflict(Slot),
    NotFound,
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }
}

/// Single source of truth for slot status.
#[async_trait]
pub trait SlotStore: Send + Sync {
    /// Publish a new slot. Fails with `Duplicate` if the id already exists.
    async fn insert(&self, slot: &Slot) -> StoreResult<()>;

    async fn get(&self, slot_id: Uuid) -> StoreResult<Option<Slot>>;

    /// Move `slot_id` from `expected` to `next` only if its version equals
    /// `expected_version`. On success the version is incremented.
    async fn try_transition(
        &self,
        slot_id: Uuid,
        expected: SlotStatus,
        next: SlotStatus,
        expected_version: i64,
    ) -> StoreResult<Transition>;

    /// `AVAILABLE` slots starting inside `window`, ordered by start time.
    async fn list_available(
        &self,
        provider_id: Uuid,
        service_id: Uuid,
        window: &TimeWindow,
    ) -> StoreResult<Vec<Slot>>;
}

#[async_trait]
pub trait ReservationRepository: Send + Sync {
    async fn insert(&self, reservation: &Reservation) -> StoreResult<()>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Reservation>>;

    /// Conditional status update. Returns `None` when the reservation is missing
    /// or no longer in `expected`.
    async fn update_status(
        &self,
        id: Uuid,
        expected: ReservationStatus,
        next: ReservationStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Reservation>>;

    async fn set_checkout_session(&self, id: Uuid, session_id: &str) -> StoreResult<()>;

    /// `HOLD` reservations with `hold_expires_at <= now`, oldest first.
    async fn list_expired_holds(&self, now: DateTime<Utc>, limit: usize) -> StoreResult<Vec<Reservation>>;
}

/// Places a hold as one unit of work: the slot moves `AVAILABLE -> HELD` at
/// `expected_version` and `reservation` is recorded, or neither happens.
#[async_trait]
pub trait HoldWriter: Send + Sync {
    /// `reservation.slot_version` must be `expected_version + 1`. The reservation
    /// is written only when the transition is `Applied`.
    async fn place_hold(&self, expected_version: i64, reservation: &Reservation) -> StoreResult<Transition>;
}

/// Outcome of an insert keyed on the reservation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingInsert {
    pub booking: Booking,
    /// False when a booking for the reservation already existed and was returned instead.
    pub created: bool,
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Insert unless a booking for `booking.reservation_id` exists.
    async fn insert_once(&self, booking: &Booking) -> StoreResult<BookingInsert>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Booking>>;

    async fn find_by_reservation(&self, reservation_id: Uuid) -> StoreResult<Option<Booking>>;

    async fn list_for_customer(&self, customer_id: &str) -> StoreResult<Vec<Booking>>;

    /// Conditional status update, `None` when missing or not in `expected`.
    async fn update_status(
        &self,
        id: Uuid,
        expected: BookingStatus,
        next: BookingStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Booking>>;
}
