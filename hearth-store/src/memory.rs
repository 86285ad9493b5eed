//! In-process stores backed by `tokio::sync::RwLock`. Every conditional update
//! runs under the write lock, which serialises the compare-and-swap per store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearth_core::{
    Booking, BookingInsert, BookingRepository, BookingStatus, Reservation, ReservationRepository,
    ReservationStatus, Slot, SlotStatus, SlotStore, StoreError, StoreResult, TimeWindow, Transition,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct MemorySlotStore {
    slots: RwLock<HashMap<Uuid, Slot>>,
}

impl MemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }
}

#[async_trait]
impl SlotStore for MemorySlotStore {
    async fn insert(&self, slot: &Slot) -> StoreResult<()> {
        let mut slots = self.slots.write().await;
        if slots.contains_key(&slot.id) {
            return Err(StoreError::Duplicate(format!("slot {}", slot.id)));
        }
        slots.insert(slot.id, slot.clone());
        Ok(())
    }

    async fn get(&self, slot_id: Uuid) -> StoreResult<Option<Slot>> {
        Ok(self.slots.read().await.get(&slot_id).cloned())
    }

    async fn try_transition(
        &self,
        slot_id: Uuid,
        expected: SlotStatus,
        next: SlotStatus,
        expected_version: i64,
    ) -> StoreResult<Transition> {
        let mut slots = self.slots.write().await;
        let Some(slot) = slots.get_mut(&slot_id) else {
            return Ok(Transition::NotFound);
        };

        if slot.status != expected || slot.version != expected_version {
            return Ok(Transition::Conflict(slot.clone()));
        }

        slot.status = next;
        slot.version += 1;
        Ok(Transition::Applied(slot.clone()))
    }

    async fn list_available(
        &self,
        provider_id: Uuid,
        service_id: Uuid,
        window: &TimeWindow,
    ) -> StoreResult<Vec<Slot>> {
        let slots = self.slots.read().await;
        let mut available: Vec<Slot> = slots
            .values()
            .filter(|s| {
                s.provider_id == provider_id
                    && s.service_id == service_id
                    && s.is_available()
                    && window.contains(s.start_time)
            })
            .cloned()
            .collect();
        available.sort_by_key(|s| (s.start_time, s.id));
        Ok(available)
    }
}

#[derive(Default)]
pub struct MemoryReservationRepository {
    reservations: RwLock<HashMap<Uuid, Reservation>>,
}

impl MemoryReservationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every reservation ever placed on `slot_id`, oldest first.
    pub async fn for_slot(&self, slot_id: Uuid) -> Vec<Reservation> {
        let mut matching: Vec<Reservation> = self
            .reservations
            .read()
            .await
            .values()
            .filter(|r| r.slot_id == slot_id)
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.created_at);
        matching
    }
}

#[async_trait]
impl ReservationRepository for MemoryReservationRepository {
    async fn insert(&self, reservation: &Reservation) -> StoreResult<()> {
        let mut reservations = self.reservations.write().await;
        if reservations.contains_key(&reservation.id) {
            return Err(StoreError::Duplicate(format!("reservation {}", reservation.id)));
        }
        reservations.insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Reservation>> {
        Ok(self.reservations.read().await.get(&id).cloned())
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: ReservationStatus,
        next: ReservationStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Reservation>> {
        let mut reservations = self.reservations.write().await;
        match reservations.get_mut(&id) {
            Some(r) if r.status == expected => {
                r.status = next;
                r.updated_at = at;
                Ok(Some(r.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn set_checkout_session(&self, id: Uuid, session_id: &str) -> StoreResult<()> {
        let mut reservations = self.reservations.write().await;
        let reservation = reservations
            .get_mut(&id)
            .ok_or_else(|| StoreError::Corrupt(format!("reservation {} vanished", id)))?;
        reservation.checkout_session_id = Some(session_id.to_string());
        Ok(())
    }

    async fn list_expired_holds(&self, now: DateTime<Utc>, limit: usize) -> StoreResult<Vec<Reservation>> {
        let reservations = self.reservations.read().await;
        let mut expired: Vec<Reservation> = reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Hold && r.hold_expires_at <= now)
            .cloned()
            .collect();
        expired.sort_by_key(|r| r.hold_expires_at);
        expired.truncate(limit);
        Ok(expired)
    }
}

#[derive(Default)]
pub struct MemoryBookingRepository {
    bookings: RwLock<HashMap<Uuid, Booking>>,
}

impl MemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.bookings.read().await.len()
    }
}

#[async_trait]
impl BookingRepository for MemoryBookingRepository {
    async fn insert_once(&self, booking: &Booking) -> StoreResult<BookingInsert> {
        let mut bookings = self.bookings.write().await;
        if let Some(existing) = bookings.values().find(|b| b.reservation_id == booking.reservation_id) {
            return Ok(BookingInsert {
                booking: existing.clone(),
                created: false,
            });
        }
        bookings.insert(booking.id, booking.clone());
        Ok(BookingInsert {
            booking: booking.clone(),
            created: true,
        })
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.bookings.read().await.get(&id).cloned())
    }

    async fn find_by_reservation(&self, reservation_id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self
            .bookings
            .read()
            .await
            .values()
            .find(|b| b.reservation_id == reservation_id)
            .cloned())
    }

    async fn list_for_customer(&self, customer_id: &str) -> StoreResult<Vec<Booking>> {
        let bookings = self.bookings.read().await;
        let mut mine: Vec<Booking> = bookings
            .values()
            .filter(|b| b.customer_id == customer_id)
            .cloned()
            .collect();
        mine.sort_by_key(|b| b.created_at);
        Ok(mine)
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: BookingStatus,
        next: BookingStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Booking>> {
        let mut bookings = self.bookings.write().await;
        match bookings.get_mut(&id) {
            Some(b) if b.status == expected => {
                b.status = next;
                b.updated_at = at;
                Ok(Some(b.clone()))
            }
            _ => Ok(None),
        }
    }
}
