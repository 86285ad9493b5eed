use chrono::Duration;
use hearth_core::{
    Clock, EventNotifier, HoldWriter, Reservation, ReservationRepository, ReservationStatus, Slot, SlotStatus,
    SlotStore, StoreError, Transition,
};
use hearth_shared::EventTopic;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::writer::SequentialHoldWriter;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum HoldError {
    #[error("Invalid hold duration: {0}")]
    InvalidHoldDuration(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

pub type HoldResult<T> = Result<T, HoldError>;

/// Bounds applied to customer-requested hold lengths.
#[derive(Debug, Clone, Copy)]
pub struct HoldPolicy {
    pub default_minutes: u32,
    pub max_minutes: u32,
}

impl Default for HoldPolicy {
    fn default() -> Self {
        Self {
            default_minutes: 15,
            max_minutes: 30,
        }
    }
}

impl HoldPolicy {
    /// `None` falls back to the default, zero is rejected and anything over the
    /// maximum is capped. The cap applies to the default too.
    pub fn resolve(&self, requested: Option<u32>) -> HoldResult<Duration> {
        let minutes = match requested {
            None => self.default_minutes.min(self.max_minutes),
            Some(0) => {
                return Err(HoldError::InvalidHoldDuration(
                    "hold_minutes must be at least 1".to_string(),
                ))
            }
            Some(m) => m.min(self.max_minutes),
        };
        Ok(Duration::minutes(i64::from(minutes.max(1))))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReserveOutcome {
    Reserved(Reservation),
    /// The slot is held or booked by someone else, or a concurrent reserve won.
    AlreadyHeld,
    NotFound,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReleaseOutcome {
    Released(Reservation),
    NotFound,
    Forbidden,
    /// The reservation already left `HOLD` some other way.
    NotHeld(ReservationStatus),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReservationLookup {
    Found(Reservation),
    NotFound,
    Forbidden,
}

/// Places and releases time-bounded holds on slots.
pub struct ReservationManager {
    slots: Arc<dyn SlotStore>,
    reservations: Arc<dyn ReservationRepository>,
    writer: Arc<dyn HoldWriter>,
    notifier: EventNotifier,
    clock: Arc<dyn Clock>,
    policy: HoldPolicy,
}

impl ReservationManager {
    pub fn new(
        slots: Arc<dyn SlotStore>,
        reservations: Arc<dyn ReservationRepository>,
        notifier: EventNotifier,
        clock: Arc<dyn Clock>,
        policy: HoldPolicy,
    ) -> Self {
        let writer = Arc::new(SequentialHoldWriter::new(slots.clone(), reservations.clone()));
        Self {
            slots,
            reservations,
            writer,
            notifier,
            clock,
            policy,
        }
    }

    /// Place holds through `writer`, typically one that commits the slot
    /// transition and the reservation row in a single transaction.
    pub fn with_hold_writer(mut self, writer: Arc<dyn HoldWriter>) -> Self {
        self.writer = writer;
        self
    }

    pub fn policy(&self) -> HoldPolicy {
        self.policy
    }

    /// Place a hold on an available slot.
    ///
    /// A lost race on the slot version is reported as `AlreadyHeld`; callers
    /// are not retried automatically.
    pub async fn reserve(
        &self,
        customer_id: &str,
        slot_id: Uuid,
        hold_minutes: Option<u32>,
    ) -> HoldResult<ReserveOutcome> {
        let hold = self.policy.resolve(hold_minutes)?;

        let Some(slot) = self.slots.get(slot_id).await? else {
            return Ok(ReserveOutcome::NotFound);
        };
        if !slot.is_available() {
            debug!("Slot {} is {}, refusing hold for {}", slot_id, slot.status, customer_id);
            return Ok(ReserveOutcome::AlreadyHeld);
        }

        let now = self.clock.now();
        let expected_version = slot.version;
        let held = Slot {
            status: SlotStatus::Held,
            version: expected_version + 1,
            ..slot
        };
        let reservation = Reservation::hold(&held, customer_id, now, hold);

        match self.writer.place_hold(expected_version, &reservation).await? {
            Transition::Applied(_) => {}
            Transition::Conflict(observed) => {
                debug!(
                    "Lost hold race on slot {} (now {} v{})",
                    slot_id, observed.status, observed.version
                );
                return Ok(ReserveOutcome::AlreadyHeld);
            }
            Transition::NotFound => return Ok(ReserveOutcome::NotFound),
        }

        info!(
            "Reservation {} holds slot {} for {} until {}",
            reservation.id, slot_id, customer_id, reservation.hold_expires_at
        );
        self.notifier.publish(reservation.event(EventTopic::SlotReserved, now));

        Ok(ReserveOutcome::Reserved(reservation))
    }

    /// Customer-initiated release. Releasing twice reports `Released` both times.
    pub async fn release(&self, reservation_id: Uuid, customer_id: &str) -> HoldResult<ReleaseOutcome> {
        let Some(reservation) = self.reservations.get(reservation_id).await? else {
            return Ok(ReleaseOutcome::NotFound);
        };
        if !reservation.is_owned_by(customer_id) {
            warn!("Customer {} tried to release reservation {}", customer_id, reservation_id);
            return Ok(ReleaseOutcome::Forbidden);
        }
        self.release_hold(reservation).await
    }

    /// Release on behalf of the system, for example after a failed payment.
    pub async fn release_unchecked(&self, reservation_id: Uuid) -> HoldResult<ReleaseOutcome> {
        match self.reservations.get(reservation_id).await? {
            Some(reservation) => self.release_hold(reservation).await,
            None => Ok(ReleaseOutcome::NotFound),
        }
    }

    pub async fn get(&self, reservation_id: Uuid, customer_id: &str) -> HoldResult<ReservationLookup> {
        Ok(match self.reservations.get(reservation_id).await? {
            Some(r) if r.is_owned_by(customer_id) => ReservationLookup::Found(r),
            Some(_) => ReservationLookup::Forbidden,
            None => ReservationLookup::NotFound,
        })
    }

    async fn release_hold(&self, reservation: Reservation) -> HoldResult<ReleaseOutcome> {
        match reservation.status {
            ReservationStatus::Hold => {}
            ReservationStatus::Released => return Ok(ReleaseOutcome::Released(reservation)),
            other => return Ok(ReleaseOutcome::NotHeld(other)),
        }

        match self
            .slots
            .try_transition(
                reservation.slot_id,
                SlotStatus::Held,
                SlotStatus::Available,
                reservation.slot_version,
            )
            .await?
        {
            Transition::Applied(_) => {}
            Transition::Conflict(observed) => {
                // Slot already left this hold; report what the reservation became.
                let current = self.reservations.get(reservation.id).await?.unwrap_or(reservation.clone());
                debug!(
                    "Release of {} lost to slot {} at {} v{}",
                    reservation.id, observed.id, observed.status, observed.version
                );
                return Ok(match current.status {
                    ReservationStatus::Released => ReleaseOutcome::Released(current),
                    ReservationStatus::Hold if observed.booked_from(reservation.slot_version) => {
                        ReleaseOutcome::NotHeld(ReservationStatus::Confirmed)
                    }
                    ReservationStatus::Hold => ReleaseOutcome::NotHeld(ReservationStatus::Expired),
                    other => ReleaseOutcome::NotHeld(other),
                });
            }
            Transition::NotFound => {
                return Err(HoldError::Store(StoreError::Corrupt(format!(
                    "slot {} of reservation {} is missing",
                    reservation.slot_id, reservation.id
                ))))
            }
        }

        let now = self.clock.now();
        let Some(released) = self
            .reservations
            .update_status(reservation.id, ReservationStatus::Hold, ReservationStatus::Released, now)
            .await?
        else {
            let current = self.reservations.get(reservation.id).await?.unwrap_or(reservation);
            warn!(
                "Reservation {} became {} while its slot was being released",
                current.id, current.status
            );
            return Ok(match current.status {
                ReservationStatus::Released => ReleaseOutcome::Released(current),
                other => ReleaseOutcome::NotHeld(other),
            });
        };

        info!("Reservation {} released slot {}", released.id, released.slot_id);
        self.notifier.publish(released.event(EventTopic::HoldReleased, now));

        Ok(ReleaseOutcome::Released(released))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use hearth_core::{EventFilter, ManualClock};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use hearth_shared::Money;
    use hearth_store::{MemoryReservationRepository, MemorySlotStore};

    struct Harness {
        manager: Arc<ReservationManager>,
        slots: Arc<MemorySlotStore>,
        reservations: Arc<MemoryReservationRepository>,
        notifier: EventNotifier,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let slots = Arc::new(MemorySlotStore::new());
        let reservations = Arc::new(MemoryReservationRepository::new());
        let notifier = EventNotifier::new(64);
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let manager = Arc::new(ReservationManager::new(
            slots.clone(),
            reservations.clone(),
            notifier.clone(),
            clock.clone(),
            HoldPolicy::default(),
        ));
        Harness {
            manager,
            slots,
            reservations,
            notifier,
            clock,
        }
    }

    async fn seed_slot(slots: &MemorySlotStore) -> Slot {
        let start = Utc::now() + Duration::days(2);
        let slot = Slot::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            start,
            start + Duration::minutes(45),
            Money::new(9000, "USD"),
        )
        .unwrap();
        slots.insert(&slot).await.unwrap();
        slot
    }

    fn reserved(outcome: ReserveOutcome) -> Reservation {
        match outcome {
            ReserveOutcome::Reserved(r) => r,
            other => panic!("expected a reservation, got {:?}", other),
        }
    }

    #[test]
    fn test_policy_defaults_and_caps() {
        let policy = HoldPolicy::default();
        assert_eq!(policy.resolve(None).unwrap(), Duration::minutes(15));
        assert_eq!(policy.resolve(Some(5)).unwrap(), Duration::minutes(5));
        assert_eq!(policy.resolve(Some(120)).unwrap(), Duration::minutes(30));
        assert!(matches!(policy.resolve(Some(0)), Err(HoldError::InvalidHoldDuration(_))));
    }

    #[test]
    fn test_default_longer_than_max_is_capped() {
        let policy = HoldPolicy {
            default_minutes: 60,
            max_minutes: 30,
        };
        assert_eq!(policy.resolve(None).unwrap(), Duration::minutes(30));
        assert_eq!(policy.resolve(Some(45)).unwrap(), Duration::minutes(30));
    }

    #[tokio::test]
    async fn test_reserve_holds_slot_and_publishes() {
        let h = harness();
        let slot = seed_slot(&h.slots).await;
        let mut events = h.notifier.subscribe(EventFilter::Customer("alice".to_string()));

        let reservation = reserved(h.manager.reserve("alice", slot.id, None).await.unwrap());

        assert_eq!(reservation.status, ReservationStatus::Hold);
        assert_eq!(reservation.hold_expires_at, h.clock.now() + Duration::minutes(15));
        let stored = h.slots.get(slot.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SlotStatus::Held);
        assert_eq!(stored.version, reservation.slot_version);

        let event = events.try_recv().unwrap();
        assert_eq!(event.topic, EventTopic::SlotReserved);
        assert_eq!(event.payload.reservation_id, reservation.id);
        assert_eq!(event.payload.expires_at, Some(reservation.hold_expires_at));
    }

    #[tokio::test]
    async fn test_second_customer_sees_already_held() {
        let h = harness();
        let slot = seed_slot(&h.slots).await;

        reserved(h.manager.reserve("alice", slot.id, Some(10)).await.unwrap());
        let second = h.manager.reserve("bob", slot.id, None).await.unwrap();

        assert_eq!(second, ReserveOutcome::AlreadyHeld);
        assert_eq!(h.reservations.for_slot(slot.id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_reserve_unknown_slot_and_invalid_duration() {
        let h = harness();
        assert_eq!(
            h.manager.reserve("alice", Uuid::new_v4(), None).await.unwrap(),
            ReserveOutcome::NotFound
        );

        let slot = seed_slot(&h.slots).await;
        let err = h.manager.reserve("alice", slot.id, Some(0)).await.unwrap_err();
        assert!(matches!(err, HoldError::InvalidHoldDuration(_)));
        assert!(h.slots.get(slot.id).await.unwrap().unwrap().is_available());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reserves_yield_one_hold() {
        let h = harness();
        let slot = seed_slot(&h.slots).await;
        let slot_id = slot.id;

        let mut handles = Vec::new();
        for i in 0..32 {
            let manager = h.manager.clone();
            handles.push(tokio::spawn(async move {
                manager.reserve(&format!("customer-{}", i), slot_id, None).await.unwrap()
            }));
        }

        let mut holds = 0;
        for handle in handles {
            match handle.await.unwrap() {
                ReserveOutcome::Reserved(_) => holds += 1,
                ReserveOutcome::AlreadyHeld => {}
                ReserveOutcome::NotFound => panic!("slot vanished"),
            }
        }

        assert_eq!(holds, 1);
        assert_eq!(h.reservations.for_slot(slot_id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_release_returns_slot_and_is_idempotent() {
        let h = harness();
        let slot = seed_slot(&h.slots).await;
        let reservation = reserved(h.manager.reserve("alice", slot.id, None).await.unwrap());
        let mut events = h.notifier.subscribe(EventFilter::Reservation(reservation.id));

        let first = h.manager.release(reservation.id, "alice").await.unwrap();
        assert!(matches!(first, ReleaseOutcome::Released(ref r) if r.status == ReservationStatus::Released));
        assert!(h.slots.get(slot.id).await.unwrap().unwrap().is_available());
        assert_eq!(events.try_recv().unwrap().topic, EventTopic::HoldReleased);

        let second = h.manager.release(reservation.id, "alice").await.unwrap();
        assert!(matches!(second, ReleaseOutcome::Released(_)));
        assert!(events.try_recv().is_none());

        // Released slots go straight back to the pool.
        reserved(h.manager.reserve("bob", slot.id, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_release_checks_ownership() {
        let h = harness();
        let slot = seed_slot(&h.slots).await;
        let reservation = reserved(h.manager.reserve("alice", slot.id, None).await.unwrap());

        assert_eq!(
            h.manager.release(reservation.id, "mallory").await.unwrap(),
            ReleaseOutcome::Forbidden
        );
        assert_eq!(
            h.manager.release(Uuid::new_v4(), "alice").await.unwrap(),
            ReleaseOutcome::NotFound
        );
        assert_eq!(h.slots.get(slot.id).await.unwrap().unwrap().status, SlotStatus::Held);
    }

    #[tokio::test]
    async fn test_release_after_booking_is_not_held() {
        let h = harness();
        let slot = seed_slot(&h.slots).await;
        let reservation = reserved(h.manager.reserve("alice", slot.id, None).await.unwrap());

        h.slots
            .try_transition(slot.id, SlotStatus::Held, SlotStatus::Booked, reservation.slot_version)
            .await
            .unwrap();

        assert_eq!(
            h.manager.release(reservation.id, "alice").await.unwrap(),
            ReleaseOutcome::NotHeld(ReservationStatus::Confirmed)
        );
        assert_eq!(h.slots.get(slot.id).await.unwrap().unwrap().status, SlotStatus::Booked);
    }

    #[tokio::test]
    async fn test_get_scopes_to_owner() {
        let h = harness();
        let slot = seed_slot(&h.slots).await;
        let reservation = reserved(h.manager.reserve("alice", slot.id, None).await.unwrap());

        assert_eq!(
            h.manager.get(reservation.id, "alice").await.unwrap(),
            ReservationLookup::Found(reservation.clone())
        );
        assert_eq!(
            h.manager.get(reservation.id, "bob").await.unwrap(),
            ReservationLookup::Forbidden
        );
    }

    /// Reservation store where the sweeper marks the row expired just before a release
    /// updates it.
    struct ExpiresDuringRelease {
        inner: MemoryReservationRepository,
    }

    #[async_trait]
    impl ReservationRepository for ExpiresDuringRelease {
        async fn insert(&self, reservation: &Reservation) -> hearth_core::StoreResult<()> {
            self.inner.insert(reservation).await
        }

        async fn get(&self, id: Uuid) -> hearth_core::StoreResult<Option<Reservation>> {
            self.inner.get(id).await
        }

        async fn update_status(
            &self,
            id: Uuid,
            expected: ReservationStatus,
            next: ReservationStatus,
            at: DateTime<Utc>,
        ) -> hearth_core::StoreResult<Option<Reservation>> {
            if next == ReservationStatus::Released {
                self.inner
                    .update_status(id, ReservationStatus::Hold, ReservationStatus::Expired, at)
                    .await?;
            }
            self.inner.update_status(id, expected, next, at).await
        }

        async fn set_checkout_session(&self, id: Uuid, session_id: &str) -> hearth_core::StoreResult<()> {
            self.inner.set_checkout_session(id, session_id).await
        }

        async fn list_expired_holds(
            &self,
            now: DateTime<Utc>,
            limit: usize,
        ) -> hearth_core::StoreResult<Vec<Reservation>> {
            self.inner.list_expired_holds(now, limit).await
        }
    }

    #[tokio::test]
    async fn test_release_losing_to_expiry_reports_stored_status() {
        let slots = Arc::new(MemorySlotStore::new());
        let reservations = Arc::new(ExpiresDuringRelease {
            inner: MemoryReservationRepository::new(),
        });
        let notifier = EventNotifier::new(16);
        let manager = ReservationManager::new(
            slots.clone(),
            reservations.clone(),
            notifier.clone(),
            Arc::new(ManualClock::new(Utc::now())),
            HoldPolicy::default(),
        );
        let slot = seed_slot(&slots).await;
        let reservation = reserved(manager.reserve("alice", slot.id, None).await.unwrap());
        let mut events = notifier.subscribe(EventFilter::Reservation(reservation.id));

        assert_eq!(
            manager.release(reservation.id, "alice").await.unwrap(),
            ReleaseOutcome::NotHeld(ReservationStatus::Expired)
        );
        assert!(events.try_recv().is_none());
        assert_eq!(
            reservations.get(reservation.id).await.unwrap().unwrap().status,
            ReservationStatus::Expired
        );
    }

    struct RecordingWriter {
        inner: SequentialHoldWriter,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl HoldWriter for RecordingWriter {
        async fn place_hold(
            &self,
            expected_version: i64,
            reservation: &Reservation,
        ) -> hearth_core::StoreResult<Transition> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.place_hold(expected_version, reservation).await
        }
    }

    #[tokio::test]
    async fn test_reserve_goes_through_configured_writer() {
        let h = harness();
        let writer = Arc::new(RecordingWriter {
            inner: SequentialHoldWriter::new(h.slots.clone(), h.reservations.clone()),
            calls: AtomicUsize::new(0),
        });
        let manager = ReservationManager::new(
            h.slots.clone(),
            h.reservations.clone(),
            h.notifier.clone(),
            h.clock.clone(),
            HoldPolicy::default(),
        )
        .with_hold_writer(writer.clone());
        let slot = seed_slot(&h.slots).await;

        let reservation = reserved(manager.reserve("alice", slot.id, None).await.unwrap());
        assert_eq!(manager.reserve("bob", slot.id, None).await.unwrap(), ReserveOutcome::AlreadyHeld);

        // The second attempt stops at the availability check before reaching the writer.
        assert_eq!(writer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(reservation.slot_version, slot.version + 1);
        assert_eq!(
            h.reservations.get(reservation.id).await.unwrap().unwrap().slot_version,
            h.slots.get(slot.id).await.unwrap().unwrap().version
        );
    }
}
