use hearth_core::{
    Clock, EventNotifier, Reservation, ReservationRepository, ReservationStatus, SlotStatus, SlotStore, StoreResult,
    Transition,
};
use hearth_shared::EventTopic;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    pub scanned: usize,
    /// Holds whose slot went back to `AVAILABLE`.
    pub expired: usize,
    /// Holds whose slot was booked first; the row is marked confirmed.
    pub skipped: usize,
    /// Holds whose slot had already moved on; only the reservation row changed.
    pub reconciled: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SweepAction {
    Expired,
    Skipped,
    Reconciled,
}

#[derive(Debug, Clone, Copy)]
pub struct SweepSchedule {
    pub interval: Duration,
    pub batch_size: usize,
    pub max_backoff: Duration,
}

impl Default for SweepSchedule {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            batch_size: 500,
            max_backoff: Duration::from_secs(300),
        }
    }
}

impl SweepSchedule {
    /// Delay before the next pass after `failures` consecutive failed passes.
    pub fn delay_after(&self, failures: u32) -> Duration {
        if failures == 0 {
            return self.interval;
        }
        let factor = 1u32 << failures.min(16);
        self.interval.saturating_mul(factor).min(self.max_backoff).max(self.interval)
    }
}

/// Background task returning lapsed holds to the pool.
pub struct ExpirySweeper {
    slots: Arc<dyn SlotStore>,
    reservations: Arc<dyn ReservationRepository>,
    notifier: EventNotifier,
    clock: Arc<dyn Clock>,
    schedule: SweepSchedule,
}

impl ExpirySweeper {
    pub fn new(
        slots: Arc<dyn SlotStore>,
        reservations: Arc<dyn ReservationRepository>,
        notifier: EventNotifier,
        clock: Arc<dyn Clock>,
        schedule: SweepSchedule,
    ) -> Self {
        Self {
            slots,
            reservations,
            notifier,
            clock,
            schedule,
        }
    }

    /// Run one pass over holds whose deadline is at or before now.
    pub async fn sweep_once(&self) -> StoreResult<SweepReport> {
        let now = self.clock.now();
        let due = self
            .reservations
            .list_expired_holds(now, self.schedule.batch_size)
            .await?;

        let mut report = SweepReport {
            scanned: due.len(),
            ..SweepReport::default()
        };

        for reservation in due {
            match self.expire(reservation, now).await? {
                SweepAction::Expired => report.expired += 1,
                SweepAction::Skipped => report.skipped += 1,
                SweepAction::Reconciled => report.reconciled += 1,
            }
        }

        Ok(report)
    }

    async fn expire(&self, reservation: Reservation, now: DateTime<Utc>) -> StoreResult<SweepAction> {
        let transition = self
            .slots
            .try_transition(
                reservation.slot_id,
                SlotStatus::Held,
                SlotStatus::Available,
                reservation.slot_version,
            )
            .await?;

        match transition {
            Transition::Applied(_) => {
                match self
                    .reservations
                    .update_status(reservation.id, ReservationStatus::Hold, ReservationStatus::Expired, now)
                    .await?
                {
                    Some(expired) => {
                        debug!("Hold {} on slot {} expired", expired.id, expired.slot_id);
                        self.notifier.publish(expired.event(EventTopic::HoldExpired, now));
                    }
                    None => warn!("Reservation {} left HOLD while its slot was being expired", reservation.id),
                }
                Ok(SweepAction::Expired)
            }
            Transition::Conflict(observed) if observed.booked_from(reservation.slot_version) => {
                // Payment won the slot; a redelivered payment writes the booking.
                if self
                    .reservations
                    .update_status(reservation.id, ReservationStatus::Hold, ReservationStatus::Confirmed, now)
                    .await?
                    .is_some()
                {
                    warn!(
                        "Slot {} was booked by reservation {} without a confirmation, marked confirmed",
                        observed.id, reservation.id
                    );
                }
                Ok(SweepAction::Skipped)
            }
            Transition::Conflict(_) | Transition::NotFound => {
                self.reservations
                    .update_status(reservation.id, ReservationStatus::Hold, ReservationStatus::Expired, now)
                    .await?;
                warn!(
                    "Reservation {} no longer owned slot {}, marked expired",
                    reservation.id, reservation.slot_id
                );
                Ok(SweepAction::Reconciled)
            }
        }
    }

    /// Sweep on the configured interval until `shutdown` flips to true or its sender drops.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Expiry sweeper started (every {:?}, batch {})",
            self.schedule.interval, self.schedule.batch_size
        );
        let mut failures: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.sweep_once().await {
                Ok(report) => {
                    failures = 0;
                    if report.scanned > 0 {
                        info!(
                            "Sweep: {} expired, {} already booked, {} reconciled",
                            report.expired, report.skipped, report.reconciled
                        );
                    }
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    error!("Sweep failed ({} in a row): {}", failures, e);
                }
            }

            let delay = self.schedule.delay_after(failures);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Expiry sweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::{HoldPolicy, ReservationManager, ReserveOutcome};
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use hearth_core::{EventFilter, ManualClock, Slot, StoreError};
    use hearth_shared::Money;
    use hearth_store::{MemoryReservationRepository, MemorySlotStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct Harness {
        manager: ReservationManager,
        sweeper: Arc<ExpirySweeper>,
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
        let manager = ReservationManager::new(
            slots.clone(),
            reservations.clone(),
            notifier.clone(),
            clock.clone(),
            HoldPolicy::default(),
        );
        let sweeper = Arc::new(ExpirySweeper::new(
            slots.clone(),
            reservations.clone(),
            notifier.clone(),
            clock.clone(),
            SweepSchedule::default(),
        ));
        Harness {
            manager,
            sweeper,
            slots,
            reservations,
            notifier,
            clock,
        }
    }

    async fn hold(h: &Harness, customer: &str, minutes: u32) -> Reservation {
        let start = Utc::now() + ChronoDuration::days(1);
        let slot = Slot::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            start,
            start + ChronoDuration::hours(1),
            Money::new(5000, "EUR"),
        )
        .unwrap();
        h.slots.insert(&slot).await.unwrap();
        match h.manager.reserve(customer, slot.id, Some(minutes)).await.unwrap() {
            ReserveOutcome::Reserved(r) => r,
            other => panic!("expected a hold, got {:?}", other),
        }
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let schedule = SweepSchedule {
            interval: Duration::from_secs(10),
            batch_size: 10,
            max_backoff: Duration::from_secs(60),
        };
        assert_eq!(schedule.delay_after(0), Duration::from_secs(10));
        assert_eq!(schedule.delay_after(1), Duration::from_secs(20));
        assert_eq!(schedule.delay_after(2), Duration::from_secs(40));
        assert_eq!(schedule.delay_after(3), Duration::from_secs(60));
        assert_eq!(schedule.delay_after(40), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_hold_lapses_and_slot_returns() {
        let h = harness();
        let reservation = hold(&h, "alice", 15).await;
        let mut events = h.notifier.subscribe(EventFilter::Reservation(reservation.id));
        // Subscribed after the hold was placed.
        assert!(events.try_recv().is_none());

        h.clock.advance(ChronoDuration::minutes(16));
        let report = h.sweeper.sweep_once().await.unwrap();

        assert_eq!(report.expired, 1);
        let slot = h.slots.get(reservation.slot_id).await.unwrap().unwrap();
        assert_eq!(slot.status, SlotStatus::Available);
        let stored = h.reservations.get(reservation.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReservationStatus::Expired);

        let event = events.try_recv().unwrap();
        assert_eq!(event.topic, EventTopic::HoldExpired);
        assert_eq!(event.payload.slot_id, reservation.slot_id);
    }

    #[tokio::test]
    async fn test_nothing_expires_before_deadline() {
        let h = harness();
        let reservation = hold(&h, "alice", 10).await;

        h.clock.set(reservation.hold_expires_at - ChronoDuration::milliseconds(1));
        assert_eq!(h.sweeper.sweep_once().await.unwrap(), SweepReport::default());
        assert_eq!(
            h.slots.get(reservation.slot_id).await.unwrap().unwrap().status,
            SlotStatus::Held
        );

        h.clock.set(reservation.hold_expires_at);
        assert_eq!(h.sweeper.sweep_once().await.unwrap().expired, 1);
    }

    #[tokio::test]
    async fn test_repeated_sweeps_are_idempotent() {
        let h = harness();
        let reservation = hold(&h, "alice", 5).await;
        h.clock.advance(ChronoDuration::minutes(5));

        assert_eq!(h.sweeper.sweep_once().await.unwrap().expired, 1);
        let version = h.slots.get(reservation.slot_id).await.unwrap().unwrap().version;

        assert_eq!(h.sweeper.sweep_once().await.unwrap(), SweepReport::default());
        assert_eq!(h.slots.get(reservation.slot_id).await.unwrap().unwrap().version, version);
    }

    #[tokio::test]
    async fn test_booked_slot_marks_hold_confirmed() {
        let h = harness();
        let reservation = hold(&h, "alice", 5).await;
        h.slots
            .try_transition(reservation.slot_id, SlotStatus::Held, SlotStatus::Booked, reservation.slot_version)
            .await
            .unwrap();
        h.clock.advance(ChronoDuration::minutes(10));

        let report = h.sweeper.sweep_once().await.unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(
            h.slots.get(reservation.slot_id).await.unwrap().unwrap().status,
            SlotStatus::Booked
        );
        assert_eq!(
            h.reservations.get(reservation.id).await.unwrap().unwrap().status,
            ReservationStatus::Confirmed
        );
        assert_eq!(h.sweeper.sweep_once().await.unwrap(), SweepReport::default());
    }

    #[tokio::test]
    async fn test_booked_hold_does_not_starve_small_batches() {
        let mut h = harness();
        h.sweeper = Arc::new(ExpirySweeper::new(
            h.slots.clone(),
            h.reservations.clone(),
            h.notifier.clone(),
            h.clock.clone(),
            SweepSchedule {
                batch_size: 1,
                ..SweepSchedule::default()
            },
        ));

        let booked = hold(&h, "alice", 5).await;
        h.slots
            .try_transition(booked.slot_id, SlotStatus::Held, SlotStatus::Booked, booked.slot_version)
            .await
            .unwrap();
        h.clock.advance(ChronoDuration::seconds(1));
        let abandoned = hold(&h, "bob", 5).await;
        h.clock.advance(ChronoDuration::minutes(30));

        let mut expired = 0;
        for _ in 0..5 {
            expired += h.sweeper.sweep_once().await.unwrap().expired;
        }

        assert_eq!(expired, 1);
        assert_eq!(
            h.slots.get(abandoned.slot_id).await.unwrap().unwrap().status,
            SlotStatus::Available
        );
        assert_eq!(
            h.reservations.get(abandoned.id).await.unwrap().unwrap().status,
            ReservationStatus::Expired
        );
        assert_eq!(
            h.reservations.get(booked.id).await.unwrap().unwrap().status,
            ReservationStatus::Confirmed
        );
    }

    #[tokio::test]
    async fn test_rebooked_slot_is_not_freed_by_stale_hold() {
        let h = harness();
        let stale = hold(&h, "alice", 5).await;

        // Slot went back to the pool and was held again by someone else.
        h.slots
            .try_transition(stale.slot_id, SlotStatus::Held, SlotStatus::Available, stale.slot_version)
            .await
            .unwrap();
        let fresh = match h.manager.reserve("bob", stale.slot_id, Some(30)).await.unwrap() {
            ReserveOutcome::Reserved(r) => r,
            other => panic!("expected a hold, got {:?}", other),
        };
        h.clock.advance(ChronoDuration::minutes(6));

        let report = h.sweeper.sweep_once().await.unwrap();

        assert_eq!(report.reconciled, 1);
        let slot = h.slots.get(stale.slot_id).await.unwrap().unwrap();
        assert_eq!(slot.status, SlotStatus::Held);
        assert_eq!(slot.version, fresh.slot_version);
        assert_eq!(
            h.reservations.get(stale.id).await.unwrap().unwrap().status,
            ReservationStatus::Expired
        );
    }

    struct UnavailableReservations {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReservationRepository for UnavailableReservations {
        async fn insert(&self, _reservation: &Reservation) -> StoreResult<()> {
            Err(StoreError::Unavailable("down".into()))
        }

        async fn get(&self, _id: Uuid) -> StoreResult<Option<Reservation>> {
            Err(StoreError::Unavailable("down".into()))
        }

        async fn update_status(
            &self,
            _id: Uuid,
            _expected: ReservationStatus,
            _next: ReservationStatus,
            _at: DateTime<Utc>,
        ) -> StoreResult<Option<Reservation>> {
            Err(StoreError::Unavailable("down".into()))
        }

        async fn set_checkout_session(&self, _id: Uuid, _session_id: &str) -> StoreResult<()> {
            Err(StoreError::Unavailable("down".into()))
        }

        async fn list_expired_holds(&self, _now: DateTime<Utc>, _limit: usize) -> StoreResult<Vec<Reservation>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_from_sweep_once() {
        let sweeper = ExpirySweeper::new(
            Arc::new(MemorySlotStore::new()),
            Arc::new(UnavailableReservations { calls: AtomicUsize::new(0) }),
            EventNotifier::new(4),
            Arc::new(ManualClock::new(Utc::now())),
            SweepSchedule::default(),
        );

        assert!(matches!(sweeper.sweep_once().await, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_backs_off_and_stops_on_shutdown() {
        let reservations = Arc::new(UnavailableReservations { calls: AtomicUsize::new(0) });
        let sweeper = Arc::new(ExpirySweeper::new(
            Arc::new(MemorySlotStore::new()),
            reservations.clone(),
            EventNotifier::new(4),
            Arc::new(ManualClock::new(Utc::now())),
            SweepSchedule {
                interval: Duration::from_secs(1),
                batch_size: 10,
                max_backoff: Duration::from_secs(4),
            },
        ));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(sweeper.run(rx));

        // Passes at t=0, 2, 6, 10: delays of 2s, 4s, then capped at 4s.
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(reservations.calls.load(Ordering::SeqCst), 4);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
