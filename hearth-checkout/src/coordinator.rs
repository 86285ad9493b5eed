use chrono::{DateTime, Utc};
use hearth_core::{
    Booking, BookingInsert, BookingRepository, BookingStatus, Clock, CoreError, EventNotifier, PaymentError,
    Reservation, ReservationRepository, ReservationStatus, Slot, SlotStatus, SlotStore, StoreError, Transition,
};
use hearth_hold::{HoldError, ReleaseOutcome, ReservationManager};
use hearth_shared::EventTopic;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::orchestrator::PaymentOrchestrator;

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Hold(#[from] HoldError),
}

pub type CheckoutResult<T> = Result<T, CheckoutError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutStarted {
    pub checkout_url: String,
    pub session_id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutOutcome {
    Started(CheckoutStarted),
    Expired,
    NotFound,
    Forbidden,
    NotHeld(ReservationStatus),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmOutcome {
    Confirmed(Booking),
    /// The slot is no longer ours to book, or a different payment already won.
    Conflict,
    Expired,
    NotFound,
}

impl ConfirmOutcome {
    /// Money was taken but no booking exists for it.
    pub fn requires_refund(&self) -> bool {
        matches!(self, ConfirmOutcome::Conflict | ConfirmOutcome::Expired)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BookingChange {
    Updated(Booking),
    NotFound,
    Rejected(CoreError),
}

/// Bridges holds to payments: opens checkout sessions and turns payment
/// callbacks into bookings.
pub struct CheckoutCoordinator {
    holds: Arc<ReservationManager>,
    slots: Arc<dyn SlotStore>,
    reservations: Arc<dyn ReservationRepository>,
    bookings: Arc<dyn BookingRepository>,
    payments: PaymentOrchestrator,
    notifier: EventNotifier,
    clock: Arc<dyn Clock>,
}

impl CheckoutCoordinator {
    pub fn new(
        holds: Arc<ReservationManager>,
        slots: Arc<dyn SlotStore>,
        reservations: Arc<dyn ReservationRepository>,
        bookings: Arc<dyn BookingRepository>,
        payments: PaymentOrchestrator,
        notifier: EventNotifier,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            holds,
            slots,
            reservations,
            bookings,
            payments,
            notifier,
            clock,
        }
    }

    pub async fn initiate_checkout(&self, reservation_id: Uuid, customer_id: &str) -> CheckoutResult<CheckoutOutcome> {
        let Some(reservation) = self.reservations.get(reservation_id).await? else {
            return Ok(CheckoutOutcome::NotFound);
        };
        if !reservation.is_owned_by(customer_id) {
            return Ok(CheckoutOutcome::Forbidden);
        }
        if reservation.status != ReservationStatus::Hold {
            return Ok(CheckoutOutcome::NotHeld(reservation.status));
        }
        if reservation.is_expired_at(self.clock.now()) {
            debug!("Checkout refused for lapsed hold {}", reservation_id);
            return Ok(CheckoutOutcome::Expired);
        }

        if let Some(session_id) = reservation.checkout_session_id.as_deref() {
            if let Some(session) = self.payments.existing_session(session_id).await? {
                return Ok(CheckoutOutcome::Started(CheckoutStarted {
                    checkout_url: session.url,
                    session_id: session.id,
                    expires_at: reservation.hold_expires_at,
                }));
            }
            warn!("Stored checkout session {} is unknown to the processor, opening a new one", session_id);
        }

        let slot = self.slot_of(&reservation).await?;
        let session = self.payments.open_session(&reservation, &slot).await?;
        self.reservations.set_checkout_session(reservation.id, &session.id).await?;

        info!(
            "Checkout session {} opened for reservation {} ({})",
            session.id, reservation.id, session.amount
        );

        Ok(CheckoutOutcome::Started(CheckoutStarted {
            checkout_url: session.url,
            session_id: session.id,
            expires_at: reservation.hold_expires_at,
        }))
    }

    /// Turn a successful payment into a booking.
    ///
    /// Replays with the same transaction id return the existing booking. A slot
    /// already `BOOKED` from this reservation's hold means an earlier attempt won
    /// the slot but may not have written the booking yet, so this call finishes it.
    pub async fn confirm_payment(&self, reservation_id: Uuid, transaction_id: &str) -> CheckoutResult<ConfirmOutcome> {
        let Some(reservation) = self.reservations.get(reservation_id).await? else {
            return Ok(ConfirmOutcome::NotFound);
        };
        let now = self.clock.now();

        match reservation.status {
            ReservationStatus::Hold => {}
            ReservationStatus::Confirmed => {
                if let Some(existing) = self.bookings.find_by_reservation(reservation.id).await? {
                    if existing.transaction_id == transaction_id {
                        debug!("Replayed confirmation {} for reservation {}", transaction_id, reservation.id);
                        return Ok(ConfirmOutcome::Confirmed(existing));
                    }
                    warn!(
                        "Reservation {} already paid by {}, rejecting {}",
                        reservation.id, existing.transaction_id, transaction_id
                    );
                    return Ok(ConfirmOutcome::Conflict);
                }
                let slot = self.slot_of(&reservation).await?;
                return self.finalize(reservation, &slot, transaction_id, now).await;
            }
            ReservationStatus::Expired => return Ok(ConfirmOutcome::Expired),
            ReservationStatus::Released => return Ok(ConfirmOutcome::Conflict),
        }

        if reservation.is_expired_at(now) {
            let slot = self.slot_of(&reservation).await?;
            if slot.booked_from(reservation.slot_version) {
                return self.finalize(reservation, &slot, transaction_id, now).await;
            }
            info!(
                "Payment {} for reservation {} arrived after its hold lapsed",
                transaction_id, reservation.id
            );
            return Ok(ConfirmOutcome::Expired);
        }

        match self
            .slots
            .try_transition(
                reservation.slot_id,
                SlotStatus::Held,
                SlotStatus::Booked,
                reservation.slot_version,
            )
            .await?
        {
            Transition::Applied(slot) => self.finalize(reservation, &slot, transaction_id, now).await,
            Transition::Conflict(observed) if observed.booked_from(reservation.slot_version) => {
                self.finalize(reservation, &observed, transaction_id, now).await
            }
            Transition::Conflict(observed) => {
                debug!(
                    "Reservation {} lost slot {} ({} v{}) before payment {}",
                    reservation.id, observed.id, observed.status, observed.version, transaction_id
                );
                Ok(ConfirmOutcome::Conflict)
            }
            Transition::NotFound => {
                warn!("Slot {} of reservation {} is gone", reservation.slot_id, reservation.id);
                Ok(ConfirmOutcome::Conflict)
            }
        }
    }

    /// Confirm and refund the payment when it cannot become a booking.
    pub async fn settle_payment(&self, reservation_id: Uuid, transaction_id: &str) -> CheckoutResult<ConfirmOutcome> {
        let outcome = self.confirm_payment(reservation_id, transaction_id).await?;
        if outcome.requires_refund() {
            warn!(
                "Payment {} for reservation {} cannot be honoured ({:?})",
                transaction_id, reservation_id, outcome
            );
            self.payments.refund(transaction_id).await?;
        }
        Ok(outcome)
    }

    pub async fn cancel_checkout(&self, reservation_id: Uuid, customer_id: &str) -> CheckoutResult<ReleaseOutcome> {
        Ok(self.holds.release(reservation_id, customer_id).await?)
    }

    /// Processor reported the payment failed or was abandoned.
    pub async fn payment_failed(&self, reservation_id: Uuid) -> CheckoutResult<ReleaseOutcome> {
        info!("Payment failed for reservation {}, releasing hold", reservation_id);
        Ok(self.holds.release_unchecked(reservation_id).await?)
    }

    pub async fn bookings_for(&self, customer_id: &str) -> CheckoutResult<Vec<Booking>> {
        Ok(self.bookings.list_for_customer(customer_id).await?)
    }

    /// Move a booking to `Cancelled` or `Refunded`. Refunds go back through the processor.
    pub async fn transition_booking(&self, booking_id: Uuid, next: BookingStatus) -> CheckoutResult<BookingChange> {
        let Some(mut booking) = self.bookings.get(booking_id).await? else {
            return Ok(BookingChange::NotFound);
        };
        let current = booking.status;
        let now = self.clock.now();
        if let Err(e) = booking.transition_to(next, now) {
            return Ok(BookingChange::Rejected(e));
        }

        let Some(updated) = self.bookings.update_status(booking_id, current, next, now).await? else {
            return Ok(BookingChange::Rejected(CoreError::InvalidTransition {
                from: current.to_string(),
                to: next.to_string(),
            }));
        };

        if next == BookingStatus::Refunded {
            if let Err(e) = self.payments.refund(&updated.transaction_id).await {
                warn!("Refund for booking {} failed, restoring {}: {}", booking_id, current, e);
                self.bookings.update_status(booking_id, next, current, now).await?;
                return Err(e.into());
            }
        }
        info!("Booking {} moved {} -> {}", booking_id, current, next);
        Ok(BookingChange::Updated(updated))
    }

    async fn finalize(
        &self,
        reservation: Reservation,
        slot: &Slot,
        transaction_id: &str,
        now: DateTime<Utc>,
    ) -> CheckoutResult<ConfirmOutcome> {
        let confirmed = match self
            .reservations
            .update_status(reservation.id, ReservationStatus::Hold, ReservationStatus::Confirmed, now)
            .await?
        {
            Some(confirmed) => confirmed,
            None => Reservation {
                status: ReservationStatus::Confirmed,
                updated_at: now,
                ..reservation
            },
        };

        let BookingInsert { booking, created } = self
            .bookings
            .insert_once(&Booking::paid(&confirmed, transaction_id, slot.price.clone(), now))
            .await?;

        if booking.transaction_id != transaction_id {
            warn!(
                "Reservation {} already booked by payment {}, rejecting {}",
                confirmed.id, booking.transaction_id, transaction_id
            );
            return Ok(ConfirmOutcome::Conflict);
        }

        if created {
            info!(
                "Booking {} confirmed for reservation {} with payment {}",
                booking.id, confirmed.id, transaction_id
            );
            let mut event = confirmed.event(EventTopic::BookingConfirmed, now);
            event.payload.booking_id = Some(booking.id);
            self.notifier.publish(event);
        }

        Ok(ConfirmOutcome::Confirmed(booking))
    }

    async fn slot_of(&self, reservation: &Reservation) -> CheckoutResult<Slot> {
        self.slots.get(reservation.slot_id).await?.ok_or_else(|| {
            CheckoutError::Store(StoreError::Corrupt(format!(
                "slot {} of reservation {} is missing",
                reservation.slot_id, reservation.id
            )))
        })
    }
}
