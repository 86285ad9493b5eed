use async_trait::async_trait;
use hearth_core::{HoldWriter, Reservation, ReservationRepository, SlotStatus, SlotStore, StoreResult, Transition};
use std::sync::Arc;
use tracing::{error, warn};

/// Places a hold with two separate writes and undoes the slot transition when
/// the reservation insert fails. Suitable for stores that live and die with the
/// process; durable backends provide a transactional `HoldWriter`.
pub struct SequentialHoldWriter {
    slots: Arc<dyn SlotStore>,
    reservations: Arc<dyn ReservationRepository>,
}

impl SequentialHoldWriter {
    pub fn new(slots: Arc<dyn SlotStore>, reservations: Arc<dyn ReservationRepository>) -> Self {
        Self { slots, reservations }
    }
}

#[async_trait]
impl HoldWriter for SequentialHoldWriter {
    async fn place_hold(&self, expected_version: i64, reservation: &Reservation) -> StoreResult<Transition> {
        let transition = self
            .slots
            .try_transition(reservation.slot_id, SlotStatus::Available, SlotStatus::Held, expected_version)
            .await?;
        let Transition::Applied(held) = &transition else {
            return Ok(transition);
        };

        if let Err(e) = self.reservations.insert(reservation).await {
            error!("Failed to record hold on slot {}: {}", held.id, e);
            match self
                .slots
                .try_transition(held.id, SlotStatus::Held, SlotStatus::Available, held.version)
                .await
            {
                Ok(Transition::Applied(_)) => {}
                Ok(other) => warn!("Could not return slot {} after failed hold: {:?}", held.id, other),
                Err(undo) => error!("Could not return slot {} after failed hold: {}", held.id, undo),
            }
            return Err(e);
        }

        Ok(transition)
    }
}
