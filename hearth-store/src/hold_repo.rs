use async_trait::async_trait;
use hearth_core::{HoldWriter, Reservation, Slot, SlotStatus, StoreResult, Transition};
use sqlx::PgPool;
use tracing::debug;

use crate::database::store_err;
use crate::reservation_repo::insert_reservation;
use crate::slot_repo::{SlotRow, SLOT_COLUMNS};

/// Commits the `AVAILABLE -> HELD` update and the reservation row in one
/// transaction, so a crash between the two writes cannot strand a slot.
pub struct PgHoldWriter {
    pool: PgPool,
}

impl PgHoldWriter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HoldWriter for PgHoldWriter {
    async fn place_hold(&self, expected_version: i64, reservation: &Reservation) -> StoreResult<Transition> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let updated = sqlx::query_as::<_, SlotRow>(&format!(
            r#"
            UPDATE slots
            SET status = $3, version = version + 1, updated_at = NOW()
            WHERE id = $1 AND status = $2 AND version = $4
            RETURNING {}
            "#,
            SLOT_COLUMNS
        ))
        .bind(reservation.slot_id)
        .bind(SlotStatus::Available.as_str())
        .bind(SlotStatus::Held.as_str())
        .bind(expected_version)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_err)?;

        let Some(row) = updated else {
            tx.rollback().await.map_err(store_err)?;
            let observed = sqlx::query_as::<_, SlotRow>(&format!("SELECT {} FROM slots WHERE id = $1", SLOT_COLUMNS))
                .bind(reservation.slot_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_err)?;
            return match observed {
                Some(row) => Ok(Transition::Conflict(Slot::try_from(row)?)),
                None => Ok(Transition::NotFound),
            };
        };

        insert_reservation(&mut *tx, reservation).await?;
        tx.commit().await.map_err(store_err)?;

        debug!("Hold {} committed on slot {}", reservation.id, reservation.slot_id);
        Ok(Transition::Applied(Slot::try_from(row)?))
    }
}
