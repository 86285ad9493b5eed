use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearth_core::{Reservation, ReservationRepository, ReservationStatus, StoreError, StoreResult};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::{corrupt, store_err};

const RESERVATION_COLUMNS: &str =
    "id, slot_id, provider_id, customer_id, status, hold_expires_at, slot_version, checkout_session_id, created_at, updated_at";

pub struct PgReservationRepository {
    pool: PgPool,
}

impl PgReservationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    slot_id: Uuid,
    provider_id: Uuid,
    customer_id: String,
    status: String,
    hold_expires_at: DateTime<Utc>,
    slot_version: i64,
    checkout_session_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = StoreError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        Ok(Reservation {
            id: row.id,
            slot_id: row.slot_id,
            provider_id: row.provider_id,
            customer_id: row.customer_id,
            status: row.status.parse().map_err(corrupt)?,
            hold_expires_at: row.hold_expires_at,
            slot_version: row.slot_version,
            checkout_session_id: row.checkout_session_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Shared by the repository and the transactional hold writer.
pub(crate) async fn insert_reservation<'e, E>(executor: E, reservation: &Reservation) -> StoreResult<()>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO reservations (id, slot_id, provider_id, customer_id, status, hold_expires_at, slot_version, checkout_session_id, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(reservation.id)
    .bind(reservation.slot_id)
    .bind(reservation.provider_id)
    .bind(&reservation.customer_id)
    .bind(reservation.status.as_str())
    .bind(reservation.hold_expires_at)
    .bind(reservation.slot_version)
    .bind(reservation.checkout_session_id.as_deref())
    .bind(reservation.created_at)
    .bind(reservation.updated_at)
    .execute(executor)
    .await
    .map_err(store_err)?;

    Ok(())
}

#[async_trait]
impl ReservationRepository for PgReservationRepository {
    async fn insert(&self, reservation: &Reservation) -> StoreResult<()> {
        insert_reservation(&self.pool, reservation).await
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Reservation>> {
        let row = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {} FROM reservations WHERE id = $1",
            RESERVATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.map(Reservation::try_from).transpose()
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: ReservationStatus,
        next: ReservationStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Reservation>> {
        let row = sqlx::query_as::<_, ReservationRow>(&format!(
            r#"
            UPDATE reservations
            SET status = $3, updated_at = $4
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(id)
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.map(Reservation::try_from).transpose()
    }

    async fn set_checkout_session(&self, id: Uuid, session_id: &str) -> StoreResult<()> {
        sqlx::query("UPDATE reservations SET checkout_session_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;

        Ok(())
    }

    async fn list_expired_holds(&self, now: DateTime<Utc>, limit: usize) -> StoreResult<Vec<Reservation>> {
        let rows = sqlx::query_as::<_, ReservationRow>(&format!(
            r#"
            SELECT {}
            FROM reservations
            WHERE status = 'HOLD' AND hold_expires_at <= $1
            ORDER BY hold_expires_at ASC
            LIMIT $2
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(now)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.into_iter().map(Reservation::try_from).collect()
    }
}
