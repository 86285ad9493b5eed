use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearth_core::{Booking, BookingInsert, BookingRepository, BookingStatus, StoreError, StoreResult};
use hearth_shared::Money;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::{corrupt, store_err};

const BOOKING_COLUMNS: &str =
    "id, reservation_id, customer_id, provider_id, slot_id, status, transaction_id, amount, currency, created_at, updated_at";

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    reservation_id: Uuid,
    customer_id: String,
    provider_id: Uuid,
    slot_id: Uuid,
    status: String,
    transaction_id: String,
    amount: i64,
    currency: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            reservation_id: row.reservation_id,
            customer_id: row.customer_id,
            provider_id: row.provider_id,
            slot_id: row.slot_id,
            status: row.status.parse().map_err(corrupt)?,
            transaction_id: row.transaction_id,
            amount: Money::new(row.amount, &row.currency),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn insert_once(&self, booking: &Booking) -> StoreResult<BookingInsert> {
        let inserted = sqlx::query_as::<_, BookingRow>(&format!(
            r#"
            INSERT INTO bookings (id, reservation_id, customer_id, provider_id, slot_id, status, transaction_id, amount, currency, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (reservation_id) DO NOTHING
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        ))
        .bind(booking.id)
        .bind(booking.reservation_id)
        .bind(&booking.customer_id)
        .bind(booking.provider_id)
        .bind(booking.slot_id)
        .bind(booking.status.as_str())
        .bind(&booking.transaction_id)
        .bind(booking.amount.amount)
        .bind(&booking.amount.currency)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        if let Some(row) = inserted {
            return Ok(BookingInsert {
                booking: Booking::try_from(row)?,
                created: true,
            });
        }

        let existing = self
            .find_by_reservation(booking.reservation_id)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("booking for reservation {} vanished", booking.reservation_id)))?;

        Ok(BookingInsert {
            booking: existing,
            created: false,
        })
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        row.map(Booking::try_from).transpose()
    }

    async fn find_by_reservation(&self, reservation_id: Uuid) -> StoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE reservation_id = $1",
            BOOKING_COLUMNS
        ))
        .bind(reservation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.map(Booking::try_from).transpose()
    }

    async fn list_for_customer(&self, customer_id: &str) -> StoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE customer_id = $1 ORDER BY created_at ASC",
            BOOKING_COLUMNS
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: BookingStatus,
        next: BookingStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            r#"
            UPDATE bookings
            SET status = $3, updated_at = $4
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        ))
        .bind(id)
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.map(Booking::try_from).transpose()
    }
}
