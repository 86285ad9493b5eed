use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearth_core::{Slot, SlotStatus, SlotStore, StoreError, StoreResult, TimeWindow, Transition};
use hearth_shared::Money;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::{corrupt, store_err};

pub(crate) const SLOT_COLUMNS: &str =
    "id, provider_id, service_id, start_time, end_time, status, price_amount, price_currency, version";

pub struct PgSlotStore {
    pool: PgPool,
}

impl PgSlotStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct SlotRow {
    id: Uuid,
    provider_id: Uuid,
    service_id: Uuid,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    status: String,
    price_amount: i64,
    price_currency: String,
    version: i64,
}

impl TryFrom<SlotRow> for Slot {
    type Error = StoreError;

    fn try_from(row: SlotRow) -> Result<Self, Self::Error> {
        Ok(Slot {
            id: row.id,
            provider_id: row.provider_id,
            service_id: row.service_id,
            start_time: row.start_time,
            end_time: row.end_time,
            status: row.status.parse().map_err(corrupt)?,
            price: Money::new(row.price_amount, &row.price_currency),
            version: row.version,
        })
    }
}

#[async_trait]
impl SlotStore for PgSlotStore {
    async fn insert(&self, slot: &Slot) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO slots (id, provider_id, service_id, start_time, end_time, status, price_amount, price_currency, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(slot.id)
        .bind(slot.provider_id)
        .bind(slot.service_id)
        .bind(slot.start_time)
        .bind(slot.end_time)
        .bind(slot.status.as_str())
        .bind(slot.price.amount)
        .bind(&slot.price.currency)
        .bind(slot.version)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }

    async fn get(&self, slot_id: Uuid) -> StoreResult<Option<Slot>> {
        let row = sqlx::query_as::<_, SlotRow>(&format!("SELECT {} FROM slots WHERE id = $1", SLOT_COLUMNS))
            .bind(slot_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        row.map(Slot::try_from).transpose()
    }

    async fn try_transition(
        &self,
        slot_id: Uuid,
        expected: SlotStatus,
        next: SlotStatus,
        expected_version: i64,
    ) -> StoreResult<Transition> {
        // Single conditional UPDATE: Postgres row locking makes it the CAS.
        let updated = sqlx::query_as::<_, SlotRow>(&format!(
            r#"
            UPDATE slots
            SET status = $3, version = version + 1, updated_at = NOW()
            WHERE id = $1 AND status = $2 AND version = $4
            RETURNING {}
            "#,
            SLOT_COLUMNS
        ))
        .bind(slot_id)
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        if let Some(row) = updated {
            return Ok(Transition::Applied(Slot::try_from(row)?));
        }

        match self.get(slot_id).await? {
            Some(observed) => Ok(Transition::Conflict(observed)),
            None => Ok(Transition::NotFound),
        }
    }

    async fn list_available(
        &self,
        provider_id: Uuid,
        service_id: Uuid,
        window: &TimeWindow,
    ) -> StoreResult<Vec<Slot>> {
        let rows = sqlx::query_as::<_, SlotRow>(&format!(
            r#"
            SELECT {}
            FROM slots
            WHERE provider_id = $1
              AND service_id = $2
              AND status = 'AVAILABLE'
              AND start_time >= $3
              AND start_time < $4
            ORDER BY start_time ASC, id ASC
            "#,
            SLOT_COLUMNS
        ))
        .bind(provider_id)
        .bind(service_id)
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.into_iter().map(Slot::try_from).collect()
    }
}
