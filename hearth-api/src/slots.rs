use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use hearth_core::{Slot, SlotStatus, SlotStore, TimeWindow};
use hearth_shared::Money;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct SlotQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SlotResponse {
    pub slot_id: Uuid,
    pub provider_id: Uuid,
    pub service_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: SlotStatus,
    pub price: Money,
}

impl From<Slot> for SlotResponse {
    fn from(slot: Slot) -> Self {
        Self {
            slot_id: slot.id,
            provider_id: slot.provider_id,
            service_id: slot.service_id,
            start_time: slot.start_time,
            end_time: slot.end_time,
            status: slot.status,
            price: slot.price,
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/v1/providers/{provider_id}/services/{service_id}/slots",
        get(list_slots),
    )
}

/// GET /v1/providers/{provider_id}/services/{service_id}/slots?from=&to=
async fn list_slots(
    State(state): State<AppState>,
    Path((provider_id, service_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Vec<SlotResponse>>, AppError> {
    let window = TimeWindow::new(query.from, query.to).map_err(|e| AppError::ValidationError(e.to_string()))?;

    let slots = state.slots.list_available(provider_id, service_id, &window).await?;

    Ok(Json(slots.into_iter().map(SlotResponse::from).collect()))
}
