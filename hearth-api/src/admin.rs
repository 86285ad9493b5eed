use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use hearth_checkout::BookingChange;
use hearth_core::{BookingStatus, Slot, SlotStore};
use hearth_shared::Money;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::auth::admin_auth_middleware,
    reservations::BookingResponse,
    slots::SlotResponse,
    state::AppState,
};

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PublishSlotRequest {
    pub provider_id: Uuid,
    pub service_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub price_amount: i64,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
pub struct BookingStatusRequest {
    pub status: BookingStatus,
}

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/admin/slots", post(publish_slot))
        .route("/v1/admin/bookings/{id}/status", post(update_booking_status))
        .route_layer(axum::middleware::from_fn_with_state(state, admin_auth_middleware))
}

/// POST /v1/admin/slots
/// Publish a bookable slot from the provider's availability.
async fn publish_slot(
    State(state): State<AppState>,
    Json(req): Json<PublishSlotRequest>,
) -> Result<(StatusCode, Json<SlotResponse>), AppError> {
    let slot = Slot::new(
        req.provider_id,
        req.service_id,
        req.start_time,
        req.end_time,
        Money::new(req.price_amount, &req.currency),
    )
    .map_err(|e| AppError::ValidationError(e.to_string()))?;

    state.slots.insert(&slot).await?;
    tracing::info!(
        "Published slot {} for provider {} at {}",
        slot.id, slot.provider_id, slot.start_time
    );

    Ok((StatusCode::CREATED, Json(slot.into())))
}

/// POST /v1/admin/bookings/{id}/status
async fn update_booking_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<BookingStatusRequest>,
) -> Result<Json<BookingResponse>, AppError> {
    match state.checkout.transition_booking(id, req.status).await? {
        BookingChange::Updated(booking) => Ok(Json(booking.into())),
        BookingChange::NotFound => Err(AppError::NotFoundError(format!("Booking {} not found", id))),
        BookingChange::Rejected(e) => Err(AppError::ConflictError(e.to_string())),
    }
}
