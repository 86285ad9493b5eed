use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use hearth_checkout::{CheckoutOutcome, CheckoutStarted};
use hearth_core::{Booking, BookingStatus, Reservation, ReservationStatus};
use hearth_hold::{ReleaseOutcome, ReservationLookup, ReserveOutcome};
use hearth_shared::Money;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::auth::{customer_auth_middleware, Claims},
    state::AppState,
};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateReservationRequest {
    pub slot_id: Uuid,
    pub hold_minutes: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateReservationResponse {
    pub reservation_id: Uuid,
    pub slot_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReservationResponse {
    pub reservation_id: Uuid,
    pub slot_id: Uuid,
    pub provider_id: Uuid,
    pub status: ReservationStatus,
    pub expires_at: DateTime<Utc>,
    pub checkout_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Reservation> for ReservationResponse {
    fn from(r: Reservation) -> Self {
        Self {
            reservation_id: r.id,
            slot_id: r.slot_id,
            provider_id: r.provider_id,
            status: r.status,
            expires_at: r.hold_expires_at,
            checkout_session_id: r.checkout_session_id,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BookingResponse {
    pub booking_id: Uuid,
    pub reservation_id: Uuid,
    pub slot_id: Uuid,
    pub status: BookingStatus,
    pub amount: Money,
    pub created_at: DateTime<Utc>,
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        Self {
            booking_id: b.id,
            reservation_id: b.reservation_id,
            slot_id: b.slot_id,
            status: b.status,
            amount: b.amount,
            created_at: b.created_at,
        }
    }
}

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/reservations", post(create_reservation))
        .route("/v1/reservations/{id}", get(get_reservation).delete(release_reservation))
        .route("/v1/reservations/{id}/checkout", post(start_checkout))
        .route("/v1/reservations/{id}/checkout/cancel", post(cancel_checkout))
        .route("/v1/bookings", get(list_bookings))
        .route_layer(axum::middleware::from_fn_with_state(state, customer_auth_middleware))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/reservations
async fn create_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateReservationRequest>,
) -> Result<(StatusCode, Json<CreateReservationResponse>), AppError> {
    let outcome = state.holds.reserve(&claims.sub, req.slot_id, req.hold_minutes).await?;

    match outcome {
        ReserveOutcome::Reserved(reservation) => {
            state.metrics.record_reservation("reserved");
            Ok((
                StatusCode::CREATED,
                Json(CreateReservationResponse {
                    reservation_id: reservation.id,
                    slot_id: reservation.slot_id,
                    expires_at: reservation.hold_expires_at,
                }),
            ))
        }
        ReserveOutcome::AlreadyHeld => {
            state.metrics.record_reservation("already_held");
            Err(AppError::ConflictError("Slot is no longer available".to_string()))
        }
        ReserveOutcome::NotFound => {
            state.metrics.record_reservation("not_found");
            Err(AppError::NotFoundError(format!("Slot {} not found", req.slot_id)))
        }
    }
}

/// GET /v1/reservations/{id}
async fn get_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReservationResponse>, AppError> {
    match state.holds.get(id, &claims.sub).await? {
        ReservationLookup::Found(reservation) => Ok(Json(reservation.into())),
        ReservationLookup::Forbidden => Err(forbidden()),
        ReservationLookup::NotFound => Err(not_found(id)),
    }
}

/// DELETE /v1/reservations/{id}
async fn release_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReservationResponse>, AppError> {
    let outcome = state.holds.release(id, &claims.sub).await?;
    released(&state, id, outcome)
}

/// POST /v1/reservations/{id}/checkout
async fn start_checkout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<CheckoutStarted>, AppError> {
    match state.checkout.initiate_checkout(id, &claims.sub).await? {
        CheckoutOutcome::Started(started) => Ok(Json(started)),
        CheckoutOutcome::Expired => Err(AppError::GoneError("Reservation hold has expired".to_string())),
        CheckoutOutcome::NotHeld(status) => Err(AppError::ConflictError(format!("Reservation is {}", status))),
        CheckoutOutcome::Forbidden => Err(forbidden()),
        CheckoutOutcome::NotFound => Err(not_found(id)),
    }
}

/// POST /v1/reservations/{id}/checkout/cancel
async fn cancel_checkout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReservationResponse>, AppError> {
    let outcome = state.checkout.cancel_checkout(id, &claims.sub).await?;
    released(&state, id, outcome)
}

/// GET /v1/bookings
async fn list_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    let bookings = state.checkout.bookings_for(&claims.sub).await?;
    Ok(Json(bookings.into_iter().map(BookingResponse::from).collect()))
}

fn released(state: &AppState, id: Uuid, outcome: ReleaseOutcome) -> Result<Json<ReservationResponse>, AppError> {
    match outcome {
        ReleaseOutcome::Released(reservation) => {
            state.metrics.record_reservation("released");
            Ok(Json(reservation.into()))
        }
        ReleaseOutcome::NotHeld(status) => Err(AppError::ConflictError(format!("Reservation is {}", status))),
        ReleaseOutcome::Forbidden => Err(forbidden()),
        ReleaseOutcome::NotFound => Err(not_found(id)),
    }
}

fn forbidden() -> AppError {
    AppError::AuthorizationError("Reservation belongs to another customer".to_string())
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFoundError(format!("Reservation {} not found", id))
}
