use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Extension, Router,
};
use futures_util::{Stream, StreamExt};
use hearth_core::EventFilter;
use hearth_hold::ReservationLookup;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::auth::{customer_auth_middleware, Claims},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub reservation_id: Option<Uuid>,
}

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/events/stream", get(stream_events))
        .route_layer(axum::middleware::from_fn_with_state(state, customer_auth_middleware))
}

/// GET /v1/events/stream?reservation_id=
/// Lifecycle events for one of the caller's reservations, or all of them.
async fn stream_events(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let filter = match query.reservation_id {
        Some(id) => match state.holds.get(id, &claims.sub).await? {
            ReservationLookup::Found(_) => EventFilter::Reservation(id),
            ReservationLookup::Forbidden => {
                return Err(AppError::AuthorizationError(
                    "Reservation belongs to another customer".to_string(),
                ))
            }
            ReservationLookup::NotFound => {
                return Err(AppError::NotFoundError(format!("Reservation {} not found", id)))
            }
        },
        None => EventFilter::Customer(claims.sub.clone()),
    };

    tracing::debug!("Opening event stream for {} ({:?})", claims.sub, filter);
    let stream = state
        .notifier
        .subscribe(filter)
        .into_stream()
        .map(|event| Event::default().event(event.topic.as_str()).json_data(&event));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
