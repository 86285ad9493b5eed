use axum::{
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use hearth_checkout::ConfirmOutcome;
use hearth_core::PaymentStatus;
use hearth_hold::ReleaseOutcome;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

#[derive(Debug, Deserialize, Serialize)]
pub struct PaymentWebhook {
    /// Processor's delivery id, logged only.
    pub event_id: Option<String>,
    pub reservation_id: Uuid,
    pub transaction_id: String,
    pub status: PaymentStatus,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Confirmed,
    Refunded,
    Released,
    Ignored,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub outcome: WebhookOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<Uuid>,
}

/// Compared in constant time so response timing does not leak the secret.
fn secret_matches(presented: Option<&[u8]>, expected: &str) -> bool {
    presented.is_some_and(|presented| constant_time_eq::constant_time_eq(presented, expected.as_bytes()))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments", post(handle_payment_webhook))
}

/// POST /v1/webhooks/payments
/// Payment processor callback. Error responses make the processor redeliver.
async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<PaymentWebhook>,
) -> Result<Json<WebhookResponse>, AppError> {
    let presented = headers.get(WEBHOOK_SECRET_HEADER).map(|h| h.as_bytes());
    if !secret_matches(presented, state.auth.webhook_secret.expose()) {
        tracing::warn!("Rejected payment webhook with missing or wrong secret");
        return Err(AppError::AuthenticationError("Invalid webhook secret".to_string()));
    }

    tracing::info!(
        "Received payment webhook {} ({:?}) for reservation {}",
        payload.event_id.as_deref().unwrap_or("-"),
        payload.status,
        payload.reservation_id
    );

    match payload.status {
        PaymentStatus::Succeeded => {
            let outcome = state
                .checkout
                .settle_payment(payload.reservation_id, &payload.transaction_id)
                .await?;

            match outcome {
                ConfirmOutcome::Confirmed(booking) => {
                    state.metrics.record_payment("confirmed");
                    Ok(Json(WebhookResponse {
                        outcome: WebhookOutcome::Confirmed,
                        booking_id: Some(booking.id),
                    }))
                }
                ConfirmOutcome::Conflict | ConfirmOutcome::Expired => {
                    state.metrics.record_payment("refunded");
                    Ok(Json(WebhookResponse {
                        outcome: WebhookOutcome::Refunded,
                        booking_id: None,
                    }))
                }
                ConfirmOutcome::NotFound => {
                    state.metrics.record_payment("unknown_reservation");
                    Err(AppError::NotFoundError(format!(
                        "Reservation {} not found",
                        payload.reservation_id
                    )))
                }
            }
        }
        PaymentStatus::Failed | PaymentStatus::Canceled => {
            state.metrics.record_payment("failed");
            let outcome = match state.checkout.payment_failed(payload.reservation_id).await? {
                ReleaseOutcome::Released(_) => WebhookOutcome::Released,
                _ => WebhookOutcome::Ignored,
            };
            Ok(Json(WebhookResponse {
                outcome,
                booking_id: None,
            }))
        }
    }
}
