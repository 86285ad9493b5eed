use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hearth_checkout::CheckoutError;
use hearth_core::{PaymentError, StoreError};
use hearth_hold::HoldError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    GoneError(String),
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::GoneError(msg) => (StatusCode::GONE, msg),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::Anyhow(err) => classify(&err),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Map library errors that reached a handler through `?` onto a status code.
fn classify(err: &anyhow::Error) -> (StatusCode, String) {
    let store = err
        .downcast_ref::<StoreError>()
        .or_else(|| match err.downcast_ref::<HoldError>() {
            Some(HoldError::Store(e)) => Some(e),
            _ => None,
        })
        .or_else(|| match err.downcast_ref::<CheckoutError>() {
            Some(CheckoutError::Store(e)) | Some(CheckoutError::Hold(HoldError::Store(e))) => Some(e),
            _ => None,
        });

    if let Some(HoldError::InvalidHoldDuration(msg)) = err
        .downcast_ref::<HoldError>()
        .or_else(|| match err.downcast_ref::<CheckoutError>() {
            Some(CheckoutError::Hold(e)) => Some(e),
            _ => None,
        })
    {
        return (StatusCode::BAD_REQUEST, msg.clone());
    }

    let payment = err.downcast_ref::<PaymentError>().or_else(|| match err.downcast_ref::<CheckoutError>() {
        Some(CheckoutError::Payment(e)) => Some(e),
        _ => None,
    });

    match (store, payment) {
        (Some(StoreError::Unavailable(msg)), _) => {
            tracing::error!("Store unavailable: {}", msg);
            (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable".to_string())
        }
        (_, Some(PaymentError::Unavailable(msg))) => {
            tracing::error!("Payment processor unavailable: {}", msg);
            (StatusCode::SERVICE_UNAVAILABLE, "Payment processor unavailable".to_string())
        }
        (_, Some(PaymentError::Rejected(msg))) => {
            tracing::warn!("Payment processor rejected request: {}", msg);
            (StatusCode::BAD_GATEWAY, "Payment processor rejected the request".to_string())
        }
        _ => {
            tracing::error!("Internal Server Error: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
        }
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Anyhow(err.into())
    }
}
