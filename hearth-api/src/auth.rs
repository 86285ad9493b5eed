use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::auth::{issue_token, ROLE_ADMIN, ROLE_CUSTOMER},
    state::AppState,
};

/// Both fields are optional; send `{}` for an anonymous customer.
#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    pub customer_id: Option<String>,
    /// `CUSTOMER` (default) or `ADMIN`.
    pub role: Option<String>,
}

#[derive(Debug, Serialize)]
struct AuthResponse {
    token: String,
    customer_id: String,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/auth/token", post(issue_dev_token))
}

/// Development-only token issuer. Production tokens come from the identity provider.
async fn issue_dev_token(
    State(state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    if !state.auth.allow_dev_tokens {
        return Err(AppError::NotFoundError("Not found".to_string()));
    }

    let role = match request.role.as_deref() {
        None | Some(ROLE_CUSTOMER) => ROLE_CUSTOMER,
        Some(ROLE_ADMIN) => ROLE_ADMIN,
        Some(other) => return Err(AppError::ValidationError(format!("Unknown role: {}", other))),
    };
    let customer_id = request
        .customer_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| format!("customer-{}", Uuid::new_v4()));

    let token = issue_token(state.auth.secret.expose(), &customer_id, role, state.auth.expiration)
        .map_err(|e| AppError::InternalServerError(format!("Token encoding failed: {}", e)))?;

    tracing::info!("Issued development {} token for {}", role, customer_id);
    Ok(Json(AuthResponse { token, customer_id }))
}
