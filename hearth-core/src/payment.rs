use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearth_shared::Money;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status reported by the payment processor callback.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Succeeded,
    Failed,
    Canceled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSessionRequest {
    /// Correlation id echoed back by the processor's callback.
    pub reservation_id: Uuid,
    pub amount: Money,
    pub description: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub reservation_id: Uuid,
    pub url: String,
    pub amount: Money,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment processor unreachable: {0}")]
    Unavailable(String),
    #[error("Payment processor rejected the request: {0}")]
    Rejected(String),
}

/// Hosted-checkout payment processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a hosted checkout session and return its redirect URL.
    async fn create_session(&self, request: &CheckoutSessionRequest) -> Result<CheckoutSession, PaymentError>;

    async fn get_session(&self, session_id: &str) -> Result<Option<CheckoutSession>, PaymentError>;

    /// Return the money for a payment that could not be turned into a booking.
    async fn refund(&self, transaction_id: &str) -> Result<(), PaymentError>;
}
