use async_trait::async_trait;
use hearth_core::{CheckoutSession, CheckoutSessionRequest, PaymentError, PaymentGateway, Reservation, Slot};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

pub struct PaymentOrchestrator {
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentOrchestrator {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { gateway }
    }

    /// Open a hosted checkout for the held slot. The session lapses with the hold.
    pub async fn open_session(&self, reservation: &Reservation, slot: &Slot) -> Result<CheckoutSession, PaymentError> {
        let request = CheckoutSessionRequest {
            reservation_id: reservation.id,
            amount: slot.price.clone(),
            description: format!(
                "Appointment {} - {}",
                slot.start_time.format("%Y-%m-%d %H:%M"),
                slot.end_time.format("%H:%M UTC")
            ),
            expires_at: reservation.hold_expires_at,
        };
        self.gateway.create_session(&request).await
    }

    pub async fn existing_session(&self, session_id: &str) -> Result<Option<CheckoutSession>, PaymentError> {
        self.gateway.get_session(session_id).await
    }

    pub async fn refund(&self, transaction_id: &str) -> Result<(), PaymentError> {
        info!("Refunding transaction {}", transaction_id);
        self.gateway.refund(transaction_id).await
    }
}

/// In-process gateway for development and tests. Sessions live in memory and
/// refunds are only recorded.
pub struct MockPaymentGateway {
    checkout_base_url: String,
    sessions: RwLock<HashMap<String, CheckoutSession>>,
    refunds: Mutex<Vec<String>>,
}

impl MockPaymentGateway {
    pub fn new(checkout_base_url: &str) -> Self {
        Self {
            checkout_base_url: checkout_base_url.trim_end_matches('/').to_string(),
            sessions: RwLock::new(HashMap::new()),
            refunds: Mutex::new(Vec::new()),
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn refunded(&self) -> Vec<String> {
        self.refunds.lock().await.clone()
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_session(&self, request: &CheckoutSessionRequest) -> Result<CheckoutSession, PaymentError> {
        if !request.amount.is_positive() {
            return Err(PaymentError::Rejected(format!("amount {} is not payable", request.amount)));
        }

        let id = format!("cs_mock_{}", Uuid::new_v4().simple());
        let session = CheckoutSession {
            url: format!("{}/{}", self.checkout_base_url, id),
            id: id.clone(),
            reservation_id: request.reservation_id,
            amount: request.amount.clone(),
            expires_at: request.expires_at,
        };
        self.sessions.write().await.insert(id, session.clone());
        Ok(session)
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<CheckoutSession>, PaymentError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn refund(&self, transaction_id: &str) -> Result<(), PaymentError> {
        self.refunds.lock().await.push(transaction_id.to_string());
        Ok(())
    }
}
