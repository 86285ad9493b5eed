//! Prometheus counters for reservation and payment outcomes, exported on `/metrics`.

use axum::{extract::State, http::header, response::IntoResponse};
use prometheus::{opts, IntCounterVec, Registry, TextEncoder};

use crate::{error::AppError, state::AppState};

pub struct ApiMetrics {
    registry: Registry,
    /// Labels: `outcome` (reserved, already_held, not_found, released, ...)
    reservations: IntCounterVec,
    /// Labels: `outcome` (confirmed, conflict, expired, failed, ...)
    payments: IntCounterVec,
}

impl ApiMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let reservations = IntCounterVec::new(
            opts!("hearth_reservation_outcomes_total", "Reservation requests by outcome"),
            &["outcome"],
        )?;
        let payments = IntCounterVec::new(
            opts!("hearth_payment_outcomes_total", "Payment callbacks by outcome"),
            &["outcome"],
        )?;

        registry.register(Box::new(reservations.clone()))?;
        registry.register(Box::new(payments.clone()))?;

        Ok(Self {
            registry,
            reservations,
            payments,
        })
    }

    pub fn record_reservation(&self, outcome: &str) {
        self.reservations.with_label_values(&[outcome]).inc();
    }

    pub fn record_payment(&self, outcome: &str) {
        self.payments.with_label_values(&[outcome]).inc();
    }

    pub fn reservation_count(&self, outcome: &str) -> u64 {
        self.reservations.with_label_values(&[outcome]).get()
    }

    pub fn export(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

pub async fn metrics_handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state
        .metrics
        .export()
        .map_err(|e| AppError::InternalServerError(format!("Metrics export failed: {}", e)))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_show_up_in_export() {
        let metrics = ApiMetrics::new().unwrap();
        metrics.record_reservation("reserved");
        metrics.record_reservation("reserved");
        metrics.record_payment("confirmed");

        assert_eq!(metrics.reservation_count("reserved"), 2);
        let text = metrics.export().unwrap();
        assert!(text.contains("hearth_reservation_outcomes_total{outcome=\"reserved\"} 2"));
        assert!(text.contains("hearth_payment_outcomes_total{outcome=\"confirmed\"} 1"));
    }
}
