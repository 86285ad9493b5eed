pub mod coordinator;
pub mod orchestrator;

pub use coordinator::{
    BookingChange, CheckoutCoordinator, CheckoutError, CheckoutOutcome, CheckoutResult, CheckoutStarted, ConfirmOutcome,
};
pub use orchestrator::{MockPaymentGateway, PaymentOrchestrator};
