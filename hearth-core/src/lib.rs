pub mod slot;
pub mod reservation;
pub mod booking;
pub mod repository;
pub mod payment;
pub mod clock;
pub mod notifier;

pub use booking::{Booking, BookingStatus};
pub use clock::{Clock, ManualClock, SystemClock};
pub use notifier::{EventFilter, EventNotifier, EventSink, NotifyError, Subscription};
pub use payment::{CheckoutSession, CheckoutSessionRequest, PaymentError, PaymentGateway, PaymentStatus};
pub use repository::{
    BookingInsert, BookingRepository, HoldWriter, ReservationRepository, SlotStore, StoreError, StoreResult,
    Transition,
};
pub use reservation::{Reservation, ReservationStatus};
pub use slot::{Slot, SlotStatus, TimeWindow};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("Unknown status value: {0}")]
    UnknownStatus(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
