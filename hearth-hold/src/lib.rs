pub mod manager;
pub mod sweeper;
pub mod writer;

pub use manager::{HoldError, HoldPolicy, HoldResult, ReleaseOutcome, ReservationLookup, ReservationManager, ReserveOutcome};
pub use sweeper::{ExpirySweeper, SweepReport, SweepSchedule};
pub use writer::SequentialHoldWriter;
