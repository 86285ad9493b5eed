pub mod models;
pub mod masked;

pub use masked::Masked;
pub use models::events::{EventPayload, EventTopic, LifecycleEvent};
pub use models::money::Money;
