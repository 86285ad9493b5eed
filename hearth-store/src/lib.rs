pub mod app_config;
pub mod database;
pub mod memory;
pub mod redis_repo;
pub mod slot_repo;
pub mod reservation_repo;
pub mod booking_repo;
pub mod hold_repo;
#[cfg(feature = "kafka")]
pub mod events;

pub use database::DbClient;
pub use memory::{MemoryBookingRepository, MemoryReservationRepository, MemorySlotStore};
pub use redis_repo::RedisClient;
pub use slot_repo::PgSlotStore;
pub use reservation_repo::PgReservationRepository;
pub use booking_repo::PgBookingRepository;
pub use hold_repo::PgHoldWriter;
#[cfg(feature = "kafka")]
pub use events::KafkaEventSink;
