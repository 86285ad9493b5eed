use anyhow::Context;
use hearth_checkout::{CheckoutCoordinator, PaymentOrchestrator};
use hearth_core::{
    BookingRepository, Clock, EventNotifier, HoldWriter, PaymentGateway, ReservationRepository, SlotStore,
};
use hearth_hold::{ExpirySweeper, HoldPolicy, ReservationManager, SequentialHoldWriter, SweepSchedule};
use hearth_shared::Masked;
use hearth_store::app_config::Config;
use hearth_store::{
    DbClient, MemoryBookingRepository, MemoryReservationRepository, MemorySlotStore, PgBookingRepository,
    PgHoldWriter, PgReservationRepository, PgSlotStore, RedisClient,
};
use std::sync::Arc;
use std::time::Duration;

use crate::metrics::ApiMetrics;

#[derive(Clone)]
pub struct AuthSettings {
    pub secret: Masked<String>,
    pub expiration: u64,
    pub webhook_secret: Masked<String>,
    pub allow_dev_tokens: bool,
}

/// The repositories every component shares, plus the writer that places holds.
#[derive(Clone)]
pub struct Stores {
    pub slots: Arc<dyn SlotStore>,
    pub reservations: Arc<dyn ReservationRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub holds: Arc<dyn HoldWriter>,
}

impl Stores {
    pub fn in_memory() -> Self {
        let slots: Arc<dyn SlotStore> = Arc::new(MemorySlotStore::new());
        let reservations: Arc<dyn ReservationRepository> = Arc::new(MemoryReservationRepository::new());
        Self {
            holds: Arc::new(SequentialHoldWriter::new(slots.clone(), reservations.clone())),
            slots,
            reservations,
            bookings: Arc::new(MemoryBookingRepository::new()),
        }
    }

    pub fn postgres(db: &DbClient) -> Self {
        Self {
            slots: Arc::new(PgSlotStore::new(db.pool.clone())),
            reservations: Arc::new(PgReservationRepository::new(db.pool.clone())),
            bookings: Arc::new(PgBookingRepository::new(db.pool.clone())),
            holds: Arc::new(PgHoldWriter::new(db.pool.clone())),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub slots: Arc<dyn SlotStore>,
    pub holds: Arc<ReservationManager>,
    pub checkout: Arc<CheckoutCoordinator>,
    pub sweeper: Arc<ExpirySweeper>,
    pub notifier: EventNotifier,
    pub redis: Option<Arc<RedisClient>>,
    pub rate_limit: i64,
    pub auth: AuthSettings,
    pub metrics: Arc<ApiMetrics>,
}

impl AppState {
    pub fn new(
        config: &Config,
        stores: Stores,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let notifier = EventNotifier::new(config.notifier.channel_capacity);

        let holds = Arc::new(ReservationManager::new(
            stores.slots.clone(),
            stores.reservations.clone(),
            notifier.clone(),
            clock.clone(),
            HoldPolicy {
                default_minutes: config.holds.default_minutes,
                max_minutes: config.holds.max_minutes,
            },
        )
        .with_hold_writer(stores.holds.clone()));

        let sweeper = Arc::new(ExpirySweeper::new(
            stores.slots.clone(),
            stores.reservations.clone(),
            notifier.clone(),
            clock.clone(),
            SweepSchedule {
                interval: Duration::from_secs(config.sweeper.interval_seconds),
                batch_size: config.sweeper.batch_size,
                max_backoff: Duration::from_secs(config.sweeper.max_backoff_seconds),
            },
        ));

        let checkout = Arc::new(CheckoutCoordinator::new(
            holds.clone(),
            stores.slots.clone(),
            stores.reservations.clone(),
            stores.bookings.clone(),
            PaymentOrchestrator::new(gateway),
            notifier.clone(),
            clock,
        ));

        let (redis, rate_limit) = match &config.redis {
            Some(redis) => (
                Some(Arc::new(RedisClient::new(&redis.url).context("Invalid Redis URL")?)),
                redis.requests_per_minute,
            ),
            None => (None, 0),
        };

        Ok(Self {
            slots: stores.slots,
            holds,
            checkout,
            sweeper,
            notifier,
            redis,
            rate_limit,
            auth: AuthSettings {
                secret: config.auth.jwt_secret.clone(),
                expiration: config.auth.jwt_expiration_seconds,
                webhook_secret: config.auth.webhook_secret.clone(),
                allow_dev_tokens: config.auth.allow_dev_tokens,
            },
            metrics: Arc::new(ApiMetrics::new().context("Failed to register metrics")?),
        })
    }
}
