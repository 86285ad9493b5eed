use chrono::{DateTime, Utc};
use hearth_shared::Money;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{CoreError, CoreResult};

/// Slot status as stored; only the slot store changes it, via `try_transition`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotStatus {
    Available,
    Held,
    Booked,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Available => "AVAILABLE",
            SlotStatus::Held => "HELD",
            SlotStatus::Booked => "BOOKED",
        }
    }
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SlotStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AVAILABLE" => Ok(SlotStatus::Available),
            "HELD" => Ok(SlotStatus::Held),
            "BOOKED" => Ok(SlotStatus::Booked),
            other => Err(CoreError::UnknownStatus(other.to_string())),
        }
    }
}

/// A bookable interval offered by a provider for one service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Slot {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub service_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: SlotStatus,
    pub price: Money,
    pub version: i64,
}

impl Slot {
    /// New `AVAILABLE` slot at version 0.
    pub fn new(
        provider_id: Uuid,
        service_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        price: Money,
    ) -> CoreResult<Self> {
        if end_time <= start_time {
            return Err(CoreError::ValidationError(
                "slot end_time must be after start_time".to_string(),
            ));
        }
        if !price.is_positive() {
            return Err(CoreError::ValidationError(
                "slot price must be positive".to_string(),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            provider_id,
            service_id,
            start_time,
            end_time,
            status: SlotStatus::Available,
            price,
            version: 0,
        })
    }

    pub fn is_available(&self) -> bool {
        self.status == SlotStatus::Available
    }

    /// True when this slot was moved to `BOOKED` by the holder of `hold_version`,
    /// i.e. the very next transition after that hold was the booking.
    pub fn booked_from(&self, hold_version: i64) -> bool {
        self.status == SlotStatus::Booked && self.version == hold_version + 1
    }
}

/// Half-open `[start, end)` interval used by availability queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> CoreResult<Self> {
        if end <= start {
            return Err(CoreError::ValidationError(
                "window end must be after window start".to_string(),
            ));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}
