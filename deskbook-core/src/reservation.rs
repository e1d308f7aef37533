use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::desk::{Desk, SlotDefinition};
use crate::{CoreError, CoreResult};

/// Lifecycle status of a stored reservation. A slot with no record is free.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Held,
    Booked,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Held => "held",
            ReservationStatus::Booked => "booked",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "held" => Ok(ReservationStatus::Held),
            "booked" => Ok(ReservationStatus::Booked),
            other => Err(CoreError::Internal(format!("Unknown reservation status: {}", other))),
        }
    }
}

/// Desk, building, slot and pricing context captured when a hold is taken.
/// Written once with the record and never recomputed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingDetails {
    pub desk_name: String,
    pub floor_number: Option<i32>,
    pub capacity: Option<i32>,
    pub building_name: Option<String>,
    pub building_address: Option<String>,
    pub city: Option<String>,
    pub slot_type: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub time_zone: Option<String>,
    pub price: f64,
}

impl BookingDetails {
    pub fn capture(desk: &Desk, slot: &SlotDefinition, price: Option<f64>) -> Self {
        Self {
            desk_name: desk.name.clone(),
            floor_number: desk.floor_number,
            capacity: desk.capacity,
            building_name: desk.building_name.clone(),
            building_address: desk.building_address.clone(),
            city: desk.city.clone(),
            slot_type: slot.slot_type.clone(),
            start_time: slot.start_time,
            end_time: slot.end_time,
            time_zone: slot.time_zone.clone(),
            price: price.unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationRecord {
    pub id: i64,
    pub user_id: Uuid,
    pub desk_id: i64,
    pub slot_id: i64,
    pub booking_date: NaiveDate,
    pub status: ReservationStatus,
    pub booking_details: Option<BookingDetails>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReservationRecord {
    /// Guard for `held -> booked`.
    pub fn ensure_confirmable(&self) -> CoreResult<()> {
        match self.status {
            ReservationStatus::Held => Ok(()),
            ReservationStatus::Booked => Err(CoreError::InvalidState(format!(
                "Booking {} is not in held status",
                self.id
            ))),
        }
    }

    /// Guard for `held -> free`. Booked records cannot be released here.
    pub fn ensure_releasable(&self) -> CoreResult<()> {
        match self.status {
            ReservationStatus::Held => Ok(()),
            ReservationStatus::Booked => Err(CoreError::NotFound(format!(
                "No held booking with id {}",
                self.id
            ))),
        }
    }

    /// A hold taken before `stale_before` has outlived its TTL.
    pub fn is_stale(&self, stale_before: Option<DateTime<Utc>>) -> bool {
        self.status == ReservationStatus::Held
            && stale_before.is_some_and(|cutoff| self.created_at < cutoff)
    }
}

/// Validated input of the Hold operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldRequest {
    pub user_id: Uuid,
    pub desk_id: i64,
    pub slot_id: i64,
    pub booking_date: NaiveDate,
}

impl HoldRequest {
    pub fn new(user_id: Uuid, desk_id: i64, slot_id: i64, booking_date: NaiveDate) -> CoreResult<Self> {
        if user_id.is_nil() {
            return Err(CoreError::Validation("user_id must not be nil".to_string()));
        }
        if desk_id <= 0 || slot_id <= 0 {
            return Err(CoreError::Validation("desk_id and slot_id must be positive".to_string()));
        }
        Ok(Self { user_id, desk_id, slot_id, booking_date })
    }
}

/// A hold ready to be written, with its context snapshot attached.
#[derive(Debug, Clone)]
pub struct NewHold {
    pub request: HoldRequest,
    pub booking_details: BookingDetails,
}

/// How long an unconfirmed hold keeps its slot. No TTL means holds never
/// expire on their own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HoldPolicy {
    ttl: Option<Duration>,
}

impl HoldPolicy {
    /// `0` disables expiry.
    pub fn from_ttl_seconds(seconds: u64) -> Self {
        let ttl = i64::try_from(seconds)
            .ok()
            .filter(|s| *s > 0)
            .and_then(Duration::try_seconds);
        Self { ttl }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Holds created before the returned instant are stale. A TTL reaching
    /// past the representable range behaves like no TTL.
    pub fn stale_before(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.ttl.and_then(|ttl| now.checked_sub_signed(ttl))
    }
}

/// One active claim on a (desk, slot) for the queried date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotClaim {
    pub desk_id: i64,
    pub slot_id: i64,
    pub status: ReservationStatus,
}
