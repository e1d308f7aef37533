use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::desk::{Desk, SlotDefinition};
use crate::reservation::ReservationStatus;
use crate::{CoreError, CoreResult};

/// Effective status of a slot (or of a whole desk) in a snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Available,
    Held,
    Booked,
    Unavailable,
}

impl SlotStatus {
    pub fn is_claimed(self) -> bool {
        matches!(self, SlotStatus::Held | SlotStatus::Booked)
    }
}

impl From<ReservationStatus> for SlotStatus {
    fn from(status: ReservationStatus) -> Self {
        match status {
            ReservationStatus::Held => SlotStatus::Held,
            ReservationStatus::Booked => SlotStatus::Booked,
        }
    }
}

/// Validated availability filters. Empty lists mean "any"; a missing date
/// means "today" at query time.
///
/// Ids are sorted and deduplicated so equal filter sets compare and hash
/// equal, which lets the broadcaster share one query between viewers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct AvailabilityFilter {
    pub location_ids: Vec<Uuid>,
    pub desk_type_ids: Vec<i64>,
    pub slot_type_ids: Vec<i64>,
    pub booking_date: Option<NaiveDate>,
}

impl AvailabilityFilter {
    pub fn for_date(booking_date: NaiveDate) -> Self {
        Self {
            booking_date: Some(booking_date),
            ..Self::default()
        }
    }

    pub fn resolved_date(&self, today: NaiveDate) -> NaiveDate {
        self.booking_date.unwrap_or(today)
    }

    pub fn matches_desk(&self, desk: &Desk) -> bool {
        let location_ok = self.location_ids.is_empty()
            || desk.location_id.is_some_and(|id| self.location_ids.contains(&id));
        let type_ok = self.desk_type_ids.is_empty()
            || desk.desk_type_id.is_some_and(|id| self.desk_type_ids.contains(&id));
        location_ok && type_ok
    }

    pub fn matches_slot(&self, slot: &SlotDefinition) -> bool {
        self.slot_type_ids.is_empty() || self.slot_type_ids.contains(&slot.id)
    }
}

/// A single id as clients send it: a JSON number, a string, or a
/// comma-joined string of several ids.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IdValue {
    Number(i64),
    Text(String),
}

/// Filter set as received on the wire (REST query or `filter_update`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterPayload {
    #[serde(default)]
    pub location_ids: Option<Vec<IdValue>>,
    #[serde(default)]
    pub desk_type_ids: Option<Vec<IdValue>>,
    #[serde(default)]
    pub slot_type_ids: Option<Vec<IdValue>>,
    #[serde(default)]
    pub booking_date: Option<String>,
}

impl FilterPayload {
    pub fn validate(self) -> CoreResult<AvailabilityFilter> {
        let mut location_ids = tokens(self.location_ids)
            .into_iter()
            .map(|token| {
                Uuid::parse_str(&token)
                    .map_err(|_| CoreError::Validation(format!("Invalid location id: {}", token)))
            })
            .collect::<CoreResult<Vec<_>>>()?;
        location_ids.sort();
        location_ids.dedup();

        let desk_type_ids = integer_ids(self.desk_type_ids, "desk type")?;
        let slot_type_ids = integer_ids(self.slot_type_ids, "slot type")?;

        let booking_date = match self.booking_date.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                CoreError::Validation(format!("Invalid booking_date (expected YYYY-MM-DD): {}", raw))
            })?),
        };

        Ok(AvailabilityFilter {
            location_ids,
            desk_type_ids,
            slot_type_ids,
            booking_date,
        })
    }
}

fn tokens(values: Option<Vec<IdValue>>) -> Vec<String> {
    values
        .unwrap_or_default()
        .into_iter()
        .flat_map(|value| match value {
            IdValue::Number(n) => vec![n.to_string()],
            IdValue::Text(text) => text
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(String::from)
                .collect(),
        })
        .collect()
}

fn integer_ids(values: Option<Vec<IdValue>>, label: &str) -> CoreResult<Vec<i64>> {
    let mut ids = tokens(values)
        .into_iter()
        .map(|token| {
            token
                .parse::<i64>()
                .map_err(|_| CoreError::Validation(format!("Invalid {} id: {}", label, token)))
        })
        .collect::<CoreResult<Vec<_>>>()?;
    ids.sort_unstable();
    ids.dedup();
    Ok(ids)
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SlotAvailability {
    pub slot_id: i64,
    pub slot_type: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub time_zone: Option<String>,
    pub status: SlotStatus,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeskAvailability {
    pub desk_id: i64,
    pub desk_name: String,
    pub floor_number: Option<i32>,
    pub capacity: Option<i32>,
    pub description: Option<String>,
    pub desk_type_id: Option<i64>,
    pub location_id: Option<Uuid>,
    /// Derived from the slots by the composition rules.
    pub desk_status: SlotStatus,
    /// Static catalog status, passed through untouched.
    pub base_status: Option<String>,
    pub rating: Option<f64>,
    pub building_name: Option<String>,
    pub building_address: Option<String>,
    pub amenities: Option<serde_json::Value>,
    pub operating_hours: Option<serde_json::Value>,
    pub city: Option<String>,
    pub slots: Vec<SlotAvailability>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailabilitySnapshot {
    pub booking_date: NaiveDate,
    pub desks: Vec<DeskAvailability>,
}
