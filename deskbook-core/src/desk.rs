use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A bookable desk as published by catalog management.
///
/// Building and location details are denormalized onto the desk for
/// presentation; the core never writes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Desk {
    pub id: i64,
    pub name: String,
    pub floor_number: Option<i32>,
    pub capacity: Option<i32>,
    pub description: Option<String>,
    pub desk_type_id: Option<i64>,
    /// Static status maintained by catalog management (e.g. "active").
    pub status: Option<String>,
    pub rating: Option<f64>,
    pub location_id: Option<Uuid>,
    pub building_name: Option<String>,
    pub building_address: Option<String>,
    pub amenities: Option<serde_json::Value>,
    pub operating_hours: Option<serde_json::Value>,
    pub city: Option<String>,
}

/// The slot types the composition rules know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Morning,
    Evening,
    FullDay,
    Other,
}

impl SlotKind {
    /// Classify a catalog slot-type name, ignoring case and separators.
    pub fn from_slot_type(slot_type: &str) -> Self {
        let normalized = slot_type.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "morning" => SlotKind::Morning,
            "evening" => SlotKind::Evening,
            "full_day" | "fullday" => SlotKind::FullDay,
            _ => SlotKind::Other,
        }
    }
}

/// Catalog entry describing a bookable time window shared by all desks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotDefinition {
    pub id: i64,
    pub slot_type: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub time_zone: Option<String>,
    pub is_active: bool,
}

impl SlotDefinition {
    pub fn kind(&self) -> SlotKind {
        SlotKind::from_slot_type(&self.slot_type)
    }
}

/// Active price of a slot for one desk type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeskPrice {
    pub desk_type_id: i64,
    pub slot_id: i64,
    pub price: f64,
}
