use chrono::NaiveDate;
use uuid::Uuid;

/// Pub/sub channel carrying [`ReservationEvent`]s between instances.
pub const RESERVATION_EVENTS_CHANNEL: &str = "deskbook.reservations";

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReservationEventKind {
    Held,
    Booked,
    Released,
    Expired,
}

/// Emitted after every successful reservation state transition.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct ReservationEvent {
    /// Instance that performed the transition; relays skip their own events.
    pub origin: Uuid,
    pub kind: ReservationEventKind,
    pub reservation_id: i64,
    pub desk_id: i64,
    pub slot_id: i64,
    pub booking_date: NaiveDate,
    pub timestamp: i64,
}

impl ReservationEvent {
    pub fn new(
        origin: Uuid,
        kind: ReservationEventKind,
        reservation_id: i64,
        desk_id: i64,
        slot_id: i64,
        booking_date: NaiveDate,
    ) -> Self {
        Self {
            origin,
            kind,
            reservation_id,
            desk_id,
            slot_id,
            booking_date,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}
