pub mod models;

pub use models::events::{ReservationEvent, ReservationEventKind};
