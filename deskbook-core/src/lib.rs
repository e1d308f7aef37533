pub mod desk;
pub mod reservation;
pub mod search;
pub mod composition;
pub mod repository;

pub use desk::{Desk, DeskPrice, SlotDefinition, SlotKind};
pub use reservation::{BookingDetails, HoldPolicy, HoldRequest, NewHold, ReservationRecord, ReservationStatus, SlotClaim};
pub use search::{AvailabilityFilter, AvailabilitySnapshot, DeskAvailability, FilterPayload, IdValue, SlotAvailability, SlotStatus};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Internal service error: {0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
