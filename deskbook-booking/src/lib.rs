pub mod availability;
pub mod broadcast;
pub mod metrics;
pub mod reservations;

pub use availability::AvailabilityService;
pub use broadcast::{BroadcastCoordinator, BroadcastSettings, Outbox, Trigger};
pub use metrics::Metrics;
pub use reservations::{HoldStatus, ReservationService};
