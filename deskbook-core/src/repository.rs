use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::desk::{Desk, DeskPrice, SlotDefinition};
use crate::reservation::{NewHold, ReservationRecord, SlotClaim};
use crate::search::AvailabilityFilter;
use crate::CoreResult;

/// Repository trait for reservation records.
///
/// Implementations own atomicity: `insert_hold` must check for an active
/// claim and insert in one transaction, so concurrent callers racing for the
/// same (desk, slot, date) see exactly one success and `Conflict` otherwise.
/// Holds created before `stale_before` are treated as expired.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    async fn insert_hold(
        &self,
        hold: NewHold,
        stale_before: Option<DateTime<Utc>>,
    ) -> CoreResult<ReservationRecord>;

    /// `held -> booked`. `NotFound` when absent (or stale), `InvalidState`
    /// when not held.
    async fn confirm_hold(
        &self,
        id: i64,
        stale_before: Option<DateTime<Utc>>,
    ) -> CoreResult<ReservationRecord>;

    /// `held -> free`. Returns the deleted record; `NotFound` unless held.
    async fn release_hold(&self, id: i64) -> CoreResult<ReservationRecord>;

    async fn find_reservation(&self, id: i64) -> CoreResult<Option<ReservationRecord>>;

    /// A user's records, most recently updated first.
    async fn list_for_user(&self, user_id: Uuid) -> CoreResult<Vec<ReservationRecord>>;

    /// Active claims for one booking date. An empty `desk_ids` means all
    /// desks; stale holds are left out.
    async fn active_claims(
        &self,
        booking_date: NaiveDate,
        desk_ids: &[i64],
        stale_before: Option<DateTime<Utc>>,
    ) -> CoreResult<Vec<SlotClaim>>;

    async fn current_hold(
        &self,
        desk_id: i64,
        slot_id: i64,
        booking_date: NaiveDate,
        stale_before: Option<DateTime<Utc>>,
    ) -> CoreResult<Option<ReservationRecord>>;

    /// Delete every hold created before `cutoff`, returning what was removed.
    async fn delete_holds_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> CoreResult<Vec<ReservationRecord>>;
}

/// Repository trait for the read-only desk/slot/pricing catalog.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Desks matching the location and desk-type parts of `filter`.
    async fn list_desks(&self, filter: &AvailabilityFilter) -> CoreResult<Vec<Desk>>;

    /// Active slots; an empty `slot_ids` means every active slot.
    async fn list_active_slots(&self, slot_ids: &[i64]) -> CoreResult<Vec<SlotDefinition>>;

    async fn list_active_prices(&self) -> CoreResult<Vec<DeskPrice>>;

    async fn find_desk(&self, desk_id: i64) -> CoreResult<Option<Desk>>;

    async fn find_slot(&self, slot_id: i64) -> CoreResult<Option<SlotDefinition>>;
}
