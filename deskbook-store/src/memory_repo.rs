//! In-process implementation of both repositories.
//!
//! Every operation runs under one async mutex, which gives `insert_hold` the
//! same check-then-insert atomicity the Postgres transaction provides. Used
//! by tests and for running the API without a database.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use deskbook_core::repository::{CatalogRepository, ReservationRepository};
use deskbook_core::{
    AvailabilityFilter, CoreError, CoreResult, Desk, DeskPrice, NewHold, ReservationRecord,
    ReservationStatus, SlotClaim, SlotDefinition,
};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct State {
    desks: BTreeMap<i64, Desk>,
    slots: BTreeMap<i64, SlotDefinition>,
    prices: Vec<DeskPrice>,
    reservations: BTreeMap<i64, ReservationRecord>,
    next_id: i64,
}

impl State {
    /// Whether `record` is an active claim on the (desk, slot, date) key.
    fn claims_key(
        record: &ReservationRecord,
        desk_id: i64,
        slot_id: i64,
        booking_date: NaiveDate,
    ) -> bool {
        matches!(record.status, ReservationStatus::Held | ReservationStatus::Booked)
            && record.desk_id == desk_id
            && record.slot_id == slot_id
            && record.booking_date == booking_date
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_desk(&self, desk: Desk) {
        self.state.lock().await.desks.insert(desk.id, desk);
    }

    pub async fn add_slot(&self, slot: SlotDefinition) {
        self.state.lock().await.slots.insert(slot.id, slot);
    }

    pub async fn add_price(&self, price: DeskPrice) {
        self.state.lock().await.prices.push(price);
    }

    /// Rewrite a record's creation time, e.g. to age a hold past its TTL.
    /// Returns `false` when no such record exists.
    pub async fn set_created_at(&self, id: i64, created_at: DateTime<Utc>) -> bool {
        match self.state.lock().await.reservations.get_mut(&id) {
            Some(record) => {
                record.created_at = created_at;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl ReservationRepository for MemoryStore {
    async fn insert_hold(
        &self,
        hold: NewHold,
        stale_before: Option<DateTime<Utc>>,
    ) -> CoreResult<ReservationRecord> {
        let mut state = self.state.lock().await;
        let request = hold.request;

        state.reservations.retain(|_, record| {
            !(State::claims_key(record, request.desk_id, request.slot_id, request.booking_date)
                && record.is_stale(stale_before))
        });

        let taken = state.reservations.values().any(|record| {
            State::claims_key(record, request.desk_id, request.slot_id, request.booking_date)
        });
        if taken {
            return Err(CoreError::Conflict(
                "Desk is already booked or held for this slot".to_string(),
            ));
        }

        state.next_id += 1;
        let now = Utc::now();
        let record = ReservationRecord {
            id: state.next_id,
            user_id: request.user_id,
            desk_id: request.desk_id,
            slot_id: request.slot_id,
            booking_date: request.booking_date,
            status: ReservationStatus::Held,
            booking_details: Some(hold.booking_details),
            created_at: now,
            updated_at: now,
        };
        state.reservations.insert(record.id, record.clone());
        Ok(record)
    }

    async fn confirm_hold(
        &self,
        id: i64,
        stale_before: Option<DateTime<Utc>>,
    ) -> CoreResult<ReservationRecord> {
        let mut state = self.state.lock().await;
        let record = state
            .reservations
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("Booking {} not found", id)))?;

        if record.is_stale(stale_before) {
            return Err(CoreError::NotFound(format!("Hold {} has expired", id)));
        }
        record.ensure_confirmable()?;

        record.status = ReservationStatus::Booked;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn release_hold(&self, id: i64) -> CoreResult<ReservationRecord> {
        let mut state = self.state.lock().await;
        let held = state
            .reservations
            .get(&id)
            .is_some_and(|record| record.ensure_releasable().is_ok());
        if !held {
            return Err(CoreError::NotFound(format!("No held booking with id {}", id)));
        }

        state
            .reservations
            .remove(&id)
            .ok_or_else(|| CoreError::NotFound(format!("No held booking with id {}", id)))
    }

    async fn find_reservation(&self, id: i64) -> CoreResult<Option<ReservationRecord>> {
        Ok(self.state.lock().await.reservations.get(&id).cloned())
    }

    async fn list_for_user(&self, user_id: Uuid) -> CoreResult<Vec<ReservationRecord>> {
        let state = self.state.lock().await;
        let mut records: Vec<ReservationRecord> = state
            .reservations
            .values()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        Ok(records)
    }

    async fn active_claims(
        &self,
        booking_date: NaiveDate,
        desk_ids: &[i64],
        stale_before: Option<DateTime<Utc>>,
    ) -> CoreResult<Vec<SlotClaim>> {
        let state = self.state.lock().await;
        Ok(state
            .reservations
            .values()
            .filter(|record| record.booking_date == booking_date)
            .filter(|record| desk_ids.is_empty() || desk_ids.contains(&record.desk_id))
            .filter(|record| !record.is_stale(stale_before))
            .map(|record| SlotClaim {
                desk_id: record.desk_id,
                slot_id: record.slot_id,
                status: record.status,
            })
            .collect())
    }

    async fn current_hold(
        &self,
        desk_id: i64,
        slot_id: i64,
        booking_date: NaiveDate,
        stale_before: Option<DateTime<Utc>>,
    ) -> CoreResult<Option<ReservationRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .reservations
            .values()
            .filter(|record| State::claims_key(record, desk_id, slot_id, booking_date))
            .filter(|record| record.status == ReservationStatus::Held && !record.is_stale(stale_before))
            .max_by_key(|record| record.created_at)
            .cloned())
    }

    async fn delete_holds_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> CoreResult<Vec<ReservationRecord>> {
        let mut state = self.state.lock().await;
        let expired: Vec<i64> = state
            .reservations
            .values()
            .filter(|record| record.is_stale(Some(cutoff)))
            .map(|record| record.id)
            .collect();

        Ok(expired
            .into_iter()
            .filter_map(|id| state.reservations.remove(&id))
            .collect())
    }
}

#[async_trait]
impl CatalogRepository for MemoryStore {
    async fn list_desks(&self, filter: &AvailabilityFilter) -> CoreResult<Vec<Desk>> {
        let state = self.state.lock().await;
        Ok(state
            .desks
            .values()
            .filter(|desk| filter.matches_desk(desk))
            .cloned()
            .collect())
    }

    async fn list_active_slots(&self, slot_ids: &[i64]) -> CoreResult<Vec<SlotDefinition>> {
        let state = self.state.lock().await;
        Ok(state
            .slots
            .values()
            .filter(|slot| slot.is_active)
            .filter(|slot| slot_ids.is_empty() || slot_ids.contains(&slot.id))
            .cloned()
            .collect())
    }

    async fn list_active_prices(&self) -> CoreResult<Vec<DeskPrice>> {
        Ok(self.state.lock().await.prices.clone())
    }

    async fn find_desk(&self, desk_id: i64) -> CoreResult<Option<Desk>> {
        Ok(self.state.lock().await.desks.get(&desk_id).cloned())
    }

    async fn find_slot(&self, slot_id: i64) -> CoreResult<Option<SlotDefinition>> {
        Ok(self.state.lock().await.slots.get(&slot_id).cloned())
    }
}
