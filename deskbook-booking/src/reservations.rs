use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use deskbook_core::repository::{CatalogRepository, ReservationRepository};
use deskbook_core::{
    BookingDetails, CoreError, CoreResult, HoldPolicy, HoldRequest, NewHold, ReservationRecord,
    ReservationStatus,
};
use deskbook_shared::{ReservationEvent, ReservationEventKind};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::metrics::Metrics;

/// Answer of the hold status lookup.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HoldStatus {
    pub is_held: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub held_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ReservationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<i64>,
}

/// Drives reservations through `free -> held -> booked` and back.
///
/// Atomicity lives in the repository; this service validates input against
/// the catalog, captures the booking context and publishes a
/// [`ReservationEvent`] after every committed transition.
pub struct ReservationService {
    reservations: Arc<dyn ReservationRepository>,
    catalog: Arc<dyn CatalogRepository>,
    events: broadcast::Sender<ReservationEvent>,
    metrics: Arc<Metrics>,
    policy: HoldPolicy,
    origin: Uuid,
}

impl ReservationService {
    pub fn new(
        reservations: Arc<dyn ReservationRepository>,
        catalog: Arc<dyn CatalogRepository>,
        events: broadcast::Sender<ReservationEvent>,
        metrics: Arc<Metrics>,
        policy: HoldPolicy,
    ) -> Self {
        Self {
            reservations,
            catalog,
            events,
            metrics,
            policy,
            origin: Uuid::new_v4(),
        }
    }

    /// Id stamped on events published by this process.
    pub fn origin(&self) -> Uuid {
        self.origin
    }

    pub fn policy(&self) -> HoldPolicy {
        self.policy
    }

    /// `free -> held`.
    pub async fn hold(&self, request: HoldRequest) -> CoreResult<ReservationRecord> {
        let result = self.try_hold(request).await;
        self.observe("hold", &result);

        let record = result?;
        info!(
            "Desk {} slot {} held on {} by {} (booking {})",
            record.desk_id, record.slot_id, record.booking_date, record.user_id, record.id
        );
        self.publish(ReservationEventKind::Held, &record);
        Ok(record)
    }

    async fn try_hold(&self, request: HoldRequest) -> CoreResult<ReservationRecord> {
        let (desk, slot, prices) = tokio::try_join!(
            self.catalog.find_desk(request.desk_id),
            self.catalog.find_slot(request.slot_id),
            self.catalog.list_active_prices(),
        )?;

        let desk = desk.ok_or_else(|| {
            CoreError::Validation(format!("Desk {} does not exist", request.desk_id))
        })?;
        if desk
            .status
            .as_deref()
            .is_some_and(|status| status.eq_ignore_ascii_case("inactive"))
        {
            return Err(CoreError::Validation(format!("Desk {} is not active", desk.id)));
        }

        let slot = slot
            .filter(|slot| slot.is_active)
            .ok_or_else(|| {
                CoreError::Validation(format!("Slot {} does not exist or is inactive", request.slot_id))
            })?;

        let price = desk.desk_type_id.and_then(|type_id| {
            prices
                .iter()
                .filter(|p| p.desk_type_id == type_id && p.slot_id == slot.id)
                .map(|p| p.price)
                .reduce(f64::min)
        });

        let hold = NewHold {
            booking_details: BookingDetails::capture(&desk, &slot, price),
            request,
        };
        self.reservations
            .insert_hold(hold, self.policy.stale_before(Utc::now()))
            .await
    }

    /// `held -> booked`.
    pub async fn confirm(&self, booking_id: i64) -> CoreResult<ReservationRecord> {
        let result = self
            .reservations
            .confirm_hold(booking_id, self.policy.stale_before(Utc::now()))
            .await;
        self.observe("confirm", &result);

        let record = result?;
        info!("Booking {} confirmed for user {}", record.id, record.user_id);
        self.publish(ReservationEventKind::Booked, &record);
        Ok(record)
    }

    /// `held -> free`. The record is deleted.
    pub async fn release(&self, booking_id: i64) -> CoreResult<ReservationRecord> {
        let result = self.reservations.release_hold(booking_id).await;
        self.observe("release", &result);

        let record = result?;
        info!(
            "Hold {} released (desk {} slot {} on {})",
            record.id, record.desk_id, record.slot_id, record.booking_date
        );
        self.publish(ReservationEventKind::Released, &record);
        Ok(record)
    }

    pub async fn user_bookings(&self, user_id: Uuid) -> CoreResult<Vec<ReservationRecord>> {
        self.reservations.list_for_user(user_id).await
    }

    pub async fn hold_status(
        &self,
        desk_id: i64,
        slot_id: i64,
        booking_date: NaiveDate,
    ) -> CoreResult<HoldStatus> {
        let hold = self
            .reservations
            .current_hold(desk_id, slot_id, booking_date, self.policy.stale_before(Utc::now()))
            .await?;

        Ok(match hold {
            Some(record) => HoldStatus {
                is_held: true,
                held_by: Some(record.user_id),
                status: Some(record.status),
                booking_id: Some(record.id),
            },
            None => HoldStatus {
                is_held: false,
                held_by: None,
                status: None,
                booking_id: None,
            },
        })
    }

    /// Delete holds that outlived the TTL. Returns how many were removed.
    pub async fn reap_expired_holds(&self) -> CoreResult<usize> {
        let Some(cutoff) = self.policy.stale_before(Utc::now()) else {
            return Ok(0);
        };

        let expired = self.reservations.delete_holds_created_before(cutoff).await?;
        if !expired.is_empty() {
            info!("Expired {} stale holds", expired.len());
            self.metrics
                .transitions
                .with_label_values(&["expire", "success"])
                .inc_by(expired.len() as u64);
        }
        for record in &expired {
            self.publish(ReservationEventKind::Expired, record);
        }
        Ok(expired.len())
    }

    fn observe<T>(&self, transition: &str, result: &CoreResult<T>) {
        let outcome = match result {
            Ok(_) => "success",
            Err(CoreError::Validation(_)) => "invalid",
            Err(CoreError::Conflict(_)) => "conflict",
            Err(CoreError::NotFound(_)) => "not_found",
            Err(CoreError::InvalidState(_)) => "invalid_state",
            Err(CoreError::StoreUnavailable(_)) | Err(CoreError::Internal(_)) => "error",
        };
        self.metrics.record_transition(transition, outcome);

        match result {
            Err(e @ (CoreError::StoreUnavailable(_) | CoreError::Internal(_))) => {
                error!("{} failed: {}", transition, e)
            }
            Err(e) => warn!("{} rejected: {}", transition, e),
            Ok(_) => {}
        }
    }

    fn publish(&self, kind: ReservationEventKind, record: &ReservationRecord) {
        let event = ReservationEvent::new(
            self.origin,
            kind,
            record.id,
            record.desk_id,
            record.slot_id,
            record.booking_date,
        );
        if self.events.send(event).is_err() {
            debug!("No subscribers for reservation event on booking {}", record.id);
        }
    }
}
