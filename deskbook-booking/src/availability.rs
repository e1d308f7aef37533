use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Local, NaiveDate, Utc};
use deskbook_core::composition::{compose, raw_slot_status};
use deskbook_core::repository::{CatalogRepository, ReservationRepository};
use deskbook_core::{
    AvailabilityFilter, AvailabilitySnapshot, CoreResult, Desk, DeskAvailability, DeskPrice,
    HoldPolicy, ReservationStatus, SlotAvailability, SlotClaim, SlotDefinition,
};
use tracing::debug;

use crate::metrics::Metrics;

/// Answers "what is free" for a filter set.
pub struct AvailabilityService {
    catalog: Arc<dyn CatalogRepository>,
    reservations: Arc<dyn ReservationRepository>,
    metrics: Arc<Metrics>,
    policy: HoldPolicy,
}

impl AvailabilityService {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        reservations: Arc<dyn ReservationRepository>,
        metrics: Arc<Metrics>,
        policy: HoldPolicy,
    ) -> Self {
        Self {
            catalog,
            reservations,
            metrics,
            policy,
        }
    }

    pub async fn snapshot(&self, filter: &AvailabilityFilter) -> CoreResult<AvailabilitySnapshot> {
        self.snapshot_at(filter, Local::now().date_naive()).await
    }

    /// Same as [`snapshot`](Self::snapshot) with an explicit "today" for
    /// filters that carry no date.
    pub async fn snapshot_at(
        &self,
        filter: &AvailabilityFilter,
        today: NaiveDate,
    ) -> CoreResult<AvailabilitySnapshot> {
        let _timer = self.metrics.snapshot_seconds.start_timer();
        let booking_date = filter.resolved_date(today);

        let desks = self.catalog.list_desks(filter).await?;
        if desks.is_empty() {
            return Ok(AvailabilitySnapshot {
                booking_date,
                desks: Vec::new(),
            });
        }

        let desk_ids: Vec<i64> = desks.iter().map(|desk| desk.id).collect();
        let stale_before = self.policy.stale_before(Utc::now());

        let (slots, prices, claims) = tokio::try_join!(
            self.catalog.list_active_slots(&filter.slot_type_ids),
            self.catalog.list_active_prices(),
            self.reservations.active_claims(booking_date, &desk_ids, stale_before),
        )?;

        debug!(
            "Assembling availability for {}: {} desks, {} slots, {} claims",
            booking_date,
            desks.len(),
            slots.len(),
            claims.len()
        );

        Ok(AvailabilitySnapshot {
            booking_date,
            desks: assemble(desks, &slots, &prices, &claims),
        })
    }
}

/// Cross every desk with every slot, attach raw statuses and prices, apply
/// the composition rules per desk, and order the result.
pub fn assemble(
    desks: Vec<Desk>,
    slots: &[SlotDefinition],
    prices: &[DeskPrice],
    claims: &[SlotClaim],
) -> Vec<DeskAvailability> {
    let mut price_by_key: HashMap<(i64, i64), f64> = HashMap::new();
    let mut min_price_by_type: HashMap<i64, f64> = HashMap::new();
    for price in prices {
        price_by_key
            .entry((price.desk_type_id, price.slot_id))
            .and_modify(|p| *p = p.min(price.price))
            .or_insert(price.price);
        min_price_by_type
            .entry(price.desk_type_id)
            .and_modify(|p| *p = p.min(price.price))
            .or_insert(price.price);
    }

    let mut claims_by_key: HashMap<(i64, i64), Vec<ReservationStatus>> = HashMap::new();
    for claim in claims {
        claims_by_key
            .entry((claim.desk_id, claim.slot_id))
            .or_default()
            .push(claim.status);
    }

    let mut ranked: Vec<(Option<f64>, DeskAvailability)> = desks
        .into_iter()
        .map(|desk| {
            let mut priced: Vec<(Option<f64>, SlotAvailability)> = slots
                .iter()
                .map(|slot| {
                    let price = desk
                        .desk_type_id
                        .and_then(|type_id| price_by_key.get(&(type_id, slot.id)).copied());
                    let status = raw_slot_status(
                        claims_by_key
                            .get(&(desk.id, slot.id))
                            .into_iter()
                            .flatten()
                            .copied(),
                    );
                    let availability = SlotAvailability {
                        slot_id: slot.id,
                        slot_type: slot.slot_type.clone(),
                        start_time: slot.start_time,
                        end_time: slot.end_time,
                        time_zone: slot.time_zone.clone(),
                        status,
                        price: price.unwrap_or(0.0),
                    };
                    (price, availability)
                })
                .collect();
            priced.sort_by(|(pa, a), (pb, b)| {
                nulls_last(*pa, *pb).then_with(|| a.slot_id.cmp(&b.slot_id))
            });

            let mut desk_slots: Vec<SlotAvailability> =
                priced.into_iter().map(|(_, slot)| slot).collect();
            let desk_status = compose(&mut desk_slots);
            let type_price = desk
                .desk_type_id
                .and_then(|type_id| min_price_by_type.get(&type_id).copied());

            let availability = DeskAvailability {
                desk_id: desk.id,
                desk_name: desk.name,
                floor_number: desk.floor_number,
                capacity: desk.capacity,
                description: desk.description,
                desk_type_id: desk.desk_type_id,
                location_id: desk.location_id,
                desk_status,
                base_status: desk.status,
                rating: desk.rating,
                building_name: desk.building_name,
                building_address: desk.building_address,
                amenities: desk.amenities,
                operating_hours: desk.operating_hours,
                city: desk.city,
                slots: desk_slots,
            };
            (type_price, availability)
        })
        .collect();

    ranked.sort_by(|(pa, a), (pb, b)| {
        let rating_a = a.rating.unwrap_or(0.0);
        let rating_b = b.rating.unwrap_or(0.0);
        rating_b
            .total_cmp(&rating_a)
            .then_with(|| nulls_last(*pa, *pb))
            .then_with(|| a.desk_id.cmp(&b.desk_id))
    });

    ranked.into_iter().map(|(_, desk)| desk).collect()
}

/// Ascending order with missing values after every present one.
fn nulls_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use deskbook_core::SlotStatus;
    use deskbook_store::memory_repo::MemoryStore;
    use uuid::Uuid;

    fn desk(id: i64, desk_type_id: Option<i64>, rating: Option<f64>) -> Desk {
        Desk {
            id,
            name: format!("Desk {}", id),
            floor_number: Some(1),
            capacity: Some(1),
            description: None,
            desk_type_id,
            status: Some("active".to_string()),
            rating,
            location_id: None,
            building_name: Some("HQ".to_string()),
            building_address: None,
            amenities: None,
            operating_hours: None,
            city: Some("Pune".to_string()),
        }
    }

    fn slot(id: i64, slot_type: &str) -> SlotDefinition {
        SlotDefinition {
            id,
            slot_type: slot_type.to_string(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            time_zone: Some("Asia/Kolkata".to_string()),
            is_active: true,
        }
    }

    fn price(desk_type_id: i64, slot_id: i64, price: f64) -> DeskPrice {
        DeskPrice {
            desk_type_id,
            slot_id,
            price,
        }
    }

    fn standard_slots() -> Vec<SlotDefinition> {
        vec![slot(1, "morning"), slot(2, "evening"), slot(3, "full_day")]
    }

    #[test]
    fn test_full_day_claim_composes_per_desk() {
        let claims = vec![SlotClaim {
            desk_id: 20,
            slot_id: 3,
            status: ReservationStatus::Held,
        }];
        let desks = assemble(
            vec![desk(20, Some(1), None), desk(21, Some(1), None)],
            &standard_slots(),
            &[],
            &claims,
        );

        let held = desks.iter().find(|d| d.desk_id == 20).unwrap();
        assert_eq!(held.desk_status, SlotStatus::Held);
        for s in &held.slots {
            let expected = if s.slot_id == 3 { SlotStatus::Held } else { SlotStatus::Unavailable };
            assert_eq!(s.status, expected);
        }

        let free = desks.iter().find(|d| d.desk_id == 21).unwrap();
        assert_eq!(free.desk_status, SlotStatus::Available);
        assert!(free.slots.iter().all(|s| s.status == SlotStatus::Available));
    }

    #[test]
    fn test_slots_ordered_by_price_nulls_last() {
        let prices = vec![price(1, 3, 500.0), price(1, 1, 300.0)];
        let desks = assemble(vec![desk(1, Some(1), None)], &standard_slots(), &prices, &[]);

        let order: Vec<i64> = desks[0].slots.iter().map(|s| s.slot_id).collect();
        assert_eq!(order, vec![1, 3, 2]);
        assert_eq!(desks[0].slots[2].price, 0.0);
    }

    #[test]
    fn test_desks_ordered_by_rating_then_type_price_then_id() {
        let prices = vec![price(1, 1, 300.0), price(2, 1, 100.0)];
        let desks = assemble(
            vec![
                desk(5, Some(1), Some(4.0)),
                desk(4, Some(2), Some(4.0)),
                desk(3, None, Some(4.0)),
                desk(2, Some(1), None),
                desk(1, Some(1), Some(4.5)),
                desk(6, Some(1), Some(4.0)),
            ],
            &[slot(1, "morning")],
            &prices,
            &[],
        );

        let order: Vec<i64> = desks.iter().map(|d| d.desk_id).collect();
        assert_eq!(order, vec![1, 4, 5, 6, 3, 2]);
    }

    #[test]
    fn test_booked_wins_over_held_for_same_slot() {
        let claims = vec![
            SlotClaim { desk_id: 1, slot_id: 1, status: ReservationStatus::Held },
            SlotClaim { desk_id: 1, slot_id: 1, status: ReservationStatus::Booked },
        ];
        let desks = assemble(vec![desk(1, None, None)], &[slot(1, "morning")], &[], &claims);
        assert_eq!(desks[0].slots[0].status, SlotStatus::Booked);
    }

    fn service(store: &Arc<MemoryStore>) -> AvailabilityService {
        AvailabilityService::new(
            store.clone(),
            store.clone(),
            Arc::new(Metrics::new().unwrap()),
            HoldPolicy::from_ttl_seconds(180),
        )
    }

    #[tokio::test]
    async fn test_snapshot_without_matching_desks_is_empty() {
        let store = Arc::new(MemoryStore::new());
        store.add_desk(desk(1, Some(1), None)).await;
        store.add_slot(slot(1, "morning")).await;

        let filter = AvailabilityFilter {
            location_ids: vec![Uuid::new_v4()],
            ..AvailabilityFilter::default()
        };
        let today = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
        let snapshot = service(&store).snapshot_at(&filter, today).await.unwrap();

        assert_eq!(snapshot.booking_date, today);
        assert!(snapshot.desks.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_applies_slot_filter() {
        let store = Arc::new(MemoryStore::new());
        store.add_desk(desk(1, Some(1), None)).await;
        for s in standard_slots() {
            store.add_slot(s).await;
        }

        let filter = AvailabilityFilter {
            slot_type_ids: vec![3],
            ..AvailabilityFilter::default()
        };
        let today = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
        let snapshot = service(&store).snapshot_at(&filter, today).await.unwrap();

        assert_eq!(snapshot.desks.len(), 1);
        let ids: Vec<i64> = snapshot.desks[0].slots.iter().map(|s| s.slot_id).collect();
        assert_eq!(ids, vec![3]);
    }
}
