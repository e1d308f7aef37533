//! Slot composition rules.
//!
//! A desk's `full_day` slot and its `morning`/`evening` slots are mutually
//! exclusive: claiming one side makes the other side unavailable. Slot types
//! other than those three pass through untouched.

use crate::desk::SlotKind;
use crate::reservation::ReservationStatus;
use crate::search::{SlotAvailability, SlotStatus};

/// Raw status of one (desk, slot, date) from its reservation records:
/// any `booked` wins over any `held`; no record means `available`.
pub fn raw_slot_status<I>(statuses: I) -> SlotStatus
where
    I: IntoIterator<Item = ReservationStatus>,
{
    statuses
        .into_iter()
        .fold(SlotStatus::Available, |acc, status| match (acc, status) {
            (SlotStatus::Booked, _) | (_, ReservationStatus::Booked) => SlotStatus::Booked,
            (_, ReservationStatus::Held) => SlotStatus::Held,
        })
}

/// Apply the composition rules to one desk's slots in place and return the
/// derived desk-level status.
pub fn compose(slots: &mut [SlotAvailability]) -> SlotStatus {
    let full_day = position_of(slots, SlotKind::FullDay);
    let morning = position_of(slots, SlotKind::Morning);
    let evening = position_of(slots, SlotKind::Evening);

    let full_day_status = status_at(slots, full_day);
    let morning_status = status_at(slots, morning);
    let evening_status = status_at(slots, evening);

    let claimed = |status: Option<SlotStatus>| status.is_some_and(SlotStatus::is_claimed);

    if claimed(full_day_status) {
        for idx in [morning, evening].into_iter().flatten() {
            slots[idx].status = SlotStatus::Unavailable;
        }
    } else if claimed(morning_status) || claimed(evening_status) {
        if let Some(idx) = full_day {
            slots[idx].status = SlotStatus::Unavailable;
        }
    }

    match full_day_status {
        Some(SlotStatus::Booked) => return SlotStatus::Booked,
        Some(SlotStatus::Held) => return SlotStatus::Held,
        _ => {}
    }

    // Only a symmetric claim on both halves propagates to the desk.
    match (morning_status, evening_status) {
        (Some(SlotStatus::Booked), Some(SlotStatus::Booked)) => SlotStatus::Booked,
        (Some(SlotStatus::Held), Some(SlotStatus::Held)) => SlotStatus::Held,
        _ => SlotStatus::Available,
    }
}

fn position_of(slots: &[SlotAvailability], kind: SlotKind) -> Option<usize> {
    slots
        .iter()
        .position(|slot| SlotKind::from_slot_type(&slot.slot_type) == kind)
}

fn status_at(slots: &[SlotAvailability], idx: Option<usize>) -> Option<SlotStatus> {
    idx.and_then(|i| slots.get(i)).map(|slot| slot.status)
}
