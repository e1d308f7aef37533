//! Runs against a live Postgres when `DATABASE_URL` is set; otherwise each
//! test returns early.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use deskbook_core::repository::ReservationRepository;
use deskbook_core::{BookingDetails, CoreError, HoldRequest, NewHold};
use deskbook_store::app_config::DatabaseConfig;
use deskbook_store::{DbClient, PgReservationRepository};
use futures_util::future::join_all;
use uuid::Uuid;

async fn connect() -> Option<DbClient> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let db = DbClient::new(&DatabaseConfig {
        url,
        max_connections: 20,
        acquire_timeout_seconds: 10,
        run_migrations: true,
    })
    .await
    .unwrap();
    db.migrate().await.unwrap();
    Some(db)
}

async fn seed(db: &DbClient, desks: usize, slots: usize) -> (Vec<i64>, Vec<i64>) {
    let mut desk_ids = Vec::new();
    for n in 0..desks {
        let (id,): (i64,) = sqlx::query_as("INSERT INTO desks (name) VALUES ($1) RETURNING id")
            .bind(format!("Load desk {}", n))
            .fetch_one(&db.pool)
            .await
            .unwrap();
        desk_ids.push(id);
    }

    let mut slot_ids = Vec::new();
    for _ in 0..slots {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO slot_master (slot_type, start_time, end_time) VALUES ('morning', '09:00', '13:00') RETURNING id",
        )
        .fetch_one(&db.pool)
        .await
        .unwrap();
        slot_ids.push(id);
    }
    (desk_ids, slot_ids)
}

fn new_hold(desk_id: i64, slot_id: i64, booking_date: NaiveDate) -> NewHold {
    NewHold {
        request: HoldRequest::new(Uuid::new_v4(), desk_id, slot_id, booking_date).unwrap(),
        booking_details: BookingDetails {
            desk_name: format!("Load desk {}", desk_id),
            floor_number: None,
            capacity: None,
            building_name: None,
            building_address: None,
            city: None,
            slot_type: "morning".to_string(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
            time_zone: None,
            price: 0.0,
        },
    }
}

#[tokio::test]
async fn test_concurrent_holds_on_distinct_keys_all_succeed() {
    let Some(db) = connect().await else { return };
    let (desk_ids, slot_ids) = seed(&db, 40, 3).await;
    let repo = Arc::new(PgReservationRepository::new(db.pool.clone()));
    let date = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();

    let holds = desk_ids.iter().flat_map(|&desk| slot_ids.iter().map(move |&slot| (desk, slot)));
    let results = join_all(holds.map(|(desk, slot)| {
        let repo = repo.clone();
        tokio::spawn(async move { repo.insert_hold(new_hold(desk, slot, date), None).await })
    }))
    .await;

    let failures: Vec<_> = results
        .into_iter()
        .map(|joined| joined.unwrap())
        .filter_map(Result::err)
        .collect();
    assert!(failures.is_empty(), "free keys were refused: {:?}", failures);
}

#[tokio::test]
async fn test_concurrent_holds_on_one_key_have_one_winner() {
    let Some(db) = connect().await else { return };
    let (desk_ids, slot_ids) = seed(&db, 1, 1).await;
    let repo = Arc::new(PgReservationRepository::new(db.pool.clone()));
    let date = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();

    let results = join_all((0..16).map(|_| {
        let repo = repo.clone();
        let (desk, slot) = (desk_ids[0], slot_ids[0]);
        tokio::spawn(async move { repo.insert_hold(new_hold(desk, slot, date), None).await })
    }))
    .await;

    let outcomes: Vec<_> = results.into_iter().map(|joined| joined.unwrap()).collect();
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, CoreError::Conflict(_))));
}
