use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::NaiveTime;
use deskbook_api::{app, AppState};
use deskbook_core::{Desk, DeskPrice, SlotDefinition};
use deskbook_store::app_config::{BroadcastConfig, BusinessRules};
use deskbook_store::MemoryStore;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tower::ServiceExt;
use uuid::Uuid;

async fn seeded_app() -> Router {
    let store = Arc::new(MemoryStore::new());
    for (id, rating) in [(20, Some(4.8)), (21, None)] {
        store
            .add_desk(Desk {
                id,
                name: format!("Desk {}", id),
                floor_number: Some(2),
                capacity: Some(1),
                description: None,
                desk_type_id: Some(1),
                status: Some("active".to_string()),
                rating,
                location_id: None,
                building_name: Some("Tower A".to_string()),
                building_address: None,
                amenities: Some(json!(["monitor", "locker"])),
                operating_hours: None,
                city: Some("Pune".to_string()),
            })
            .await;
    }
    for (id, slot_type, start, end) in [(1, "morning", 9, 13), (2, "evening", 14, 18), (3, "full_day", 9, 18)] {
        store
            .add_slot(SlotDefinition {
                id,
                slot_type: slot_type.to_string(),
                start_time: NaiveTime::from_hms_opt(start, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(end, 0, 0).unwrap(),
                time_zone: Some("Asia/Kolkata".to_string()),
                is_active: true,
            })
            .await;
    }
    store.add_price(DeskPrice { desk_type_id: 1, slot_id: 3, price: 450.0 }).await;

    let (events, _) = broadcast::channel(64);
    let state = AppState::new(
        store.clone(),
        store,
        events,
        &BusinessRules::default(),
        &BroadcastConfig::default(),
    )
    .unwrap();
    app(state)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn hold_body(user_id: Uuid, desk_id: i64, slot_id: i64) -> Value {
    json!({
        "user_id": user_id,
        "desk_id": desk_id,
        "slot_id": slot_id,
        "booking_date": "2024-03-20",
    })
}

#[tokio::test]
async fn test_hold_conflict_confirm_and_availability() {
    let app = seeded_app().await;

    let (status, held) = send(&app, "POST", "/api/desks/hold", Some(hold_body(Uuid::new_v4(), 20, 3))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(held["booking"]["status"], "held");
    assert_eq!(held["booking"]["booking_details"]["price"], 450.0);
    let booking_id = held["booking"]["id"].as_i64().unwrap();

    let (status, conflict) = send(&app, "POST", "/api/desks/hold", Some(hold_body(Uuid::new_v4(), 20, 3))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["status_code"], 409);

    let (status, confirmed) =
        send(&app, "POST", "/api/desks/confirm", Some(json!({ "booking_id": booking_id }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(confirmed["booking"]["status"], "booked");

    let (status, listing) = send(&app, "GET", "/api/desks?booking_date=2024-03-20", None).await;
    assert_eq!(status, StatusCode::OK);
    let desks = listing["desks"].as_array().unwrap();
    assert_eq!(desks[0]["desk_id"], 20);
    assert_eq!(desks[0]["desk_status"], "booked");
    let slots = desks[0]["slots"].as_array().unwrap();
    let full_day = slots.iter().find(|s| s["slot_id"] == 3).unwrap();
    assert_eq!(full_day["status"], "booked");
    let morning = slots.iter().find(|s| s["slot_id"] == 1).unwrap();
    assert_eq!(morning["status"], "unavailable");
    assert_eq!(desks[1]["desk_status"], "available");

    let (status, _) = send(&app, "DELETE", &format!("/api/desks/hold/{}", booking_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "POST", "/api/desks/confirm", Some(json!({ "booking_id": booking_id }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_release_by_body_then_rehold() {
    let app = seeded_app().await;

    let (_, held) = send(&app, "POST", "/api/desks/hold", Some(hold_body(Uuid::new_v4(), 21, 1))).await;
    let booking_id = held["booking"]["id"].as_i64().unwrap();

    let (status, released) =
        send(&app, "DELETE", "/api/desks/hold", Some(json!({ "booking_id": booking_id }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(released["booking_id"], booking_id);

    let (status, _) = send(&app, "POST", "/api/desks/hold", Some(hold_body(Uuid::new_v4(), 21, 1))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(&app, "DELETE", "/api/desks/hold/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_filters_and_validation() {
    let app = seeded_app().await;

    let uri = format!("/api/desks?location_ids={}", Uuid::new_v4());
    let (status, listing) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing, json!({ "desks": [] }));

    let (status, listing) =
        send(&app, "GET", "/api/desks?slot_type_ids=1&slot_type_ids=2&booking_date=2024-03-20", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["desks"][0]["slots"].as_array().unwrap().len(), 2);

    let (status, error) = send(&app, "GET", "/api/desks?booking_date=tomorrow", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["status_code"], 400);

    let (status, _) = send(&app, "POST", "/api/desks/hold", Some(json!({ "desk_id": 20 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "POST", "/api/desks/hold", Some(hold_body(Uuid::new_v4(), 404, 1))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_user_bookings_and_hold_status() {
    let app = seeded_app().await;
    let user = Uuid::new_v4();

    let (_, held) = send(&app, "POST", "/api/desks/hold", Some(hold_body(user, 20, 2))).await;
    let booking_id = held["booking"]["id"].as_i64().unwrap();

    let (status, hold) = send(&app, "GET", "/api/hold/status/20/2?booking_date=2024-03-20", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(hold["is_held"], true);
    assert_eq!(hold["held_by"], user.to_string());
    assert_eq!(hold["booking_id"], booking_id);

    let (_, free) = send(&app, "GET", "/api/hold/status/20/1?booking_date=2024-03-20", None).await;
    assert_eq!(free["is_held"], false);

    let (status, bookings) = send(&app, "GET", &format!("/api/desks/user-bookings?user_id={}", user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bookings["bookings"].as_array().unwrap().len(), 1);

    let (status, _) = send(&app, "GET", "/api/desks/user-bookings", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_and_metrics() {
    let app = seeded_app().await;
    send(&app, "POST", "/api/desks/hold", Some(hold_body(Uuid::new_v4(), 20, 1))).await;

    let (status, _) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("deskbook_reservation_transitions_total"));
}
