use axum::{
    extract::{rejection::JsonRejection, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::holds::json_body;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConfirmBookingRequest {
    pub booking_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct UserBookingsQuery {
    pub user_id: Option<String>,
}

pub async fn confirm_booking(
    State(state): State<AppState>,
    payload: Result<Json<ConfirmBookingRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let req = json_body(payload)?;
    let booking = state.reservations.confirm(req.booking_id).await?;

    Ok(Json(json!({
        "message": "Desk booked successfully",
        "booking": booking,
    })))
}

pub async fn user_bookings(
    State(state): State<AppState>,
    Query(query): Query<UserBookingsQuery>,
) -> Result<Json<Value>, AppError> {
    let raw = query
        .user_id
        .ok_or_else(|| AppError::ValidationError("user_id is required".to_string()))?;
    let user_id = Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::ValidationError(format!("Invalid user_id: {}", raw)))?;

    let bookings = state.reservations.user_bookings(user_id).await?;
    Ok(Json(json!({ "bookings": bookings })))
}
