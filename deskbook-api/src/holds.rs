use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{Local, NaiveDate};
use deskbook_booking::HoldStatus;
use deskbook_core::HoldRequest;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct HoldDeskRequest {
    pub user_id: Uuid,
    pub desk_id: i64,
    pub slot_id: i64,
    #[serde(default)]
    pub booking_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReleaseHoldRequest {
    pub booking_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct HoldStatusQuery {
    #[serde(default)]
    pub booking_date: Option<String>,
}

/// `YYYY-MM-DD`, or today when absent or blank.
pub(crate) fn booking_date_or_today(raw: Option<&str>) -> Result<NaiveDate, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(Local::now().date_naive()),
        Some(value) => NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
            AppError::ValidationError(format!("Invalid booking_date (expected YYYY-MM-DD): {}", value))
        }),
    }
}

pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::ValidationError(rejection.body_text()))
}

pub async fn hold_desk(
    State(state): State<AppState>,
    payload: Result<Json<HoldDeskRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let req = json_body(payload)?;
    let booking_date = booking_date_or_today(req.booking_date.as_deref())?;
    let request = HoldRequest::new(req.user_id, req.desk_id, req.slot_id, booking_date)?;

    let booking = state.reservations.hold(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Desk put on hold successfully",
            "booking": booking,
        })),
    ))
}

pub async fn release_hold(
    State(state): State<AppState>,
    Path(booking_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    release(&state, booking_id).await
}

/// Same as [`release_hold`] with the id in a JSON body.
pub async fn release_hold_by_body(
    State(state): State<AppState>,
    payload: Result<Json<ReleaseHoldRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let req = json_body(payload)?;
    release(&state, req.booking_id).await
}

async fn release(state: &AppState, booking_id: i64) -> Result<Json<serde_json::Value>, AppError> {
    let released = state.reservations.release(booking_id).await?;
    Ok(Json(json!({
        "message": "Hold released successfully",
        "booking_id": released.id,
    })))
}

pub async fn hold_status(
    State(state): State<AppState>,
    Path((desk_id, slot_id)): Path<(i64, i64)>,
    Query(query): Query<HoldStatusQuery>,
) -> Result<Json<HoldStatus>, AppError> {
    let booking_date = booking_date_or_today(query.booking_date.as_deref())?;
    let status = state.reservations.hold_status(desk_id, slot_id, booking_date).await?;
    Ok(Json(status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_date_parsing() {
        assert_eq!(
            booking_date_or_today(Some("2024-03-20")).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 20).unwrap()
        );
        assert_eq!(booking_date_or_today(Some("  ")).unwrap(), Local::now().date_naive());
        assert!(matches!(
            booking_date_or_today(Some("03/20/2024")),
            Err(AppError::ValidationError(_))
        ));
    }
}
