use axum::{extract::State, Json};
use axum_extra::extract::{Query, QueryRejection};
use deskbook_core::{FilterPayload, IdValue};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::state::AppState;

/// Id lists may repeat the parameter, comma-join values, or both:
/// `?desk_type_ids=1&desk_type_ids=2,3`.
#[derive(Debug, Default, Deserialize)]
pub struct DesksQuery {
    #[serde(default)]
    pub location_ids: Vec<String>,
    #[serde(default)]
    pub desk_type_ids: Vec<String>,
    #[serde(default)]
    pub slot_type_ids: Vec<String>,
    #[serde(default)]
    pub booking_date: Option<String>,
}

impl From<DesksQuery> for FilterPayload {
    fn from(query: DesksQuery) -> Self {
        let ids = |values: Vec<String>| Some(values.into_iter().map(IdValue::Text).collect());
        FilterPayload {
            location_ids: ids(query.location_ids),
            desk_type_ids: ids(query.desk_type_ids),
            slot_type_ids: ids(query.slot_type_ids),
            booking_date: query.booking_date,
        }
    }
}

pub async fn list_desks(
    State(state): State<AppState>,
    query: Result<Query<DesksQuery>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let Query(query) = query.map_err(|e| AppError::ValidationError(e.to_string()))?;
    let filter = FilterPayload::from(query).validate()?;

    let snapshot = state.availability.snapshot(&filter).await?;
    Ok(Json(json!({ "desks": snapshot.desks })))
}
