use async_trait::async_trait;
use chrono::NaiveTime;
use deskbook_core::repository::CatalogRepository;
use deskbook_core::{AvailabilityFilter, CoreResult, Desk, DeskPrice, SlotDefinition};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::map_db_error;

pub struct PgCatalogRepository {
    pool: PgPool,
}

impl PgCatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct DeskRow {
    id: i64,
    name: String,
    floor_number: Option<i32>,
    capacity: Option<i32>,
    description: Option<String>,
    desk_type_id: Option<i64>,
    status: Option<String>,
    rating: Option<f64>,
    location_id: Option<Uuid>,
    building_name: Option<String>,
    building_address: Option<String>,
    amenities: Option<Value>,
    operating_hours: Option<Value>,
    city: Option<String>,
}

impl From<DeskRow> for Desk {
    fn from(row: DeskRow) -> Self {
        Desk {
            id: row.id,
            name: row.name,
            floor_number: row.floor_number,
            capacity: row.capacity,
            description: row.description,
            desk_type_id: row.desk_type_id,
            status: row.status,
            rating: row.rating,
            location_id: row.location_id,
            building_name: row.building_name,
            building_address: row.building_address,
            amenities: row.amenities,
            operating_hours: row.operating_hours,
            city: row.city,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SlotRow {
    id: i64,
    slot_type: String,
    start_time: NaiveTime,
    end_time: NaiveTime,
    time_zone: Option<String>,
    is_active: bool,
}

impl From<SlotRow> for SlotDefinition {
    fn from(row: SlotRow) -> Self {
        SlotDefinition {
            id: row.id,
            slot_type: row.slot_type,
            start_time: row.start_time,
            end_time: row.end_time,
            time_zone: row.time_zone,
            is_active: row.is_active,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PriceRow {
    desk_type_id: i64,
    slot_id: i64,
    price: f64,
}

#[async_trait]
impl CatalogRepository for PgCatalogRepository {
    async fn list_desks(&self, filter: &AvailabilityFilter) -> CoreResult<Vec<Desk>> {
        let rows: Vec<DeskRow> = sqlx::query_as(
            r#"
            SELECT d.id, d.name, d.floor_number, d.capacity, d.description, d.desk_type_id, d.status,
                   d.rating::FLOAT8 AS rating, b.location_id, b.name AS building_name,
                   b.address AS building_address, b.amenities, b.operating_hours, l.city
            FROM desks d
            LEFT JOIN buildings b ON b.id = d.building_id
            LEFT JOIN locations l ON l.id = b.location_id
            WHERE (cardinality($1::uuid[]) = 0 OR b.location_id = ANY($1))
              AND (cardinality($2::bigint[]) = 0 OR d.desk_type_id = ANY($2))
            ORDER BY d.id
            "#,
        )
        .bind(&filter.location_ids)
        .bind(&filter.desk_type_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(rows.into_iter().map(Desk::from).collect())
    }

    async fn list_active_slots(&self, slot_ids: &[i64]) -> CoreResult<Vec<SlotDefinition>> {
        let rows: Vec<SlotRow> = sqlx::query_as(
            r#"
            SELECT id, slot_type, start_time, end_time, time_zone, is_active
            FROM slot_master
            WHERE is_active AND (cardinality($1::bigint[]) = 0 OR id = ANY($1))
            ORDER BY id
            "#,
        )
        .bind(slot_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(rows.into_iter().map(SlotDefinition::from).collect())
    }

    async fn list_active_prices(&self) -> CoreResult<Vec<DeskPrice>> {
        let rows: Vec<PriceRow> = sqlx::query_as(
            "SELECT desk_type_id, slot_id, price::FLOAT8 AS price FROM desk_pricing WHERE is_active",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(rows
            .into_iter()
            .map(|row| DeskPrice {
                desk_type_id: row.desk_type_id,
                slot_id: row.slot_id,
                price: row.price,
            })
            .collect())
    }

    async fn find_desk(&self, desk_id: i64) -> CoreResult<Option<Desk>> {
        let row: Option<DeskRow> = sqlx::query_as(
            r#"
            SELECT d.id, d.name, d.floor_number, d.capacity, d.description, d.desk_type_id, d.status,
                   d.rating::FLOAT8 AS rating, b.location_id, b.name AS building_name,
                   b.address AS building_address, b.amenities, b.operating_hours, l.city
            FROM desks d
            LEFT JOIN buildings b ON b.id = d.building_id
            LEFT JOIN locations l ON l.id = b.location_id
            WHERE d.id = $1
            "#,
        )
        .bind(desk_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(row.map(Desk::from))
    }

    async fn find_slot(&self, slot_id: i64) -> CoreResult<Option<SlotDefinition>> {
        let row: Option<SlotRow> = sqlx::query_as(
            "SELECT id, slot_type, start_time, end_time, time_zone, is_active FROM slot_master WHERE id = $1",
        )
        .bind(slot_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(row.map(SlotDefinition::from))
    }
}
