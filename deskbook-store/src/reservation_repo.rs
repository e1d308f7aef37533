use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use deskbook_core::repository::ReservationRepository;
use deskbook_core::{
    BookingDetails, CoreError, CoreResult, NewHold, ReservationRecord, ReservationStatus, SlotClaim,
};
use serde_json::Value;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::database::map_db_error;

/// Postgres-backed reservations.
///
/// The `uniq_active_claim` partial index arbitrates racing holds: the insert
/// skips on conflict, and an empty `RETURNING` means the key is taken.
pub struct PgReservationRepository {
    pool: PgPool,
}

impl PgReservationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: i64,
    user_id: Uuid,
    desk_id: i64,
    slot_id: i64,
    booking_date: NaiveDate,
    status: String,
    booking_details: Option<Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReservationRow> for ReservationRecord {
    type Error = CoreError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        let booking_details = row.booking_details.and_then(|raw| {
            serde_json::from_value::<BookingDetails>(raw)
                .map_err(|e| warn!("Unreadable booking_details on booking {}: {}", row.id, e))
                .ok()
        });

        Ok(ReservationRecord {
            id: row.id,
            user_id: row.user_id,
            desk_id: row.desk_id,
            slot_id: row.slot_id,
            booking_date: row.booking_date,
            status: row.status.parse()?,
            booking_details,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl ReservationRepository for PgReservationRepository {
    async fn insert_hold(
        &self,
        hold: NewHold,
        stale_before: Option<DateTime<Utc>>,
    ) -> CoreResult<ReservationRecord> {
        let request = &hold.request;
        let details = serde_json::to_value(&hold.booking_details)
            .map_err(|e| CoreError::Internal(format!("Failed to encode booking details: {}", e)))?;

        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        if let Some(cutoff) = stale_before {
            sqlx::query(
                r#"
                DELETE FROM booking_transactions
                WHERE desk_id = $1 AND slot_id = $2 AND booking_date = $3
                  AND status = 'held' AND created_at < $4
                "#,
            )
            .bind(request.desk_id)
            .bind(request.slot_id)
            .bind(request.booking_date)
            .bind(cutoff)
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;
        }

        let row: Option<ReservationRow> = sqlx::query_as(
            r#"
            INSERT INTO booking_transactions (user_id, desk_id, slot_id, booking_date, status, booking_details)
            VALUES ($1, $2, $3, $4, 'held', $5)
            ON CONFLICT (desk_id, slot_id, booking_date) WHERE status IN ('held', 'booked') DO NOTHING
            RETURNING id, user_id, desk_id, slot_id, booking_date, status, booking_details, created_at, updated_at
            "#,
        )
        .bind(request.user_id)
        .bind(request.desk_id)
        .bind(request.slot_id)
        .bind(request.booking_date)
        .bind(details)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_db_error)?;

        let Some(row) = row else {
            // Dropping `tx` rolls back the stale-hold cleanup too.
            return Err(CoreError::Conflict(
                "Desk is already booked or held for this slot".to_string(),
            ));
        };

        tx.commit().await.map_err(map_db_error)?;
        row.try_into()
    }

    async fn confirm_hold(
        &self,
        id: i64,
        stale_before: Option<DateTime<Utc>>,
    ) -> CoreResult<ReservationRecord> {
        let updated: Option<ReservationRow> = sqlx::query_as(
            r#"
            UPDATE booking_transactions
            SET status = 'booked', updated_at = NOW()
            WHERE id = $1 AND status = 'held'
              AND ($2::timestamptz IS NULL OR created_at >= $2)
            RETURNING id, user_id, desk_id, slot_id, booking_date, status, booking_details, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(stale_before)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        if let Some(row) = updated {
            return row.try_into();
        }

        // Nothing flipped: work out why.
        match self.find_reservation(id).await? {
            None => Err(CoreError::NotFound(format!("Booking {} not found", id))),
            Some(record) if record.is_stale(stale_before) => {
                Err(CoreError::NotFound(format!("Hold {} has expired", id)))
            }
            Some(record) => {
                record.ensure_confirmable()?;
                Err(CoreError::Conflict(format!("Booking {} changed concurrently", id)))
            }
        }
    }

    async fn release_hold(&self, id: i64) -> CoreResult<ReservationRecord> {
        let deleted: Option<ReservationRow> = sqlx::query_as(
            r#"
            DELETE FROM booking_transactions
            WHERE id = $1 AND status = 'held'
            RETURNING id, user_id, desk_id, slot_id, booking_date, status, booking_details, created_at, updated_at
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        deleted
            .ok_or_else(|| CoreError::NotFound(format!("No held booking with id {}", id)))?
            .try_into()
    }

    async fn find_reservation(&self, id: i64) -> CoreResult<Option<ReservationRecord>> {
        let row: Option<ReservationRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, desk_id, slot_id, booking_date, status, booking_details, created_at, updated_at
            FROM booking_transactions WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        row.map(ReservationRecord::try_from).transpose()
    }

    async fn list_for_user(&self, user_id: Uuid) -> CoreResult<Vec<ReservationRecord>> {
        let rows: Vec<ReservationRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, desk_id, slot_id, booking_date, status, booking_details, created_at, updated_at
            FROM booking_transactions
            WHERE user_id = $1
            ORDER BY updated_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        rows.into_iter().map(ReservationRecord::try_from).collect()
    }

    async fn active_claims(
        &self,
        booking_date: NaiveDate,
        desk_ids: &[i64],
        stale_before: Option<DateTime<Utc>>,
    ) -> CoreResult<Vec<SlotClaim>> {
        let rows: Vec<(i64, i64, String)> = sqlx::query_as(
            r#"
            SELECT desk_id, slot_id, status
            FROM booking_transactions
            WHERE booking_date = $1
              AND status IN ('held', 'booked')
              AND (cardinality($2::bigint[]) = 0 OR desk_id = ANY($2))
              AND (status = 'booked' OR $3::timestamptz IS NULL OR created_at >= $3)
            "#,
        )
        .bind(booking_date)
        .bind(desk_ids)
        .bind(stale_before)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        rows.into_iter()
            .map(|(desk_id, slot_id, status)| -> CoreResult<SlotClaim> {
                Ok(SlotClaim {
                    desk_id,
                    slot_id,
                    status: status.parse::<ReservationStatus>()?,
                })
            })
            .collect()
    }

    async fn current_hold(
        &self,
        desk_id: i64,
        slot_id: i64,
        booking_date: NaiveDate,
        stale_before: Option<DateTime<Utc>>,
    ) -> CoreResult<Option<ReservationRecord>> {
        let row: Option<ReservationRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, desk_id, slot_id, booking_date, status, booking_details, created_at, updated_at
            FROM booking_transactions
            WHERE desk_id = $1 AND slot_id = $2 AND booking_date = $3
              AND status = 'held'
              AND ($4::timestamptz IS NULL OR created_at >= $4)
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(desk_id)
        .bind(slot_id)
        .bind(booking_date)
        .bind(stale_before)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        row.map(ReservationRecord::try_from).transpose()
    }

    async fn delete_holds_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> CoreResult<Vec<ReservationRecord>> {
        let rows: Vec<ReservationRow> = sqlx::query_as(
            r#"
            DELETE FROM booking_transactions
            WHERE status = 'held' AND created_at < $1
            RETURNING id, user_id, desk_id, slot_id, booking_date, status, booking_details, created_at, updated_at
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        rows.into_iter().map(ReservationRecord::try_from).collect()
    }
}
