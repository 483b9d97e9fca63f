use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{BookingIdentity, Slot};
use crate::error::{AppError, AppResult};

// ============================================================================
// Slot Repository
// ============================================================================

pub struct SlotRepository;

impl SlotRepository {
    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<Slot>> {
        let slot = sqlx::query_as::<_, Slot>(
            r#"
            SELECT
                id, date, time, is_booked,
                booked_name, booked_email, booked_user_id,
                time_zone, booked_at, created_at, updated_at
            FROM slots
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(slot)
    }

    /// Unbooked slots ordered by (date, time) ascending, optionally limited
    /// to an inclusive `[from, to]` date window.
    pub async fn list_available(
        pool: &SqlitePool,
        window: Option<(&str, &str)>,
    ) -> AppResult<Vec<Slot>> {
        let slots = match window {
            Some((from, to)) => {
                sqlx::query_as::<_, Slot>(
                    r#"
                    SELECT
                        id, date, time, is_booked,
                        booked_name, booked_email, booked_user_id,
                        time_zone, booked_at, created_at, updated_at
                    FROM slots
                    WHERE is_booked = 0 AND date >= ? AND date <= ?
                    ORDER BY date ASC, time ASC
                    "#,
                )
                .bind(from)
                .bind(to)
                .fetch_all(pool)
                .await
            }
            None => {
                sqlx::query_as::<_, Slot>(
                    r#"
                    SELECT
                        id, date, time, is_booked,
                        booked_name, booked_email, booked_user_id,
                        time_zone, booked_at, created_at, updated_at
                    FROM slots
                    WHERE is_booked = 0
                    ORDER BY date ASC, time ASC
                    "#,
                )
                .fetch_all(pool)
                .await
            }
        }
        .map_err(AppError::Database)?;

        Ok(slots)
    }

    /// Sorted distinct dates with at least one free slot in `[from, to]`.
    /// Dates are `YYYY-MM-DD` strings, so lexicographic order is chronological.
    pub async fn distinct_available_dates(
        pool: &SqlitePool,
        from: &str,
        to: &str,
    ) -> AppResult<Vec<String>> {
        let rows = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT date
            FROM slots
            WHERE is_booked = 0 AND date >= ? AND date <= ?
            ORDER BY date ASC
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Reserve a slot with a conditional update: the `is_booked = 0` guard in
    /// the WHERE clause makes two concurrent reservations of the same id
    /// resolve to exactly one winner, without reading first.
    pub async fn reserve(
        pool: &SqlitePool,
        id: &str,
        identity: &BookingIdentity,
        time_zone: &str,
    ) -> AppResult<Slot> {
        let now = Utc::now().naive_utc();
        let (booked_name, booked_email, booked_user_id) = identity.columns();

        let result = sqlx::query(
            r#"
            UPDATE slots
            SET
                is_booked = 1,
                booked_name = ?,
                booked_email = ?,
                booked_user_id = ?,
                time_zone = ?,
                booked_at = ?,
                updated_at = ?
            WHERE id = ? AND is_booked = 0
            "#,
        )
        .bind(booked_name)
        .bind(booked_email)
        .bind(booked_user_id)
        .bind(time_zone)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        if result.rows_affected() == 0 {
            // Zero rows: either the slot is gone or someone else won the race.
            return match Self::find_by_id(pool, id).await? {
                Some(_) => Err(AppError::Conflict(
                    "Este horário já foi agendado.".to_string(),
                )),
                None => Err(AppError::NotFound("Slot não encontrado.".to_string())),
            };
        }

        Self::find_by_id(pool, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Slot não encontrado.".to_string()))
    }

    /// Compensation for the booking saga: return a slot to the pool after a
    /// failed remote event creation.
    pub async fn release(pool: &SqlitePool, id: &str) -> AppResult<()> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            r#"
            UPDATE slots
            SET
                is_booked = 0,
                booked_name = NULL,
                booked_email = NULL,
                booked_user_id = NULL,
                time_zone = NULL,
                booked_at = NULL,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    /// Seeding insert: duplicates on (date, time) are absorbed, never doubled.
    /// Returns whether a new row was created.
    pub async fn upsert_ignore(pool: &SqlitePool, date: &str, time: &str) -> AppResult<bool> {
        let now = Utc::now().naive_utc();
        let result = sqlx::query(
            r#"
            INSERT INTO slots (id, date, time, is_booked, created_at, updated_at)
            VALUES (?, ?, ?, 0, ?, ?)
            ON CONFLICT (date, time) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(date)
        .bind(time)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}
