use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{Session, User};
use crate::error::{AppError, AppResult};

/// Sessions live this long; the cookie carries the same horizon.
pub const SESSION_TTL_DAYS: i64 = 7;

// ============================================================================
// Session Repository
// ============================================================================

pub struct SessionRepository;

impl SessionRepository {
    pub async fn create(pool: &SqlitePool, user: &User) -> AppResult<Session> {
        let now = Utc::now().naive_utc();
        let expires_at = now + Duration::days(SESSION_TTL_DAYS);

        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (id, user_id, user_name, google_id, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, user_id, user_name, google_id, created_at, expires_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.google_id)
        .bind(now)
        .bind(expires_at)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(session)
    }

    /// A session is only returned while unexpired.
    pub async fn find_valid(pool: &SqlitePool, id: &str) -> AppResult<Option<Session>> {
        let now = Utc::now().naive_utc();

        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, user_id, user_name, google_id, created_at, expires_at
            FROM sessions
            WHERE id = ? AND expires_at > ?
            "#,
        )
        .bind(id)
        .bind(now)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(session)
    }

    pub async fn delete(pool: &SqlitePool, id: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(())
    }

    /// Housekeeping on login: drop rows past their expiry.
    pub async fn purge_expired(pool: &SqlitePool) -> AppResult<u64> {
        let now = Utc::now().naive_utc();
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }
}
