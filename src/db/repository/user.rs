use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::User;
use crate::error::{AppError, AppResult};

// ============================================================================
// User Repository
// ============================================================================

const USER_COLUMNS: &str = "id, google_id, email, name, refresh_token, created_at, updated_at";

pub struct UserRepository;

impl UserRepository {
    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(user)
    }

    pub async fn find_by_google_id(pool: &SqlitePool, google_id: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE google_id = ?"
        ))
        .bind(google_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(user)
    }

    /// The calendar owner whose refresh token serves public bookings: the most
    /// recently authenticated user.
    pub async fn find_calendar_owner(pool: &SqlitePool) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY updated_at DESC LIMIT 1"
        ))
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(user)
    }

    /// Create or update the owner identity from an OAuth callback. At most one
    /// live refresh token per google_id: the latest one overwrites. Google only
    /// reissues a refresh token on fresh consent, so `refresh_token = None`
    /// keeps the stored credential for an existing user.
    pub async fn upsert_by_google_id(
        pool: &SqlitePool,
        google_id: &str,
        email: &str,
        name: &str,
        refresh_token: Option<&str>,
    ) -> AppResult<User> {
        let now = Utc::now().naive_utc();

        let existing = Self::find_by_google_id(pool, google_id).await?;

        let user = if let Some(user) = existing {
            sqlx::query_as::<_, User>(&format!(
                r#"
                UPDATE users
                SET
                    email = ?,
                    name = ?,
                    refresh_token = COALESCE(?, refresh_token),
                    updated_at = ?
                WHERE id = ?
                RETURNING {USER_COLUMNS}
                "#
            ))
            .bind(email)
            .bind(name)
            .bind(refresh_token)
            .bind(now)
            .bind(&user.id)
            .fetch_one(pool)
            .await
            .map_err(AppError::Database)?
        } else {
            let refresh_token = refresh_token.ok_or_else(|| {
                AppError::BadRequest(
                    "O Google não retornou um refresh token. Refaça a autenticação com consentimento."
                        .to_string(),
                )
            })?;

            sqlx::query_as::<_, User>(&format!(
                r#"
                INSERT INTO users (id, google_id, email, name, refresh_token, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                RETURNING {USER_COLUMNS}
                "#
            ))
            .bind(Uuid::new_v4().to_string())
            .bind(google_id)
            .bind(email)
            .bind(name)
            .bind(refresh_token)
            .bind(now)
            .bind(now)
            .fetch_one(pool)
            .await
            .map_err(AppError::Database)?
        };

        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::test_pool;

    #[tokio::test]
    async fn upsert_overwrites_refresh_token() {
        let pool = test_pool().await;

        let created = UserRepository::upsert_by_google_id(
            &pool,
            "g-1",
            "dono@example.com",
            "Dono",
            Some("refresh-1"),
        )
        .await
        .unwrap();
        assert_eq!(created.refresh_token, "refresh-1");

        let updated = UserRepository::upsert_by_google_id(
            &pool,
            "g-1",
            "dono@example.com",
            "Dono",
            Some("refresh-2"),
        )
        .await
        .unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.refresh_token, "refresh-2");
    }

    #[tokio::test]
    async fn upsert_without_new_token_keeps_stored_credential() {
        let pool = test_pool().await;

        UserRepository::upsert_by_google_id(&pool, "g-1", "dono@example.com", "Dono", Some("refresh-1"))
            .await
            .unwrap();
        let updated =
            UserRepository::upsert_by_google_id(&pool, "g-1", "dono@example.com", "Dono", None)
                .await
                .unwrap();

        assert_eq!(updated.refresh_token, "refresh-1");
    }

    #[tokio::test]
    async fn first_login_requires_refresh_token() {
        let pool = test_pool().await;

        let err =
            UserRepository::upsert_by_google_id(&pool, "g-1", "dono@example.com", "Dono", None)
                .await
                .unwrap_err();

        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
