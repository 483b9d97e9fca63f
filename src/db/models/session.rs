use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Server-side session row; the id travels in the session cookie.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub google_id: String,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}
