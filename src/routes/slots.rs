use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use chrono::{Duration, Utc};
use chrono_tz::America::Sao_Paulo;

use crate::db::models::Slot;
use crate::db::SlotRepository;
use crate::error::AppResult;
use crate::AppState;

/// How far ahead the date picker looks.
const AVAILABLE_DATES_WINDOW_DAYS: i64 = 7;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/available", get(available_dates))
        .route("/available-dates", get(available_slots))
}

/// Sorted distinct dates with at least one free slot in the coming week.
async fn available_dates(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<String>>> {
    let today = Utc::now().with_timezone(&Sao_Paulo).date_naive();
    let from = today.format("%Y-%m-%d").to_string();
    let to = (today + Duration::days(AVAILABLE_DATES_WINDOW_DAYS))
        .format("%Y-%m-%d")
        .to_string();

    let dates = SlotRepository::distinct_available_dates(&state.db, &from, &to).await?;
    Ok(Json(dates))
}

/// Every unbooked slot, ordered by (date, time). The front end derives the
/// pickable times from this list.
async fn available_slots(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Slot>>> {
    let slots = SlotRepository::list_available(&state.db, None).await?;
    Ok(Json(slots))
}
