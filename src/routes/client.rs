use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};

use crate::error::AppResult;
use crate::services::booking::{book_slot, BookingConfirmation, ScheduleRequest};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/agendar", post(agendar))
}

/// Public booking endpoint: turns a slot + contact info into a reservation
/// and a calendar event.
async fn agendar(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScheduleRequest>,
) -> AppResult<Json<BookingConfirmation>> {
    let confirmation = book_slot(&state, request).await?;
    Ok(Json(confirmation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{SlotRepository, UserRepository};
    use crate::testutils::{test_state, StubCalendarService};
    use axum::body::Body;
    use http::Request;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    async fn seed(state: &crate::AppState) -> String {
        UserRepository::upsert_by_google_id(
            &state.db,
            "g-1",
            "dono@example.com",
            "Dono",
            Some("refresh-1"),
        )
        .await
        .unwrap();
        SlotRepository::upsert_ignore(&state.db, "2025-07-21", "14:00")
            .await
            .unwrap();
        SlotRepository::list_available(&state.db, None).await.unwrap()[0]
            .id
            .clone()
    }

    fn booking_body(slot_id: &str) -> Value {
        json!({
            "name": "Maria Silva",
            "email": "maria@example.com",
            "date": "2025-07-21",
            "time": "14:00",
            "timeZone": "America/Sao_Paulo",
            "slotId": slot_id,
        })
    }

    fn post_agendar(body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/agendar")
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn booking_then_rebooking_yields_conflict() {
        let (state, _stub) = test_state(StubCalendarService::succeeding()).await;
        let slot_id = seed(&state).await;

        let app = router().with_state(state.clone());
        let response = app
            .clone()
            .oneshot(post_agendar(&booking_body(&slot_id)))
            .await
            .unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let confirmation: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(confirmation["message"], "Agendamento realizado com sucesso!");
        assert_eq!(confirmation["eventId"], "evt-1");
        assert_eq!(confirmation["slotBooked"]["isBooked"], true);

        // Booked slot no longer shows up as available.
        let remaining = SlotRepository::list_available(&state.db, None).await.unwrap();
        assert!(remaining.iter().all(|s| s.id != slot_id));

        let response = app
            .oneshot(post_agendar(&booking_body(&slot_id)))
            .await
            .unwrap();
        assert_eq!(response.status(), http::StatusCode::CONFLICT);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let error: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(error["error"], "Este horário já foi agendado.");
    }

    #[tokio::test]
    async fn mismatched_slot_time_is_bad_request() {
        let (state, _stub) = test_state(StubCalendarService::succeeding()).await;
        let slot_id = seed(&state).await;

        let mut body = booking_body(&slot_id);
        body["time"] = json!("15:30");

        let app = router().with_state(state);
        let response = app.oneshot(post_agendar(&body)).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_fields_are_bad_request() {
        let (state, _stub) = test_state(StubCalendarService::succeeding()).await;
        seed(&state).await;

        let app = router().with_state(state);
        let response = app
            .oneshot(post_agendar(&json!({ "name": "Maria Silva" })))
            .await
            .unwrap();
        assert_eq!(response.status(), http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn remote_failure_surfaces_as_server_error_and_frees_slot() {
        let (state, _stub) = test_state(StubCalendarService::unavailable()).await;
        let slot_id = seed(&state).await;

        let app = router().with_state(state.clone());
        let response = app.oneshot(post_agendar(&booking_body(&slot_id))).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::INTERNAL_SERVER_ERROR);

        let slot = SlotRepository::find_by_id(&state.db, &slot_id)
            .await
            .unwrap()
            .unwrap();
        assert!(!slot.is_booked);
    }
}
