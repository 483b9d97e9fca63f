use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::db::models::Session;
use crate::db::UserRepository;
use crate::error::{AppError, AppResult};
use crate::routes::auth::SessionUser;
use crate::services::gcal::GcalEvent;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/evento", post(create_event))
        .route(
            "/evento/:id",
            get(get_event).put(update_event).delete(delete_event),
        )
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct EventQuery {
    #[serde(rename = "calendarId")]
    calendar_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    #[serde(rename = "calendarId")]
    calendar_id: Option<String>,
    #[serde(flatten)]
    event: GcalEvent,
}

#[derive(Debug, Deserialize)]
pub struct ModifyEventRequest {
    #[serde(rename = "calendarId")]
    calendar_id: Option<String>,
    /// Attendee on whose behalf the change is requested; falls back to the
    /// first attendee in the patch.
    #[serde(rename = "clientEmail")]
    client_email: Option<String>,
    #[serde(flatten)]
    patch: GcalEvent,
}

fn require_calendar_id(calendar_id: Option<String>, where_: &str) -> AppResult<String> {
    calendar_id.ok_or_else(|| {
        AppError::BadRequest(format!(
            "O ID do calendário (calendarId) é obrigatório {}.",
            where_
        ))
    })
}

/// Only an attendee of the event (by e-mail) or its organizer may modify or
/// cancel it. Returns the stored event for further use.
async fn verify_event_access(
    state: &AppState,
    session: &Session,
    calendar_id: &str,
    event_id: &str,
    client_email: Option<&str>,
    patch: &GcalEvent,
) -> AppResult<GcalEvent> {
    let client_email = match client_email {
        Some(email) => email.to_string(),
        None => patch
            .attendees
            .as_ref()
            .and_then(|a| a.first())
            .map(|a| a.email.clone())
            .ok_or_else(|| {
                AppError::BadRequest(
                    "E-mail do cliente (do campo clientEmail ou primeiro participante) é obrigatório para esta operação."
                        .to_string(),
                )
            })?,
    };

    let existing = state
        .calendar
        .get_event(&session.user_id, calendar_id, event_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(
                "Evento não encontrado para verificação de autorização no calendário especificado."
                    .to_string(),
            )
        })?;

    let is_attendee = existing
        .attendees
        .as_ref()
        .map(|attendees| attendees.iter().any(|a| a.email == client_email))
        .unwrap_or(false);

    let is_organizer = match existing.organizer.as_ref() {
        Some(organizer) if organizer.self_ == Some(true) => {
            let owner = UserRepository::find_by_id(&state.db, &session.user_id).await?;
            owner
                .map(|o| organizer.email.as_deref() == Some(o.email.as_str()))
                .unwrap_or(false)
        }
        _ => false,
    };

    if !is_attendee && !is_organizer {
        return Err(AppError::Forbidden);
    }

    Ok(existing)
}

fn patch_is_empty(patch: &GcalEvent) -> bool {
    patch.summary.is_none()
        && patch.description.is_none()
        && patch.start.is_none()
        && patch.attendees.is_none()
}

// ============================================================================
// Handlers
// ============================================================================

async fn get_event(
    State(state): State<Arc<AppState>>,
    SessionUser(session): SessionUser,
    Path(event_id): Path<String>,
    Query(query): Query<EventQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let calendar_id = require_calendar_id(
        query.calendar_id,
        "como parâmetro de query (?calendarId=...)",
    )?;

    let event = state
        .calendar
        .get_event(&session.user_id, &calendar_id, &event_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound("Evento não encontrado no calendário especificado.".to_string())
        })?;

    Ok(Json(json!({ "success": true, "event": event })))
}

async fn create_event(
    State(state): State<Arc<AppState>>,
    SessionUser(session): SessionUser,
    Json(request): Json<CreateEventRequest>,
) -> AppResult<impl IntoResponse> {
    let calendar_id = require_calendar_id(request.calendar_id, "no corpo da requisição")?;

    tracing::debug!(
        "Criando evento no calendário {} pelo usuário {}",
        calendar_id,
        session.user_id
    );

    let event = state
        .calendar
        .create_event(&session.user_id, &calendar_id, request.event)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Evento criado com sucesso!", "event": event })),
    ))
}

async fn update_event(
    State(state): State<Arc<AppState>>,
    SessionUser(session): SessionUser,
    Path(event_id): Path<String>,
    Json(request): Json<ModifyEventRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let calendar_id = require_calendar_id(request.calendar_id, "para esta operação")?;

    if patch_is_empty(&request.patch) {
        return Err(AppError::BadRequest(
            "Nenhum campo de atualização fornecido no corpo da requisição (excluindo calendarId, clientEmail)."
                .to_string(),
        ));
    }

    verify_event_access(
        &state,
        &session,
        &calendar_id,
        &event_id,
        request.client_email.as_deref(),
        &request.patch,
    )
    .await?;

    let event = state
        .calendar
        .update_event(&session.user_id, &calendar_id, &event_id, request.patch)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Evento atualizado com sucesso!",
        "event": event
    })))
}

async fn delete_event(
    State(state): State<Arc<AppState>>,
    SessionUser(session): SessionUser,
    Path(event_id): Path<String>,
    Json(request): Json<ModifyEventRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let calendar_id = require_calendar_id(request.calendar_id, "no corpo da requisição")?;

    verify_event_access(
        &state,
        &session,
        &calendar_id,
        &event_id,
        request.client_email.as_deref(),
        &request.patch,
    )
    .await?;

    state
        .calendar
        .cancel_event(&session.user_id, &calendar_id, &event_id)
        .await?;

    tracing::info!("Evento {} cancelado no calendário {}", event_id, calendar_id);

    Ok(Json(json!({
        "success": true,
        "message": "Evento cancelado com sucesso!"
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{SessionRepository, UserRepository};
    use crate::routes::auth::SESSION_COOKIE;
    use crate::services::gcal::{EventAttendee, EventOrganizer};
    use crate::testutils::{test_state, StubCalendarService};
    use axum::body::Body;
    use http::Request;
    use tower::util::ServiceExt;

    async fn logged_in_session(state: &crate::AppState) -> String {
        let user = UserRepository::upsert_by_google_id(
            &state.db,
            "g-1",
            "dono@example.com",
            "Dono",
            Some("r-1"),
        )
        .await
        .unwrap();
        SessionRepository::create(&state.db, &user).await.unwrap().id
    }

    fn with_session(builder: http::request::Builder, session_id: &str) -> http::request::Builder {
        builder.header(
            http::header::COOKIE,
            format!("{}={}", SESSION_COOKIE, session_id),
        )
    }

    #[tokio::test]
    async fn event_routes_require_a_session() {
        let (state, _stub) = test_state(StubCalendarService::succeeding()).await;
        let app = router().with_state(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/evento/abc?calendarId=primary")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn get_event_requires_calendar_id() {
        let (state, _stub) = test_state(StubCalendarService::succeeding()).await;
        let session_id = logged_in_session(&state).await;
        let app = router().with_state(state);

        let response = app
            .oneshot(
                with_session(Request::builder().uri("/evento/abc"), &session_id)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_event_is_not_found_not_an_error() {
        let (state, _stub) = test_state(StubCalendarService::succeeding()).await;
        let session_id = logged_in_session(&state).await;
        let app = router().with_state(state);

        let response = app
            .oneshot(
                with_session(
                    Request::builder().uri("/evento/nao-existe?calendarId=primary"),
                    &session_id,
                )
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn outsider_may_not_modify_an_event() {
        let (state, stub) = test_state(StubCalendarService::succeeding()).await;
        let session_id = logged_in_session(&state).await;

        // Existing event whose only attendee is someone else, organized
        // elsewhere.
        stub.created.lock().unwrap().push(GcalEvent {
            id: Some("evt-1".to_string()),
            status: Some("confirmed".to_string()),
            attendees: Some(vec![EventAttendee {
                email: "outra@example.com".to_string(),
                ..Default::default()
            }]),
            organizer: Some(EventOrganizer {
                email: Some("terceiro@example.com".to_string()),
                self_: Some(false),
            }),
            ..Default::default()
        });

        let app = router().with_state(state);
        let body = serde_json::json!({
            "calendarId": "primary",
            "clientEmail": "intruso@example.com",
            "summary": "Tentativa de alteração"
        });

        let response = app
            .oneshot(
                with_session(
                    Request::builder()
                        .method("PUT")
                        .uri("/evento/evt-1")
                        .header(http::header::CONTENT_TYPE, "application/json"),
                    &session_id,
                )
                .body(Body::from(body.to_string()))
                .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), http::StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn attendee_may_cancel_their_event() {
        let (state, stub) = test_state(StubCalendarService::succeeding()).await;
        let session_id = logged_in_session(&state).await;

        stub.created.lock().unwrap().push(GcalEvent {
            id: Some("evt-1".to_string()),
            status: Some("confirmed".to_string()),
            attendees: Some(vec![EventAttendee {
                email: "maria@example.com".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        });

        let app = router().with_state(state);
        let body = serde_json::json!({
            "calendarId": "primary",
            "clientEmail": "maria@example.com"
        });

        let response = app
            .oneshot(
                with_session(
                    Request::builder()
                        .method("DELETE")
                        .uri("/evento/evt-1")
                        .header(http::header::CONTENT_TYPE, "application/json"),
                    &session_id,
                )
                .body(Body::from(body.to_string()))
                .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), http::StatusCode::OK);
    }

    #[tokio::test]
    async fn empty_patch_is_rejected() {
        let (state, _stub) = test_state(StubCalendarService::succeeding()).await;
        let session_id = logged_in_session(&state).await;
        let app = router().with_state(state);

        let body = serde_json::json!({
            "calendarId": "primary",
            "clientEmail": "maria@example.com"
        });

        let response = app
            .oneshot(
                with_session(
                    Request::builder()
                        .method("PUT")
                        .uri("/evento/evt-1")
                        .header(http::header::CONTENT_TYPE, "application/json"),
                    &session_id,
                )
                .body(Body::from(body.to_string()))
                .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), http::StatusCode::BAD_REQUEST);
    }
}
