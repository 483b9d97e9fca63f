//! Shared helpers for unit tests: an in-memory database and a stub calendar.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::gcal::{
    end_for_start, CalendarService, GcalEvent, GoogleUserInfo, TokenResponse,
};
use crate::AppState;

/// In-memory SQLite with the real migrations applied. A single connection so
/// every query sees the same database.
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    pool
}

#[derive(Debug, Clone, Copy)]
pub enum StubBehavior {
    /// Accept the draft and hand back a confirmed event.
    Succeed,
    /// Report the window as already occupied.
    Conflict,
    /// Fail like an unreachable remote service.
    Unavailable,
}

/// Calendar double recording what the workflow asked it to create.
pub struct StubCalendarService {
    pub behavior: StubBehavior,
    pub created: Mutex<Vec<GcalEvent>>,
}

impl StubCalendarService {
    pub fn succeeding() -> Self {
        Self::with_behavior(StubBehavior::Succeed)
    }

    pub fn conflicting() -> Self {
        Self::with_behavior(StubBehavior::Conflict)
    }

    pub fn unavailable() -> Self {
        Self::with_behavior(StubBehavior::Unavailable)
    }

    fn with_behavior(behavior: StubBehavior) -> Self {
        Self {
            behavior,
            created: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CalendarService for StubCalendarService {
    fn auth_url(&self, state: &str) -> String {
        format!("https://stub.invalid/auth?state={}", state)
    }

    async fn exchange_code(&self, _code: &str) -> AppResult<TokenResponse> {
        Ok(TokenResponse {
            access_token: "stub-access".to_string(),
            expires_in: 3600,
            refresh_token: Some("stub-refresh".to_string()),
            scope: None,
            token_type: None,
        })
    }

    async fn fetch_userinfo(&self, _access_token: &str) -> AppResult<GoogleUserInfo> {
        Ok(GoogleUserInfo {
            id: "g-1".to_string(),
            email: "dono@example.com".to_string(),
            name: Some("Dono".to_string()),
        })
    }

    async fn create_event(
        &self,
        _user_id: &str,
        _calendar_id: &str,
        draft: GcalEvent,
    ) -> AppResult<GcalEvent> {
        match self.behavior {
            StubBehavior::Succeed => {
                self.created.lock().unwrap().push(draft.clone());
                let start = draft
                    .start
                    .as_ref()
                    .and_then(|s| s.date_time.clone())
                    .unwrap_or_default();
                Ok(GcalEvent {
                    id: Some("evt-1".to_string()),
                    status: Some("confirmed".to_string()),
                    html_link: Some("https://calendar.stub.invalid/evt-1".to_string()),
                    end: Some(crate::services::gcal::EventDateTime {
                        date_time: end_for_start(&start).ok(),
                        time_zone: draft.start.as_ref().and_then(|s| s.time_zone.clone()),
                        date: None,
                    }),
                    ..draft
                })
            }
            StubBehavior::Conflict => Err(AppError::SchedulingConflict {
                start: "2025-07-21T14:00:00-03:00".to_string(),
                end: "2025-07-21T15:30:00-03:00".to_string(),
                summary: "Evento existente".to_string(),
                event_id: "busy-1".to_string(),
            }),
            StubBehavior::Unavailable => {
                Err(AppError::GoogleApi("stub: serviço indisponível".to_string()))
            }
        }
    }

    async fn get_event(
        &self,
        _user_id: &str,
        _calendar_id: &str,
        event_id: &str,
    ) -> AppResult<Option<GcalEvent>> {
        let created = self.created.lock().unwrap();
        Ok(created
            .iter()
            .find(|e| e.id.as_deref() == Some(event_id))
            .cloned())
    }

    async fn update_event(
        &self,
        _user_id: &str,
        _calendar_id: &str,
        event_id: &str,
        mut patch: GcalEvent,
    ) -> AppResult<GcalEvent> {
        patch.id = Some(event_id.to_string());
        Ok(patch)
    }

    async fn cancel_event(
        &self,
        _user_id: &str,
        _calendar_id: &str,
        event_id: &str,
    ) -> AppResult<GcalEvent> {
        Ok(GcalEvent {
            id: Some(event_id.to_string()),
            status: Some("cancelled".to_string()),
            ..Default::default()
        })
    }
}

/// App state over an in-memory database and the given stub calendar; the stub
/// is also returned separately so tests can inspect it.
pub async fn test_state(stub: StubCalendarService) -> (Arc<AppState>, Arc<StubCalendarService>) {
    let stub = Arc::new(stub);
    let state = Arc::new(AppState {
        db: test_pool().await,
        config: Config::default(),
        calendar: stub.clone(),
        mailer: None,
    });
    (state, stub)
}
