use async_trait::async_trait;
use chrono::{DateTime, Duration};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::config::GoogleConfig;
use crate::db::UserRepository;
use crate::error::{AppError, AppResult};

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const CALENDAR_API_URL: &str = "https://www.googleapis.com/calendar/v3";

/// Consultations have a fixed length; caller-supplied end times are overwritten.
pub const CONSULTATION_DURATION_MINUTES: i64 = 90;

/// Timezone the practice operates in; used when a request carries none.
pub const SERVICE_TIME_ZONE: &str = "America/Sao_Paulo";

const OAUTH_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/calendar",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
];

// ============================================================================
// OAuth Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    /// Only issued on fresh consent (`prompt=consent` + `access_type=offline`).
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub token_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GoogleUserInfo {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
}

// ============================================================================
// Calendar Event Types
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GcalEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<EventDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<EventDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<EventAttendee>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organizer: Option<EventOrganizer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminders: Option<EventReminders>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventDateTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    /// All-day events carry `date` instead of `dateTime`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventAttendee {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_status: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventOrganizer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "self", skip_serializing_if = "Option::is_none")]
    pub self_: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventReminders {
    pub use_default: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overrides: Option<Vec<EventReminderOverride>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventReminderOverride {
    pub method: String,
    pub minutes: i64,
}

#[derive(Debug, Default, Deserialize)]
struct EventsListResponse {
    items: Option<Vec<GcalEvent>>,
}

// ============================================================================
// Service Trait
// ============================================================================

/// Integration boundary to the remote calendar and its identity provider.
/// Routes and the booking workflow depend on this trait so tests can swap in
/// a stub instead of the live Google client.
#[async_trait]
pub trait CalendarService: Send + Sync {
    /// Consent-screen URL requesting offline calendar access.
    fn auth_url(&self, state: &str) -> String;

    async fn exchange_code(&self, code: &str) -> AppResult<TokenResponse>;

    async fn fetch_userinfo(&self, access_token: &str) -> AppResult<GoogleUserInfo>;

    /// Create an event on the user's calendar. The end time is always
    /// start + 90 minutes and a conflict check runs over that interval first.
    async fn create_event(
        &self,
        user_id: &str,
        calendar_id: &str,
        draft: GcalEvent,
    ) -> AppResult<GcalEvent>;

    /// `None` (not an error) when the remote calendar reports not-found.
    async fn get_event(
        &self,
        user_id: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> AppResult<Option<GcalEvent>>;

    async fn update_event(
        &self,
        user_id: &str,
        calendar_id: &str,
        event_id: &str,
        patch: GcalEvent,
    ) -> AppResult<GcalEvent>;

    /// Soft cancellation: the event stays on the calendar with status
    /// "cancelled" so history survives and attendees get notified.
    async fn cancel_event(
        &self,
        user_id: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> AppResult<GcalEvent>;
}

// ============================================================================
// Google Implementation
// ============================================================================

#[derive(Debug, Clone)]
pub struct GoogleCalendarService {
    client: Client,
    pool: SqlitePool,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl GoogleCalendarService {
    pub fn new(config: &GoogleConfig, pool: SqlitePool) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        Ok(Self {
            client,
            pool,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
        })
    }

    /// Mint a fresh access token for the stored refresh credential. Minting is
    /// cheap and idempotent, so each call gets its own token and no credential
    /// object is shared across requests.
    async fn access_for_user(&self, user_id: &str) -> AppResult<String> {
        let user = UserRepository::find_by_id(&self.pool, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Usuário não encontrado.".to_string()))?;

        self.refresh_access_token(&user.refresh_token).await
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> AppResult<String> {
        let response = self
            .client
            .post(GOOGLE_TOKEN_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            // A revoked or stale refresh token surfaces as invalid_grant; the
            // owner has to run the consent flow again.
            if body.contains("invalid_grant") {
                return Err(AppError::AuthExpired);
            }
            return Err(AppError::GoogleApi(format!(
                "Token refresh failed ({}): {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::GoogleApi(format!("Failed to parse token response: {}", e)))?;

        Ok(token.access_token)
    }

    async fn parse_response<T: DeserializeOwned>(
        response: reqwest::Response,
        what: &str,
    ) -> AppResult<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::GoogleApi(format!(
                "{} failed ({}): {}",
                what, status, body
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AppError::GoogleApi(format!("{}: invalid response: {}", what, e)))
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!(
            "{}/calendars/{}/events",
            CALENDAR_API_URL,
            urlencoding::encode(calendar_id)
        )
    }

    /// First confirmed event overlapping `[start, end)` on the calendar,
    /// ignoring the event being edited when `exclude_event_id` is set.
    async fn check_conflict(
        &self,
        token: &str,
        calendar_id: &str,
        start: &str,
        end: &str,
        exclude_event_id: Option<&str>,
    ) -> AppResult<Option<GcalEvent>> {
        let response = self
            .client
            .get(self.events_url(calendar_id))
            .bearer_auth(token)
            .query(&[
                ("timeMin", start),
                ("timeMax", end),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
            ])
            .send()
            .await?;

        let list: EventsListResponse = Self::parse_response(response, "List events").await?;

        Ok(first_conflicting(
            list.items.unwrap_or_default(),
            exclude_event_id,
        ))
    }

    async fn fetch_event(
        &self,
        token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> AppResult<Option<GcalEvent>> {
        let response = self
            .client
            .get(format!(
                "{}/{}",
                self.events_url(calendar_id),
                urlencoding::encode(event_id)
            ))
            .bearer_auth(token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let event: GcalEvent = Self::parse_response(response, "Get event").await?;
        Ok(Some(event))
    }

    async fn put_event(
        &self,
        token: &str,
        calendar_id: &str,
        event_id: &str,
        event: &GcalEvent,
    ) -> AppResult<GcalEvent> {
        let response = self
            .client
            .put(format!(
                "{}/{}",
                self.events_url(calendar_id),
                urlencoding::encode(event_id)
            ))
            .bearer_auth(token)
            .query(&[("sendUpdates", "all")])
            .json(event)
            .send()
            .await?;

        Self::parse_response(response, "Update event").await
    }
}

#[async_trait]
impl CalendarService for GoogleCalendarService {
    fn auth_url(&self, state: &str) -> String {
        let scope = OAUTH_SCOPES.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent&state={}",
            GOOGLE_AUTH_URL,
            self.client_id,
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&scope),
            urlencoding::encode(state)
        )
    }

    async fn exchange_code(&self, code: &str) -> AppResult<TokenResponse> {
        let response = self
            .client
            .post(GOOGLE_TOKEN_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::GoogleApi(format!(
                "Failed to exchange code: {}",
                body
            )));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AppError::GoogleApi(format!("Failed to parse token response: {}", e)))
    }

    async fn fetch_userinfo(&self, access_token: &str) -> AppResult<GoogleUserInfo> {
        let response = self
            .client
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await?;

        Self::parse_response(response, "Fetch userinfo").await
    }

    async fn create_event(
        &self,
        user_id: &str,
        calendar_id: &str,
        mut draft: GcalEvent,
    ) -> AppResult<GcalEvent> {
        let start = draft
            .start
            .as_ref()
            .and_then(|s| s.date_time.clone())
            .ok_or_else(|| {
                AppError::BadRequest("O evento precisa de start.dateTime.".to_string())
            })?;
        let time_zone = draft
            .start
            .as_ref()
            .and_then(|s| s.time_zone.clone())
            .ok_or_else(|| {
                AppError::BadRequest("O evento precisa de start.timeZone.".to_string())
            })?;

        let end = end_for_start(&start)?;
        draft.end = Some(EventDateTime {
            date_time: Some(end.clone()),
            time_zone: Some(time_zone),
            date: None,
        });

        let token = self.access_for_user(user_id).await?;

        if let Some(conflicting) = self
            .check_conflict(&token, calendar_id, &start, &end, None)
            .await?
        {
            return Err(AppError::SchedulingConflict {
                start,
                end,
                summary: conflicting.summary.unwrap_or_default(),
                event_id: conflicting.id.unwrap_or_default(),
            });
        }

        // Default reminders off; explicit email reminder a day before and a
        // popup an hour before.
        draft.reminders = Some(EventReminders {
            use_default: false,
            overrides: Some(vec![
                EventReminderOverride {
                    method: "email".to_string(),
                    minutes: 24 * 60,
                },
                EventReminderOverride {
                    method: "popup".to_string(),
                    minutes: 60,
                },
            ]),
        });

        let response = self
            .client
            .post(self.events_url(calendar_id))
            .bearer_auth(&token)
            .query(&[("sendUpdates", "all")])
            .json(&draft)
            .send()
            .await?;

        let created: GcalEvent = Self::parse_response(response, "Insert event").await?;

        tracing::info!(
            "Evento \"{}\" agendado (ID: {}) para {}",
            created.summary.as_deref().unwrap_or_default(),
            created.id.as_deref().unwrap_or_default(),
            start
        );

        Ok(created)
    }

    async fn get_event(
        &self,
        user_id: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> AppResult<Option<GcalEvent>> {
        let token = self.access_for_user(user_id).await?;
        self.fetch_event(&token, calendar_id, event_id).await
    }

    async fn update_event(
        &self,
        user_id: &str,
        calendar_id: &str,
        event_id: &str,
        patch: GcalEvent,
    ) -> AppResult<GcalEvent> {
        let token = self.access_for_user(user_id).await?;

        let existing = self
            .fetch_event(&token, calendar_id, event_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound("Evento não encontrado para atualização.".to_string())
            })?;

        let merged = apply_patch(existing, patch)?;
        let start = merged
            .start
            .as_ref()
            .and_then(|s| s.date_time.clone())
            .unwrap_or_default();
        let end = merged
            .end
            .as_ref()
            .and_then(|e| e.date_time.clone())
            .unwrap_or_default();

        if let Some(conflicting) = self
            .check_conflict(&token, calendar_id, &start, &end, Some(event_id))
            .await?
        {
            return Err(AppError::SchedulingConflict {
                start,
                end,
                summary: conflicting.summary.unwrap_or_default(),
                event_id: conflicting.id.unwrap_or_default(),
            });
        }

        let updated = self.put_event(&token, calendar_id, event_id, &merged).await?;

        tracing::info!(
            "Evento {} atualizado; novo horário: {}",
            event_id,
            start
        );

        Ok(updated)
    }

    async fn cancel_event(
        &self,
        user_id: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> AppResult<GcalEvent> {
        let token = self.access_for_user(user_id).await?;

        let mut existing = self
            .fetch_event(&token, calendar_id, event_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound("Evento não encontrado para cancelamento.".to_string())
            })?;

        existing.status = Some("cancelled".to_string());
        existing.sequence = Some(existing.sequence.map(|n| n + 1).unwrap_or(1));

        let cancelled = self.put_event(&token, calendar_id, event_id, &existing).await?;

        tracing::info!(
            "Evento {} cancelado; status: {}",
            event_id,
            cancelled.status.as_deref().unwrap_or_default()
        );

        Ok(cancelled)
    }
}

// ============================================================================
// Pure helpers
// ============================================================================

/// End = start + fixed consultation duration, regardless of any supplied end.
pub fn end_for_start(start: &str) -> AppResult<String> {
    let start_dt = DateTime::parse_from_rfc3339(start)
        .map_err(|e| AppError::BadRequest(format!("Data/hora inicial inválida: {}", e)))?;

    Ok((start_dt + Duration::minutes(CONSULTATION_DURATION_MINUTES)).to_rfc3339())
}

/// First event that still counts as a conflict: cancelled events and the
/// event being edited (by id) never conflict.
pub fn first_conflicting(
    events: Vec<GcalEvent>,
    exclude_event_id: Option<&str>,
) -> Option<GcalEvent> {
    events.into_iter().find(|event| {
        if event.status.as_deref() == Some("cancelled") {
            return false;
        }
        match (exclude_event_id, event.id.as_deref()) {
            (Some(excluded), Some(id)) => id != excluded,
            _ => true,
        }
    })
}

/// Merge an update into the stored event. A patched `start.dateTime` pins the
/// end to start + 90 minutes; otherwise the stored times are kept.
pub fn apply_patch(existing: GcalEvent, patch: GcalEvent) -> AppResult<GcalEvent> {
    let mut merged = existing;

    if let Some(start) = patch.start.as_ref().and_then(|s| s.date_time.clone()) {
        let time_zone = patch
            .start
            .as_ref()
            .and_then(|s| s.time_zone.clone())
            .unwrap_or_else(|| SERVICE_TIME_ZONE.to_string());
        let end = end_for_start(&start)?;

        merged.start = Some(EventDateTime {
            date_time: Some(start),
            time_zone: Some(time_zone.clone()),
            date: None,
        });
        merged.end = Some(EventDateTime {
            date_time: Some(end),
            time_zone: Some(time_zone),
            date: None,
        });
    } else if merged.start.as_ref().and_then(|s| s.date_time.as_ref()).is_none()
        || merged.end.as_ref().and_then(|e| e.date_time.as_ref()).is_none()
    {
        return Err(AppError::BadRequest(
            "Não foi possível determinar o horário do evento existente para atualização."
                .to_string(),
        ));
    }

    if patch.summary.is_some() {
        merged.summary = patch.summary;
    }
    if patch.description.is_some() {
        merged.description = patch.description;
    }
    if patch.attendees.is_some() {
        merged.attendees = patch.attendees;
    }

    Ok(merged)
}
