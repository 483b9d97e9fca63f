use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Query, State},
    http::request::Parts,
    response::{IntoResponse, Redirect},
    routing::get,
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};

use crate::db::models::Session;
use crate::db::repository::session::SESSION_TTL_DAYS;
use crate::db::{SessionRepository, UserRepository};
use crate::error::{AppError, AppResult};
use crate::AppState;

pub const SESSION_COOKIE: &str = "session_id";

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/google", get(google_login))
        .route("/google/callback", get(google_callback))
        .route("/logout", get(logout))
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// OAuth `state` signed as a short-lived JWT, so no CSRF cookie is needed.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OAuthState {
    csrf_token: String,
    iat: usize,
    exp: usize,
}

fn generate_random_string(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

// ============================================================================
// Handlers
// ============================================================================

/// Redirect the calendar owner to the Google consent screen. The URL requests
/// offline access with forced consent so a refresh token is always issued.
async fn google_login(State(state): State<Arc<AppState>>) -> AppResult<impl IntoResponse> {
    let now = Utc::now();
    let state_claims = OAuthState {
        csrf_token: generate_random_string(32),
        iat: now.timestamp() as usize,
        exp: (now + Duration::minutes(10)).timestamp() as usize,
    };

    let state_jwt = encode(
        &Header::default(),
        &state_claims,
        &EncodingKey::from_secret(state.config.session.secret.as_bytes()),
    )?;

    Ok(Redirect::to(&state.calendar.auth_url(&state_jwt)))
}

/// Exchange the authorization code, upsert the owner, open a session.
async fn google_callback(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> AppResult<impl IntoResponse> {
    if let Some(error) = query.error {
        let description = query.error_description.unwrap_or_default();
        tracing::error!("OAuth error: {} - {}", error, description);
        return Err(AppError::BadRequest(format!(
            "Erro na autenticação: {}",
            description
        )));
    }

    let code = query
        .code
        .ok_or_else(|| AppError::BadRequest("Código de autorização ausente.".to_string()))?;
    let state_encoded = query
        .state
        .ok_or_else(|| AppError::BadRequest("Parâmetro state ausente.".to_string()))?;

    decode::<OAuthState>(
        &state_encoded,
        &DecodingKey::from_secret(state.config.session.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::error!("Failed to decode OAuth state: {:?}", e);
        e
    })?;

    let tokens = state.calendar.exchange_code(&code).await?;
    let userinfo = state.calendar.fetch_userinfo(&tokens.access_token).await?;

    let user = UserRepository::upsert_by_google_id(
        &state.db,
        &userinfo.id,
        &userinfo.email,
        userinfo.name.as_deref().unwrap_or(&userinfo.email),
        tokens.refresh_token.as_deref(),
    )
    .await?;

    // Login is a natural moment for session housekeeping.
    match SessionRepository::purge_expired(&state.db).await {
        Ok(purged) if purged > 0 => tracing::debug!("Purged {} expired sessions", purged),
        Ok(_) => {}
        Err(e) => tracing::warn!("Failed to purge expired sessions: {:?}", e),
    }

    let session = SessionRepository::create(&state.db, &user).await?;

    tracing::info!(
        "Autenticação concluída para {} (google_id: {})",
        user.email,
        user.google_id
    );

    let cookie = Cookie::build((SESSION_COOKIE, session.id.clone()))
        .path("/")
        .http_only(true)
        .secure(state.config.cookie_secure())
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(SESSION_TTL_DAYS))
        .build();

    let redirect = format!(
        "{}/?auth=success",
        state.config.server.frontend_url.trim_end_matches('/')
    );

    Ok((jar.add(cookie), Redirect::to(&redirect)))
}

/// Destroy the server-side session and clear the cookie.
async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> AppResult<impl IntoResponse> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        SessionRepository::delete(&state.db, cookie.value()).await?;
    }

    let jar = jar.remove(Cookie::build((SESSION_COOKIE, "")).path("/").build());

    Ok((
        jar,
        Json(serde_json::json!({ "message": "Sessão encerrada." })),
    ))
}

// ============================================================================
// Auth Middleware / Extractor
// ============================================================================

/// Extractor for an authenticated calendar-owner session.
pub struct SessionUser(pub Session);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for SessionUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);

        let cookie = jar.get(SESSION_COOKIE).ok_or_else(|| {
            tracing::debug!("Cookie de sessão ausente");
            AppError::Unauthorized
        })?;

        let session = SessionRepository::find_valid(&state.db, cookie.value())
            .await?
            .ok_or_else(|| {
                tracing::debug!("Sessão inválida ou expirada");
                AppError::Unauthorized
            })?;

        Ok(SessionUser(session))
    }
}
