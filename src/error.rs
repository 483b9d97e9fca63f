use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Não autorizado. Por favor, faça login.")]
    Unauthorized,

    #[error("Acesso negado. Você não tem permissão para modificar/cancelar este evento.")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Horário conflitante! O período de {start} até {end} já está ocupado pelo evento: \"{summary}\" (ID: {event_id})")]
    SchedulingConflict {
        start: String,
        end: String,
        summary: String,
        event_id: String,
    },

    #[error("Credencial do Google expirada ou revogada. Refaça a autenticação.")]
    AuthExpired,

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Google API error: {0}")]
    GoogleApi(String),

    #[error("Mail error: {0}")]
    Mail(String),
}

pub type AppResult<T> = Result<T, AppError>;

/// Flat error body the front end expects: `{error, details?}`.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string(), None),
            AppError::AuthExpired => (StatusCode::UNAUTHORIZED, self.to_string(), None),
            AppError::Forbidden => (StatusCode::FORBIDDEN, self.to_string(), None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone(), None),
            AppError::SchedulingConflict { .. } => (StatusCode::CONFLICT, self.to_string(), None),
            AppError::Jwt(e) => {
                tracing::warn!("JWT error: {:?}", e);
                (
                    StatusCode::UNAUTHORIZED,
                    "Sessão de autenticação inválida ou expirada.".to_string(),
                    None,
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Erro interno do servidor.".to_string(),
                    diagnostic(e.to_string()),
                )
            }
            AppError::Request(e) => {
                tracing::error!("HTTP request error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Falha na comunicação com serviço externo.".to_string(),
                    diagnostic(e.to_string()),
                )
            }
            AppError::GoogleApi(msg) => {
                tracing::error!("Google API error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Erro ao comunicar com o Google Calendar.".to_string(),
                    diagnostic(msg.clone()),
                )
            }
            AppError::Mail(msg) => {
                tracing::error!("Mail error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Erro ao enviar e-mail.".to_string(),
                    diagnostic(msg.clone()),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Erro interno do servidor.".to_string(),
                    diagnostic(e.to_string()),
                )
            }
        };

        let body = ErrorResponse {
            error: message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Diagnostic detail is exposed only outside production.
fn diagnostic(detail: String) -> Option<String> {
    if crate::config::is_production() {
        None
    } else {
        Some(detail)
    }
}
