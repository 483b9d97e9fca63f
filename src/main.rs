use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::{routing::get, Router};
use http::{HeaderValue, StatusCode};
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::SmartIpKeyExtractor;
use tower_governor::{GovernorError, GovernorLayer};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod error;
mod routes;
mod services;
#[cfg(test)]
mod testutils;

use config::Config;
use services::gcal::{CalendarService, GoogleCalendarService};
use services::mailer::Mailer;

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    pub calendar: Arc<dyn CalendarService>,
    pub mailer: Option<Arc<Mailer>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agendamento_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    // Initialize database
    let pool = services::init::init_db(&config).await?;

    // Out-of-band batch job: `agendamento-backend seed-slots` populates the
    // slot table and exits without serving requests.
    if std::env::args().nth(1).as_deref() == Some("seed-slots") {
        let added = services::seeding::seed_slots(&pool).await?;
        tracing::info!("Seeding concluído: {} novos slots.", added);
        return Ok(());
    }

    tracing::info!("Starting Agendamento Espiritual backend");

    let calendar: Arc<dyn CalendarService> =
        Arc::new(GoogleCalendarService::new(&config.google, pool.clone())?);

    let mailer = match &config.mail {
        Some(mail_config) => Some(Arc::new(Mailer::new(mail_config)?)),
        None => {
            tracing::warn!("MAIL_API_URL não configurado; e-mails de confirmação desativados");
            None
        }
    };

    let app_state = Arc::new(AppState {
        db: pool,
        config: config.clone(),
        calendar,
        mailer,
    });

    // Rate limiter for the public endpoints (booking form and OAuth entry).
    let mut public_builder = GovernorConfigBuilder::default();
    public_builder.per_second(config.rate_limit.public_per_second.into());
    public_builder.burst_size(config.rate_limit.public_burst);
    public_builder.key_extractor(SmartIpKeyExtractor);
    public_builder.error_handler(governor_error_response);

    let public_gov_conf = Arc::new(
        public_builder
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Failed to build public governor config"))?,
    );

    // Periodic cleanup of the limiter storage.
    {
        let limiter = public_gov_conf.limiter().clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                tracing::debug!("public rate limiter size: {}", limiter.len());
                limiter.retain_recent();
            }
        });
    }

    // Build router
    let app = Router::new()
        // Health check
        .route("/health", get(routes::health::health_check))
        // Owner authentication (Google OAuth)
        .nest(
            "/api/auth",
            routes::auth::router().layer(GovernorLayer {
                config: public_gov_conf.clone(),
            }),
        )
        // Slot listing for the scheduling form
        .nest("/api/slots", routes::slots::router())
        // Public booking endpoint
        .nest(
            "/api/client",
            routes::client::router().layer(GovernorLayer {
                config: public_gov_conf.clone(),
            }),
        )
        // Calendar event management (session-protected)
        .nest("/api/calendar", routes::calendar::router())
        // Add shared state
        .with_state(app_state.clone())
        // Add middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(
                    config
                        .server
                        .frontend_url
                        .parse::<HeaderValue>()
                        .expect("Invalid FRONTEND_URL for CORS"),
                )
                .allow_methods([
                    http::Method::GET,
                    http::Method::POST,
                    http::Method::PUT,
                    http::Method::DELETE,
                    http::Method::OPTIONS,
                ])
                .allow_headers([http::header::CONTENT_TYPE, http::header::ACCEPT])
                .allow_credentials(true),
        );

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// 429 body in the same flat `{error}` shape the API uses elsewhere.
fn governor_error_response(error: GovernorError) -> http::Response<Body> {
    match error {
        GovernorError::TooManyRequests { wait_time, headers } => {
            let body = serde_json::json!({
                "error": "Limite de requisições excedido. Tente novamente em instantes.",
                "retryAfterSeconds": wait_time,
            })
            .to_string();

            let mut resp = http::Response::new(Body::from(body));
            *resp.status_mut() = StatusCode::TOO_MANY_REQUESTS;
            resp.headers_mut().insert(
                http::header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            if let Some(hmap) = headers {
                for (name, value) in hmap.iter() {
                    resp.headers_mut().append(name.clone(), value.clone());
                }
            }
            resp.headers_mut().insert(
                http::header::RETRY_AFTER,
                HeaderValue::from_str(&wait_time.to_string()).unwrap(),
            );
            resp
        }
        GovernorError::UnableToExtractKey => {
            let body = serde_json::json!({
                "error": "Não foi possível determinar o IP do cliente."
            })
            .to_string();

            let mut resp = http::Response::new(Body::from(body));
            *resp.status_mut() = StatusCode::BAD_REQUEST;
            resp.headers_mut().insert(
                http::header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            resp
        }
        GovernorError::Other { code, msg, headers } => {
            let body = msg.unwrap_or_else(|| "Rate limiting error".to_string());
            let mut resp = http::Response::new(Body::from(body));
            *resp.status_mut() =
                StatusCode::from_u16(code.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            if let Some(hmap) = headers {
                for (name, value) in hmap.iter() {
                    resp.headers_mut().append(name.clone(), value.clone());
                }
            }
            resp
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to bind SIGTERM");
        tokio::select! {
            _ = ctrl_c => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("Failed to bind Ctrl+C");
    }

    tracing::info!("Shutdown signal received");
}
