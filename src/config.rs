use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub google: GoogleConfig,
    pub session: SessionConfig,
    pub mail: Option<MailConfig>,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
    /// Whether to set the `Secure` flag on the session cookie.
    /// If `None`, inferred from `frontend_url` (`https` -> true).
    /// Read from env var `COOKIE_SECURE` (accepted values: "true"/"false", "1"/"0", "yes"/"no").
    pub cookie_secure: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    /// Target calendar for consultation events ("primary" unless overridden).
    pub calendar_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Signs the OAuth `state` parameter; sessions themselves live in the database.
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// HTTP endpoint of the transactional mail provider.
    pub api_url: String,
    pub api_key: String,
    /// Sender address, shown as "Agendamento Espiritual <from>".
    pub from: String,
    /// Address that receives the new-booking notification.
    pub notification_email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Allowed requests per second (per IP) for public endpoints
    /// (e.g. /api/auth/google, /api/client/agendar)
    pub public_per_second: u32,
    /// Burst size for public endpoints
    pub public_burst: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        // The mail block is optional: without MAIL_API_URL the service runs with
        // booking emails disabled.
        let mail = match env::var("MAIL_API_URL") {
            Ok(api_url) => Some(MailConfig {
                api_url,
                api_key: env::var("MAIL_API_KEY")
                    .map_err(|_| ConfigError::MissingEnv("MAIL_API_KEY".to_string()))?,
                from: env::var("MAIL_FROM")
                    .map_err(|_| ConfigError::MissingEnv("MAIL_FROM".to_string()))?,
                notification_email: env::var("NOTIFICATION_EMAIL")
                    .map_err(|_| ConfigError::MissingEnv("NOTIFICATION_EMAIL".to_string()))?,
            }),
            Err(_) => None,
        };

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "5000".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                frontend_url: env::var("FRONTEND_URL")
                    .unwrap_or_else(|_| "http://localhost:5173".to_string()),
                cookie_secure: match env::var("COOKIE_SECURE") {
                    Ok(v) => match v.to_lowercase().as_str() {
                        "1" | "true" | "yes" => Some(true),
                        "0" | "false" | "no" => Some(false),
                        _ => None,
                    },
                    Err(_) => None,
                },
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/agendamento.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            google: GoogleConfig {
                client_id: env::var("GOOGLE_CLIENT_ID")
                    .map_err(|_| ConfigError::MissingEnv("GOOGLE_CLIENT_ID".to_string()))?,
                client_secret: env::var("GOOGLE_CLIENT_SECRET")
                    .map_err(|_| ConfigError::MissingEnv("GOOGLE_CLIENT_SECRET".to_string()))?,
                redirect_uri: env::var("GOOGLE_REDIRECT_URI").unwrap_or_else(|_| {
                    "http://localhost:5000/api/auth/google/callback".to_string()
                }),
                calendar_id: env::var("GOOGLE_CALENDAR_ID")
                    .unwrap_or_else(|_| "primary".to_string()),
            },
            session: SessionConfig {
                secret: env::var("SESSION_SECRET")
                    .map_err(|_| ConfigError::MissingEnv("SESSION_SECRET".to_string()))?,
            },
            mail,
            rate_limit: RateLimitConfig {
                public_per_second: env::var("RATE_LIMIT_PUBLIC_PER_SECOND")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .unwrap_or(3),
                public_burst: env::var("RATE_LIMIT_PUBLIC_BURST")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            },
        })
    }

    /// Secure-cookie flag, falling back to the front-end scheme.
    pub fn cookie_secure(&self) -> bool {
        self.server
            .cookie_secure
            .unwrap_or_else(|| self.server.frontend_url.starts_with("https://"))
    }
}

/// Whether the service runs in production; gates diagnostic detail in error bodies.
pub fn is_production() -> bool {
    env::var("APP_ENV")
        .map(|v| v.eq_ignore_ascii_case("production"))
        .unwrap_or(false)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
                frontend_url: "http://localhost:5173".to_string(),
                cookie_secure: None,
            },
            database: DatabaseConfig {
                url: "sqlite://data/agendamento.db".to_string(),
                max_connections: 5,
            },
            google: GoogleConfig {
                client_id: String::new(),
                client_secret: String::new(),
                redirect_uri: "http://localhost:5000/api/auth/google/callback".to_string(),
                calendar_id: "primary".to_string(),
            },
            session: SessionConfig {
                secret: String::new(),
            },
            mail: None,
            rate_limit: RateLimitConfig {
                public_per_second: 3,
                public_burst: 10,
            },
        }
    }
}
