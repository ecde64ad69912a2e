use std::env;

use chrono::NaiveTime;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub google: GoogleConfig,
    pub mail: MailConfig,
    pub source: SourceConfig,
    pub scheduler: SchedulerConfig,
    pub uploads: UploadConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
    pub query: QueryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origin. `*` allows any origin.
    pub frontend_url: String,
    /// Externally visible base URL used when building links to uploads and
    /// user-submitted events.
    pub public_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub expiration_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    /// OAuth client id expected as the `aud` claim. Federated login is
    /// disabled when unset.
    pub client_id: Option<String>,
    pub certs_url: String,
    /// Allowed clock skew (seconds) when validating `exp`/`iat`.
    pub leeway_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// HTTP mail relay endpoint. When unset, emails are only logged.
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub api_url: String,
    pub api_token: Option<String>,
    /// Upper bound on listing pages fetched per run.
    pub max_pages: u32,
    pub timeout_seconds: u64,
    /// Delay before the single retry of a failed upstream call.
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Wall-clock time (UTC) of the daily ingest run.
    pub daily_at: NaiveTime,
    pub city: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub dir: String,
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Allowed requests per second (per IP) for auth endpoints (e.g. /api/v1/auth/login)
    pub auth_per_second: u32,
    /// Burst size for auth endpoints
    pub auth_burst: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    /// Optional path to a JSON file overriding the category keyword groups.
    pub category_keywords_file: Option<String>,
}

fn parse_bool(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let daily_at = match env::var("SCRAPE_DAILY_AT") {
            Ok(v) => NaiveTime::parse_from_str(&v, "%H:%M")
                .map_err(|_| ConfigError::InvalidValue("SCRAPE_DAILY_AT".to_string()))?,
            Err(_) => defaults.scheduler.daily_at,
        };

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                frontend_url: env::var("FRONTEND_URL")
                    .unwrap_or_else(|_| "http://localhost:5173".to_string()),
                public_url: env::var("PUBLIC_URL")
                    .unwrap_or_else(|_| "http://localhost:8000".to_string())
                    .trim_end_matches('/')
                    .to_string(),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/eventhub.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            jwt: JwtConfig {
                secret: env::var("JWT_SECRET")
                    .map_err(|_| ConfigError::MissingEnv("JWT_SECRET".to_string()))?,
                expiration_hours: env::var("JWT_EXPIRATION_HOURS")
                    .unwrap_or_else(|_| "24".to_string())
                    .parse()
                    .unwrap_or(24),
            },
            google: GoogleConfig {
                client_id: env::var("GOOGLE_CLIENT_ID").ok().filter(|v| !v.is_empty()),
                certs_url: env::var("GOOGLE_CERTS_URL")
                    .unwrap_or(defaults.google.certs_url),
                leeway_seconds: env::var("GOOGLE_LEEWAY_SECONDS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            mail: MailConfig {
                api_url: env::var("MAIL_API_URL").ok().filter(|v| !v.is_empty()),
                api_key: env::var("MAIL_API_KEY").ok(),
                from: env::var("MAIL_FROM").unwrap_or(defaults.mail.from),
                timeout_seconds: env::var("MAIL_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            },
            source: SourceConfig {
                name: env::var("SOURCE_NAME").unwrap_or(defaults.source.name),
                api_url: env::var("SOURCE_API_URL")
                    .unwrap_or(defaults.source.api_url)
                    .trim_end_matches('/')
                    .to_string(),
                api_token: env::var("SOURCE_API_TOKEN").ok(),
                max_pages: env::var("SOURCE_MAX_PAGES")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
                timeout_seconds: env::var("SOURCE_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
                retry_backoff_ms: env::var("SOURCE_RETRY_BACKOFF_MS")
                    .unwrap_or_else(|_| "2000".to_string())
                    .parse()
                    .unwrap_or(2000),
            },
            scheduler: SchedulerConfig {
                enabled: parse_bool("SCHEDULER_ENABLED", true),
                daily_at,
                city: env::var("SCRAPE_CITY").unwrap_or(defaults.scheduler.city),
            },
            uploads: UploadConfig {
                dir: env::var("UPLOAD_DIR").unwrap_or(defaults.uploads.dir),
                max_bytes: env::var("UPLOAD_MAX_BYTES")
                    .unwrap_or_else(|_| "10485760".to_string())
                    .parse()
                    .unwrap_or(10 * 1024 * 1024),
            },
            rate_limit: RateLimitConfig {
                auth_per_second: env::var("RATE_LIMIT_AUTH_PER_SECOND")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .unwrap_or(3),
                auth_burst: env::var("RATE_LIMIT_AUTH_BURST")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            },
            logging: LoggingConfig {
                json: env::var("LOG_FORMAT")
                    .map(|v| v.eq_ignore_ascii_case("json"))
                    .unwrap_or(false),
            },
            query: QueryConfig {
                category_keywords_file: env::var("CATEGORY_KEYWORDS_FILE").ok(),
            },
        })
    }
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
                port: 8000,
                frontend_url: "http://localhost:5173".to_string(),
                public_url: "http://localhost:8000".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://data/eventhub.db".to_string(),
                max_connections: 5,
            },
            jwt: JwtConfig {
                secret: String::new(),
                expiration_hours: 24,
            },
            google: GoogleConfig {
                client_id: None,
                certs_url: "https://www.googleapis.com/oauth2/v3/certs".to_string(),
                leeway_seconds: 5,
            },
            mail: MailConfig {
                api_url: None,
                api_key: None,
                from: "no-reply@eventhub.local".to_string(),
                timeout_seconds: 10,
            },
            source: SourceConfig {
                name: "eventbrite".to_string(),
                api_url: "https://www.eventbriteapi.com/v3".to_string(),
                api_token: None,
                max_pages: 5,
                timeout_seconds: 30,
                retry_backoff_ms: 2000,
            },
            scheduler: SchedulerConfig {
                enabled: true,
                daily_at: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
                city: "chennai".to_string(),
            },
            uploads: UploadConfig {
                dir: "uploads".to_string(),
                max_bytes: 10 * 1024 * 1024,
            },
            rate_limit: RateLimitConfig {
                auth_per_second: 3,
                auth_burst: 10,
            },
            logging: LoggingConfig { json: false },
            query: QueryConfig {
                category_keywords_file: None,
            },
        }
    }
}
