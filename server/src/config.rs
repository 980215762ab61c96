//! Configuration management for the server.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use sheetsync_engine::RetryPolicy;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Interval between poll ticks of each sync job
    pub poll_interval: Duration,
    /// Backoff and stall detection for failing jobs
    pub retry: RetryPolicy,
    /// Timeout applied to every outbound HTTP request
    pub http_timeout: Duration,
    /// Path of the stored Google OAuth token
    pub google_token_path: String,
    /// Where users are sent when no Google token is stored
    pub google_login_url: Option<String>,
    pub google_sheets_base_url: String,
    pub google_calendar_base_url: String,
    /// Notion integration secret
    pub notion_api_key: String,
    /// Target Notion database
    pub notion_database_id: String,
    pub notion_base_url: String,
    /// Allowed CORS origins; empty means any
    pub cors_allowed_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3001".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?;

        let poll_interval = Duration::from_millis(parse_var("POLL_INTERVAL_MS", 1200)?);
        if poll_interval.is_zero() {
            return Err(ConfigError::Invalid("POLL_INTERVAL_MS"));
        }

        let retry = RetryPolicy {
            base_delay: Duration::from_millis(parse_var("RETRY_BASE_DELAY_MS", 1200)?),
            max_delay: Duration::from_millis(parse_var("RETRY_MAX_DELAY_MS", 60_000)?),
            stall_after: parse_var("STALL_AFTER_FAILURES", 10)?,
        };

        let http_timeout = Duration::from_millis(parse_var("HTTP_TIMEOUT_MS", 10_000)?);

        let google_token_path =
            env::var("GOOGLE_TOKEN_PATH").unwrap_or_else(|_| "token.json".to_string());
        let google_login_url = env::var("GOOGLE_LOGIN_URL").ok();
        let google_sheets_base_url = env::var("GOOGLE_SHEETS_BASE_URL")
            .unwrap_or_else(|_| "https://sheets.googleapis.com".to_string());
        let google_calendar_base_url = env::var("GOOGLE_CALENDAR_BASE_URL")
            .unwrap_or_else(|_| "https://www.googleapis.com".to_string());

        let notion_api_key =
            env::var("NOTION_API_KEY").map_err(|_| ConfigError::MissingNotionApiKey)?;

        let notion_database_id = match (
            env::var("NOTION_DATABASE_ID").ok(),
            env::var("NOTION_DATABASE_URL").ok(),
        ) {
            (Some(id), _) if !id.trim().is_empty() => id,
            (_, Some(url)) => database_id_from_url(&url).ok_or(ConfigError::InvalidNotionUrl)?,
            _ => return Err(ConfigError::MissingNotionDatabase),
        };

        let notion_base_url =
            env::var("NOTION_BASE_URL").unwrap_or_else(|_| "https://api.notion.com".to_string());

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .map(|v| split_list(&v))
            .unwrap_or_default();

        Ok(Self {
            host,
            port,
            database_url,
            poll_interval,
            retry,
            http_timeout,
            google_token_path,
            google_login_url,
            google_sheets_base_url,
            google_calendar_base_url,
            notion_api_key,
            notion_database_id,
            notion_base_url,
            cors_allowed_origins,
        })
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Extract a Notion database id from a database URL: the last path segment,
/// without query string.
pub fn database_id_from_url(url: &str) -> Option<String> {
    let path = url.split(|c| c == '?' || c == '#').next()?;
    let id = path.trim_end_matches('/').rsplit('/').next()?;
    if id.is_empty() || id.contains(':') {
        None
    } else {
        Some(id.to_string())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable is required")]
    MissingDatabaseUrl,

    #[error("NOTION_API_KEY environment variable is required")]
    MissingNotionApiKey,

    #[error("NOTION_DATABASE_ID or NOTION_DATABASE_URL environment variable is required")]
    MissingNotionDatabase,

    #[error("NOTION_DATABASE_URL does not contain a database id")]
    InvalidNotionUrl,

    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid {0} value")]
    Invalid(&'static str),
}
