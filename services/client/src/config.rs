use reqwest::Url;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_CREDENTIALS_PATH: &str = "./.agentflow/credentials.json";
pub const DEFAULT_LOGIN_ROUTE: &str = "/login";

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL every endpoint path is appended to.
    pub base_url: Url,
    pub log_level: Level,
    /// File backing the durable credential tier.
    pub credentials_path: PathBuf,
    /// Pause between the session-expired notice and the re-authentication redirect.
    pub reauth_delay: Duration,
    /// Where the user is sent once their session can no longer be renewed.
    pub login_route: String,
    /// Timeout for ordinary requests. Stream sessions are not bound by it.
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Builds a configuration with default settings against `base_url`.
    pub fn with_base_url(base_url: Url) -> Self {
        Self {
            base_url,
            log_level: Level::INFO,
            credentials_path: PathBuf::from(DEFAULT_CREDENTIALS_PATH),
            reauth_delay: Duration::from_millis(1000),
            login_route: DEFAULT_LOGIN_ROUTE.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let base_url_str = non_empty_var("AGENTFLOW_API_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base_url_str).map_err(|e| {
            ConfigError::InvalidValue("AGENTFLOW_API_BASE_URL".to_string(), e.to_string())
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidValue(
                "AGENTFLOW_API_BASE_URL".to_string(),
                format!("'{}' cannot be used as a base URL", base_url_str),
            ));
        }

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let credentials_path = non_empty_var("AGENTFLOW_CREDENTIALS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CREDENTIALS_PATH));

        let reauth_delay =
            Duration::from_millis(parse_u64_var("AGENTFLOW_REAUTH_DELAY_MS", 1000)?);

        let login_route = non_empty_var("AGENTFLOW_LOGIN_ROUTE")
            .unwrap_or_else(|| DEFAULT_LOGIN_ROUTE.to_string());

        let request_timeout =
            Duration::from_secs(parse_u64_var("AGENTFLOW_REQUEST_TIMEOUT_SECS", 30)?);
        if request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "AGENTFLOW_REQUEST_TIMEOUT_SECS".to_string(),
                "timeout must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            base_url,
            log_level,
            credentials_path,
            reauth_delay,
            login_route,
            request_timeout,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_u64_var(name: &str, default: u64) -> Result<u64, ConfigError> {
    match non_empty_var(name) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}
