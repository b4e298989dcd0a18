//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use membership_saga::{NotificationDispatch, OrchestratorSettings};
use resilience::{BackoffPolicy, BreakerSettings, RemoteClientSettings};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Delay schedule between retries of a remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    #[default]
    Constant,
    Exponential,
}

impl FromStr for RetryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "constant" => Ok(RetryPolicy::Constant),
            "exponential" => Ok(RetryPolicy::Exponential),
            other => Err(format!("unknown retry policy: {other}")),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default: `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL connection string; in-memory stores when unset
/// - `USERS_SERVICE_URL`, `PROJECTS_SERVICE_URL`, `NOTIFICATIONS_SERVICE_URL`: peer base URLs
/// - `BREAKER_FAILURE_THRESHOLD` (default: `0`), `BREAKER_COOL_DOWN_MS` (default: `2000`)
/// - `RETRY_ATTEMPTS` (default: `3`), `RETRY_DELAY_MS` (default: `100`),
///   `RETRY_POLICY`: `constant` or `exponential` (default: `constant`)
/// - `REMOTE_TIMEOUT_MS`: per-attempt ceiling for peer calls (default: `5000`)
/// - `REQUEST_DEADLINE_MS`: budget for all peer calls of one request (default: `10000`)
/// - `NOTIFICATION_DISPATCH`: `await` or `background` (default: `await`)
///
/// Unparseable values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub users_service_url: String,
    pub projects_service_url: String,
    pub notifications_service_url: String,
    pub breaker_failure_threshold: u32,
    pub breaker_cool_down: Duration,
    pub retry_attempts: usize,
    pub retry_delay: Duration,
    pub retry_policy: RetryPolicy,
    pub remote_timeout: Duration,
    pub request_deadline: Duration,
    pub notification_dispatch: NotificationDispatch,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let string = |key: &str, default: String| lookup(key).unwrap_or(default);
        let millis = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        Self {
            host: string("HOST", defaults.host),
            port: parse(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: string("RUST_LOG", defaults.log_level),
            log_format: parse(&lookup, "LOG_FORMAT").unwrap_or(defaults.log_format),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            users_service_url: string("USERS_SERVICE_URL", defaults.users_service_url),
            projects_service_url: string("PROJECTS_SERVICE_URL", defaults.projects_service_url),
            notifications_service_url: string(
                "NOTIFICATIONS_SERVICE_URL",
                defaults.notifications_service_url,
            ),
            breaker_failure_threshold: parse(&lookup, "BREAKER_FAILURE_THRESHOLD")
                .unwrap_or(defaults.breaker_failure_threshold),
            breaker_cool_down: millis("BREAKER_COOL_DOWN_MS", defaults.breaker_cool_down),
            retry_attempts: parse(&lookup, "RETRY_ATTEMPTS").unwrap_or(defaults.retry_attempts),
            retry_delay: millis("RETRY_DELAY_MS", defaults.retry_delay),
            retry_policy: parse(&lookup, "RETRY_POLICY").unwrap_or(defaults.retry_policy),
            remote_timeout: millis("REMOTE_TIMEOUT_MS", defaults.remote_timeout),
            request_deadline: millis("REQUEST_DEADLINE_MS", defaults.request_deadline),
            notification_dispatch: match lookup("NOTIFICATION_DISPATCH").as_deref() {
                Some("background") => NotificationDispatch::Background,
                Some("await") => NotificationDispatch::Await,
                _ => defaults.notification_dispatch,
            },
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn backoff(&self) -> BackoffPolicy {
        match self.retry_policy {
            RetryPolicy::Constant => BackoffPolicy::constant(self.retry_attempts, self.retry_delay),
            RetryPolicy::Exponential => BackoffPolicy::exponential(
                self.retry_attempts,
                self.retry_delay,
                self.remote_timeout,
            ),
        }
    }

    pub fn breaker(&self) -> BreakerSettings {
        BreakerSettings::default()
            .with_failure_threshold(self.breaker_failure_threshold)
            .with_cool_down(self.breaker_cool_down)
    }

    /// Builds client settings for one peer service.
    pub fn remote(&self, service: &str, base_url: &str) -> RemoteClientSettings {
        RemoteClientSettings::new(service, base_url)
            .with_attempt_timeout(self.remote_timeout)
            .with_backoff(self.backoff())
            .with_breaker(self.breaker())
    }

    pub fn orchestrator(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            dispatch: self.notification_dispatch,
        }
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            users_service_url: "http://users-service:8000".to_string(),
            projects_service_url: "http://projects-service:8000".to_string(),
            notifications_service_url: "http://notifications-service:8000".to_string(),
            breaker_failure_threshold: 0,
            breaker_cool_down: Duration::from_secs(2),
            retry_attempts: 3,
            retry_delay: Duration::from_millis(100),
            retry_policy: RetryPolicy::Constant,
            remote_timeout: Duration::from_secs(5),
            request_deadline: Duration::from_secs(10),
            notification_dispatch: NotificationDispatch::Await,
        }
    }
}
