//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use resilience::{BreakerSettings, CacheSettings};
use saga::{RetryPolicy, SagaSubjects};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` / `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `json` for JSON lines, anything else for human output
/// - `CREATE_ACCOMMODATION_COMMAND_SUBJECT` / `CREATE_ACCOMMODATION_REPLY_SUBJECT`
/// - `QUEUE_GROUP` (default `accommodation_service`)
/// - `AUTH_SERVICE_URL` (default `http://auth-service:8000`)
/// - `BREAKER_TRIP_AFTER`, `BREAKER_COOL_DOWN_SECS`, `BREAKER_CALL_TIMEOUT_MS`
/// - `SAGA_MAX_ATTEMPTS`, `SAGA_REPLY_TIMEOUT_MS`, `SAGA_BACKOFF_MS`
/// - `CREATE_WAIT_MS`: how long a create request waits for the saga outcome
/// - `SHUTDOWN_GRACE_SECS`: drain time for in-flight sagas
/// - `CACHE_CAPACITY` (unset means unbounded), `CACHE_FETCH_TIMEOUT_MS`
/// - `ASSET_ROOT`: directory holding accommodation images
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub command_subject: String,
    pub reply_subject: String,
    pub queue_group: String,
    pub auth_service_url: String,
    pub breaker_trip_after: u32,
    pub breaker_cool_down: Duration,
    pub breaker_call_timeout: Duration,
    pub saga_max_attempts: u32,
    pub saga_reply_timeout: Duration,
    pub saga_backoff: Duration,
    pub create_wait: Duration,
    pub shutdown_grace: Duration,
    pub cache_capacity: Option<usize>,
    pub cache_fetch_timeout: Duration,
    pub asset_root: PathBuf,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults for
    /// missing or unparsable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let millis = |key: &str, default: Duration| {
            parsed(key).map(Duration::from_millis).unwrap_or(default)
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            command_subject: lookup("CREATE_ACCOMMODATION_COMMAND_SUBJECT")
                .unwrap_or(defaults.command_subject),
            reply_subject: lookup("CREATE_ACCOMMODATION_REPLY_SUBJECT")
                .unwrap_or(defaults.reply_subject),
            queue_group: lookup("QUEUE_GROUP").unwrap_or(defaults.queue_group),
            auth_service_url: lookup("AUTH_SERVICE_URL").unwrap_or(defaults.auth_service_url),
            breaker_trip_after: parsed("BREAKER_TRIP_AFTER")
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(defaults.breaker_trip_after),
            breaker_cool_down: parsed("BREAKER_COOL_DOWN_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.breaker_cool_down),
            breaker_call_timeout: millis("BREAKER_CALL_TIMEOUT_MS", defaults.breaker_call_timeout),
            saga_max_attempts: parsed("SAGA_MAX_ATTEMPTS")
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(defaults.saga_max_attempts),
            saga_reply_timeout: millis("SAGA_REPLY_TIMEOUT_MS", defaults.saga_reply_timeout),
            saga_backoff: millis("SAGA_BACKOFF_MS", defaults.saga_backoff),
            create_wait: millis("CREATE_WAIT_MS", defaults.create_wait),
            shutdown_grace: parsed("SHUTDOWN_GRACE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_grace),
            cache_capacity: parsed("CACHE_CAPACITY")
                .and_then(|v| usize::try_from(v).ok())
                .or(defaults.cache_capacity),
            cache_fetch_timeout: millis("CACHE_FETCH_TIMEOUT_MS", defaults.cache_fetch_timeout),
            asset_root: lookup("ASSET_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.asset_root),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn subjects(&self) -> SagaSubjects {
        SagaSubjects::new(
            self.command_subject.clone(),
            self.reply_subject.clone(),
            self.queue_group.clone(),
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.saga_max_attempts, self.saga_reply_timeout)
            .with_backoff(self.saga_backoff, self.saga_backoff * 8)
    }

    pub fn breaker_settings(&self) -> BreakerSettings {
        BreakerSettings::new("auth")
            .trip_after(self.breaker_trip_after)
            .cool_down(self.breaker_cool_down)
            .call_timeout(self.breaker_call_timeout)
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            capacity: self.cache_capacity,
            fetch_timeout: self.cache_fetch_timeout,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            command_subject: saga::create_accommodation::DEFAULT_COMMAND_SUBJECT.to_string(),
            reply_subject: saga::create_accommodation::DEFAULT_REPLY_SUBJECT.to_string(),
            queue_group: saga::create_accommodation::DEFAULT_QUEUE_GROUP.to_string(),
            auth_service_url: "http://auth-service:8000".to_string(),
            breaker_trip_after: 3,
            breaker_cool_down: Duration::from_secs(10),
            breaker_call_timeout: Duration::from_secs(5),
            saga_max_attempts: 3,
            saga_reply_timeout: Duration::from_secs(5),
            saga_backoff: Duration::from_millis(200),
            create_wait: Duration::from_secs(20),
            shutdown_grace: Duration::from_secs(10),
            cache_capacity: None,
            cache_fetch_timeout: Duration::from_secs(5),
            asset_root: PathBuf::from("./data/assets"),
        }
    }
}
