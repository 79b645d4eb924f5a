//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use reservation::ConflictPolicy;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL connection string (default: unset, in-memory stores)
/// - `MAX_CONFLICT_ATTEMPTS`: reservation attempts per product (default: `5`)
/// - `CONFLICT_BACKOFF_MS`: first retry delay (default: `5`)
/// - `CONFLICT_BACKOFF_CAP_MS`: longest retry delay (default: `100`)
/// - `PLACEMENT_DEADLINE_MS`: reserve-phase deadline (default: unset, no deadline)
///
/// Values that fail to parse fall back to their defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub max_conflict_attempts: u32,
    pub conflict_backoff_ms: u64,
    pub conflict_backoff_cap_ms: u64,
    pub placement_deadline_ms: Option<u64>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            max_conflict_attempts: parse(&lookup, "MAX_CONFLICT_ATTEMPTS")
                .unwrap_or(defaults.max_conflict_attempts),
            conflict_backoff_ms: parse(&lookup, "CONFLICT_BACKOFF_MS")
                .unwrap_or(defaults.conflict_backoff_ms),
            conflict_backoff_cap_ms: parse(&lookup, "CONFLICT_BACKOFF_CAP_MS")
                .unwrap_or(defaults.conflict_backoff_cap_ms),
            placement_deadline_ms: parse(&lookup, "PLACEMENT_DEADLINE_MS"),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Retry policy for stock conflicts.
    pub fn conflict_policy(&self) -> ConflictPolicy {
        ConflictPolicy::builder()
            .max_attempts(self.max_conflict_attempts)
            .base_delay(Duration::from_millis(self.conflict_backoff_ms))
            .max_delay(Duration::from_millis(self.conflict_backoff_cap_ms))
            .build()
    }

    /// Deadline for reserving all items of one order, if any.
    pub fn placement_deadline(&self) -> Option<Duration> {
        self.placement_deadline_ms.map(Duration::from_millis)
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            max_conflict_attempts: 5,
            conflict_backoff_ms: 5,
            conflict_backoff_cap_ms: 100,
            placement_deadline_ms: None,
        }
    }
}
