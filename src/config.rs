//! Configuration module for the ghardaar application.
//!
//! Loaded from raw environment variables with figment; each field maps to the
//! upper-case variable of the same name (`DATABASE_URL`, `RATE_LIMIT_INTERVAL`).

use figment::Figment;
use figment::providers::Env;
use fundu::{DurationParser, TimeUnit};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

use crate::rate_limit::{
    DEFAULT_INTERVAL, DEFAULT_MAX_REQUESTS, DEFAULT_RETENTION, DEFAULT_SWEEP_INTERVAL,
    RateLimitConfig,
};

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    /// Log level for the application's own modules (`RUST_LOG` overrides it)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Port for the web server
    #[serde(default = "default_port")]
    pub port: u16,
    pub database_url: String,

    /// Base URL of the hosted auth service
    pub supabase_url: String,
    /// Public key used to validate session tokens
    pub supabase_anon_key: Option<String>,
    /// Privileged key for account management
    pub supabase_service_role_key: Option<String>,

    pub gemini_api_key: Option<String>,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    pub google_sheets_private_key: Option<String>,
    pub google_sheets_client_email: Option<String>,
    pub google_sheets_spreadsheet_id: Option<String>,

    #[serde(default = "default_rate_limit_max_requests")]
    pub rate_limit_max_requests: u32,
    #[serde(
        default = "default_rate_limit_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub rate_limit_interval: Duration,
    /// How often idle rate limit entries are evicted
    #[serde(
        default = "default_rate_limit_sweep_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub rate_limit_sweep_interval: Duration,
    /// Idle time after which an entry is evicted
    #[serde(
        default = "default_rate_limit_retention",
        deserialize_with = "deserialize_duration"
    )]
    pub rate_limit_retention: Duration,

    /// Graceful shutdown timeout
    ///
    /// Accepts `"8s"`, `"500ms"`, `"1m"` or a bare number of seconds.
    #[serde(
        default = "default_shutdown_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub shutdown_timeout: Duration,
}

impl Config {
    /// Extract from the process environment.
    pub fn from_env() -> Result<Self, figment::Error> {
        Figment::new().merge(Env::raw()).extract()
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            interval: self.rate_limit_interval,
            max_requests: self.rate_limit_max_requests,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_gemini_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_rate_limit_max_requests() -> u32 {
    DEFAULT_MAX_REQUESTS
}

fn default_rate_limit_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_rate_limit_sweep_interval() -> Duration {
    DEFAULT_SWEEP_INTERVAL
}

fn default_rate_limit_retention() -> Duration {
    DEFAULT_RETENTION
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(8)
}

/// Parse a duration string; bare numbers are seconds.
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let parser = DurationParser::with_time_units(&[
        TimeUnit::MilliSecond,
        TimeUnit::Second,
        TimeUnit::Minute,
        TimeUnit::Hour,
    ]);
    let parsed = parser
        .parse(value.trim())
        .map_err(|e| format!("invalid duration {value:?}: {e}"))?;
    Duration::try_from(parsed).map_err(|e| format!("invalid duration {value:?}: {e}"))
}

/// Figment hands bare numeric env values over as integers, so both shapes are accepted.
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};
    use std::fmt;

    struct DurationVisitor;

    impl Visitor<'_> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a duration string (\"30s\", \"5m\") or a number of seconds")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Duration, E> {
            parse_duration(value).map_err(E::custom)
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Duration, E> {
            Ok(Duration::from_secs(value))
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Duration, E> {
            u64::try_from(value)
                .map(Duration::from_secs)
                .map_err(|_| E::custom("duration cannot be negative"))
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> Result<Duration, E> {
            Duration::try_from_secs_f64(value).map_err(E::custom)
        }
    }

    deserializer.deserialize_any(DurationVisitor)
}
