//! Process configuration
//!
//! Everything is read from the environment (a `.env` file is honoured by the
//! binaries through `dotenv`) and can be overridden by command-line flags.

use crate::error::{ArgoError, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Unit raw ingestion timestamps are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Milliseconds,
    Microseconds,
    Nanoseconds,
}

impl TimeUnit {
    /// Converts a raw count in this unit to epoch milliseconds, flooring
    /// sub-millisecond precision.
    pub fn to_millis(self, raw: i128) -> Option<i64> {
        let millis = match self {
            TimeUnit::Seconds => raw.checked_mul(1_000)?,
            TimeUnit::Milliseconds => raw,
            TimeUnit::Microseconds => raw.div_euclid(1_000),
            TimeUnit::Nanoseconds => raw.div_euclid(1_000_000),
        };
        i64::try_from(millis).ok()
    }

    pub fn float_to_millis(self, raw: f64) -> Option<i64> {
        if !raw.is_finite() {
            return None;
        }
        let millis = match self {
            TimeUnit::Seconds => raw * 1e3,
            TimeUnit::Milliseconds => raw,
            TimeUnit::Microseconds => raw / 1e3,
            TimeUnit::Nanoseconds => raw / 1e6,
        }
        .round();
        if millis.abs() < i64::MAX as f64 {
            Some(millis as i64)
        } else {
            None
        }
    }
}

impl FromStr for TimeUnit {
    type Err = ArgoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "s" | "sec" | "secs" | "seconds" => Ok(TimeUnit::Seconds),
            "ms" | "millis" | "milliseconds" => Ok(TimeUnit::Milliseconds),
            "us" | "micros" | "microseconds" => Ok(TimeUnit::Microseconds),
            "ns" | "nanos" | "nanoseconds" => Ok(TimeUnit::Nanoseconds),
            other => Err(ArgoError::Config(format!("Unknown time unit '{}'", other))),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimeUnit::Seconds => "s",
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Microseconds => "us",
            TimeUnit::Nanoseconds => "ns",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_host: String,
    pub port: u16,
    pub database_path: PathBuf,

    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,

    /// Half-width in degrees of the range a lat/lon proximity expands to
    pub proximity_tolerance: f64,
    pub ingest_time_unit: TimeUnit,
    pub result_limit: usize,

    pub llm_timeout: Duration,
    pub store_timeout: Duration,
    pub read_timeout: Duration,
    pub max_body_bytes: usize,
    pub history_size: usize,
}

impl AppConfig {
    pub const DEFAULT_PROXIMITY_TOLERANCE: f64 = 0.4;
    pub const DEFAULT_RESULT_LIMIT: usize = 50;
    pub const DEFAULT_GEMINI_BASE_URL: &'static str =
        "https://generativelanguage.googleapis.com/v1beta";

    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            bind_host: get("ARGO_BIND_HOST").unwrap_or(defaults.bind_host),
            port: parse_or(get("PORT"), "PORT", defaults.port)?,
            database_path: get("ARGO_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_model: get("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_base_url: get("GEMINI_BASE_URL").unwrap_or(defaults.gemini_base_url),
            proximity_tolerance: parse_or(
                get("ARGO_PROXIMITY_TOLERANCE"),
                "ARGO_PROXIMITY_TOLERANCE",
                defaults.proximity_tolerance,
            )?,
            ingest_time_unit: match get("ARGO_INGEST_TIME_UNIT") {
                Some(v) => v.parse()?,
                None => defaults.ingest_time_unit,
            },
            result_limit: parse_or(
                get("ARGO_RESULT_LIMIT"),
                "ARGO_RESULT_LIMIT",
                defaults.result_limit,
            )?,
            llm_timeout: secs_or(get("ARGO_LLM_TIMEOUT_SECS"), "ARGO_LLM_TIMEOUT_SECS", defaults.llm_timeout)?,
            store_timeout: secs_or(
                get("ARGO_STORE_TIMEOUT_SECS"),
                "ARGO_STORE_TIMEOUT_SECS",
                defaults.store_timeout,
            )?,
            read_timeout: secs_or(
                get("ARGO_READ_TIMEOUT_SECS"),
                "ARGO_READ_TIMEOUT_SECS",
                defaults.read_timeout,
            )?,
            max_body_bytes: parse_or(
                get("ARGO_MAX_BODY_BYTES"),
                "ARGO_MAX_BODY_BYTES",
                defaults.max_body_bytes,
            )?,
            history_size: parse_or(
                get("ARGO_HISTORY_SIZE"),
                "ARGO_HISTORY_SIZE",
                defaults.history_size,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.proximity_tolerance.is_finite() || self.proximity_tolerance < 0.0 {
            return Err(ArgoError::Config(format!(
                "Proximity tolerance must be a non-negative number, got {}",
                self.proximity_tolerance
            )));
        }
        if self.result_limit == 0 {
            return Err(ArgoError::Config("Result limit must be at least 1".to_string()));
        }
        for (name, timeout) in [
            ("LLM", self.llm_timeout),
            ("store", self.store_timeout),
            ("read", self.read_timeout),
        ] {
            if timeout.is_zero() {
                return Err(ArgoError::Config(format!("{} timeout must be non-zero", name)));
            }
        }
        if self.max_body_bytes == 0 {
            return Err(ArgoError::Config("Max body size must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 5000,
            database_path: PathBuf::from("argo_profiles.db"),
            gemini_api_key: None,
            gemini_model: "gemini-2.0-flash".to_string(),
            gemini_base_url: Self::DEFAULT_GEMINI_BASE_URL.to_string(),
            proximity_tolerance: Self::DEFAULT_PROXIMITY_TOLERANCE,
            ingest_time_unit: TimeUnit::Nanoseconds,
            result_limit: Self::DEFAULT_RESULT_LIMIT,
            llm_timeout: Duration::from_secs(30),
            store_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(5),
            max_body_bytes: 10 * 1024 * 1024,
            history_size: 100,
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> Result<T> {
    match value {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ArgoError::Config(format!("Invalid value for {}: '{}'", key, v))),
        None => Ok(default),
    }
}

fn secs_or(value: Option<String>, key: &str, default: Duration) -> Result<Duration> {
    let secs: u64 = parse_or(value, key, default.as_secs())?;
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.result_limit, 50);
        assert_eq!(config.proximity_tolerance, 0.4);
        assert_eq!(config.ingest_time_unit, TimeUnit::Nanoseconds);
        assert!(config.gemini_api_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("ARGO_PROXIMITY_TOLERANCE", "0.01"),
            ("ARGO_INGEST_TIME_UNIT", "microseconds"),
            ("GEMINI_API_KEY", "secret"),
            ("ARGO_LLM_TIMEOUT_SECS", "3"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.proximity_tolerance, 0.01);
        assert_eq!(config.ingest_time_unit, TimeUnit::Microseconds);
        assert_eq!(config.gemini_api_key.as_deref(), Some("secret"));
        assert_eq!(config.llm_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(AppConfig::from_lookup(lookup(&[("PORT", "abc")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("ARGO_RESULT_LIMIT", "0")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("ARGO_PROXIMITY_TOLERANCE", "-1")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("ARGO_INGEST_TIME_UNIT", "fortnights")])).is_err());
    }

    #[test]
    fn test_time_unit_conversion() {
        assert_eq!(
            TimeUnit::Nanoseconds.to_millis(1_609_459_200_000_000_000),
            Some(1_609_459_200_000)
        );
        assert_eq!(TimeUnit::Microseconds.to_millis(1_500_999), Some(1_500));
        assert_eq!(TimeUnit::Seconds.to_millis(2), Some(2_000));
        assert_eq!(TimeUnit::Nanoseconds.float_to_millis(1.6094592e18), Some(1_609_459_200_000));
        assert_eq!(TimeUnit::Milliseconds.float_to_millis(f64::NAN), None);
    }
}
