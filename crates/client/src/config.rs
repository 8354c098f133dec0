//! Client configuration.
//!
//! Defaults can be overridden from the environment (and a `.env` file):
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `SF_BASE_URL` | Base URL endpoints are resolved against | `http://localhost:8080` |
//! | `SF_MAX_ATTEMPTS` | Attempts per call | `3` |
//! | `SF_TIMEOUT_MS` | Per-attempt timeout | `30000` |
//! | `SF_BASE_DELAY_MS` | Delay before the first retry | `1000` |
//! | `SF_MAX_DELAY_MS` | Cap on any delay | `30000` |
//! | `SF_BACKOFF_MULTIPLIER` | Delay growth factor | `2.0` |
//! | `SF_JITTER` | Fraction a delay may be shortened by | `0.0` |
//! | `SF_BREAKER_THRESHOLD` | Consecutive failures that open the circuit | `5` |
//! | `SF_BREAKER_COOLDOWN_MS` | Time the circuit stays open | `60000` |

use std::str::FromStr;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::Url;

use crate::errors::ConfigError;
use crate::resilience::{CircuitBreakerConfig, RetryConfig};

const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Configuration for one [`ResilientClient`](crate::ResilientClient).
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub base_url: String,
    /// Default retry policy; per-call options override it.
    pub retry: RetryConfig,
    pub breaker: CircuitBreakerConfig,
    /// Sent with every request unless the call sets the same header.
    pub default_headers: HeaderMap,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            retry: RetryConfig::default(),
            breaker: CircuitBreakerConfig::default(),
            default_headers: HeaderMap::new(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Load configuration from the process environment, after reading `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let base_url = lookup("SF_BASE_URL").unwrap_or(defaults.base_url);
        validate_base_url(&base_url)?;

        let retry = RetryConfig {
            max_attempts: parse(&lookup, "SF_MAX_ATTEMPTS")?
                .unwrap_or(defaults.retry.max_attempts),
            timeout: parse_millis(&lookup, "SF_TIMEOUT_MS")?.unwrap_or(defaults.retry.timeout),
            base_delay: parse_millis(&lookup, "SF_BASE_DELAY_MS")?
                .unwrap_or(defaults.retry.base_delay),
            max_delay: parse_millis(&lookup, "SF_MAX_DELAY_MS")?
                .unwrap_or(defaults.retry.max_delay),
            backoff_multiplier: parse(&lookup, "SF_BACKOFF_MULTIPLIER")?
                .unwrap_or(defaults.retry.backoff_multiplier),
            jitter: parse(&lookup, "SF_JITTER")?.unwrap_or(defaults.retry.jitter),
        };
        if !(0.0..1.0).contains(&retry.jitter) {
            return Err(ConfigError::invalid_value("SF_JITTER", retry.jitter.to_string()));
        }

        let breaker = CircuitBreakerConfig {
            failure_threshold: parse(&lookup, "SF_BREAKER_THRESHOLD")?
                .unwrap_or(defaults.breaker.failure_threshold),
            cooldown: parse_millis(&lookup, "SF_BREAKER_COOLDOWN_MS")?
                .unwrap_or(defaults.breaker.cooldown),
        };

        Ok(Self {
            base_url,
            retry,
            breaker,
            default_headers: HeaderMap::new(),
        })
    }
}

fn validate_base_url(base_url: &str) -> Result<(), ConfigError> {
    let url = Url::parse(base_url).map_err(|e| ConfigError::InvalidBaseUrl(format!("{}: {}", base_url, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidBaseUrl(format!(
            "{}: unsupported scheme '{}'",
            base_url, other
        ))),
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::invalid_value(key, raw)),
    }
}

fn parse_millis<F>(lookup: &F, key: &str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(parse::<u64, F>(lookup, key)?.map(Duration::from_millis))
}
