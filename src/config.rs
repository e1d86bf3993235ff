use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::{ConfigError, LimitSpec, LimiterConfig};

const DEFAULT_PORT: u16 = 8985;
const DEFAULT_QUEUE_CAPACITY: usize = 2048;
const DEFAULT_ADMISSION_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_ADDITIONAL_WINDOW: Duration = Duration::from_millis(10);
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(20);

/// Configuration for a process embedding the limiter.
///
/// The limiter core reads nothing from the environment; this type is the one
/// place environment variables are interpreted.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Upstream API credentials; one limiter key slot per token.
    pub api_tokens: Vec<String>,
    /// Listen port for the embedding server.
    pub port: u16,
    pub queue_capacity: usize,
    /// How long the embedding server waits on `admit` before answering the
    /// client itself.
    pub admission_timeout: Duration,
    pub additional_window: Duration,
    pub shutdown_timeout: Duration,
    pub default_app_limits: Vec<LimitSpec>,
    pub metrics_enabled: bool,
}

impl RelayConfig {
    /// Loads configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key-value source.
    ///
    /// Unset or empty values fall back to defaults. Malformed values are all
    /// collected and reported together rather than one at a time.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut errors = Vec::new();

        let api_tokens = split_csv(lookup("RELAY_API_TOKENS").as_deref().unwrap_or(""));
        if api_tokens.is_empty() {
            errors.push("RELAY_API_TOKENS is required".to_string());
        }

        let port: u16 = parse_value(&lookup, "RELAY_PORT", DEFAULT_PORT, &mut errors);
        if port == 0 {
            errors.push("RELAY_PORT must be >= 1".to_string());
        }

        let queue_capacity: usize = parse_value(
            &lookup,
            "RELAY_QUEUE_CAPACITY",
            DEFAULT_QUEUE_CAPACITY,
            &mut errors,
        );
        if queue_capacity == 0 {
            errors.push("RELAY_QUEUE_CAPACITY must be >= 1".to_string());
        }

        let admission_timeout = parse_millis(
            &lookup,
            "RELAY_ADMISSION_TIMEOUT_MS",
            DEFAULT_ADMISSION_TIMEOUT,
            &mut errors,
        );
        let additional_window = parse_millis(
            &lookup,
            "RELAY_ADDITIONAL_WINDOW_MS",
            DEFAULT_ADDITIONAL_WINDOW,
            &mut errors,
        );
        let shutdown_timeout = parse_millis(
            &lookup,
            "RELAY_SHUTDOWN_TIMEOUT_MS",
            DEFAULT_SHUTDOWN_TIMEOUT,
            &mut errors,
        );

        let default_app_limits = parse_limit_specs(
            lookup("RELAY_DEFAULT_APP_LIMITS").as_deref().unwrap_or(""),
            "RELAY_DEFAULT_APP_LIMITS",
            &mut errors,
        );

        let metrics_enabled = parse_bool(&lookup, "RELAY_ENABLE_METRICS", true, &mut errors);

        if !errors.is_empty() {
            return Err(ConfigError::InvalidEnvironment(errors));
        }

        Ok(Self {
            api_tokens,
            port,
            queue_capacity,
            admission_timeout,
            additional_window,
            shutdown_timeout,
            default_app_limits,
            metrics_enabled,
        })
    } // end method from_lookup

    /// Projects the limiter-relevant fields into a [`LimiterConfig`].
    pub fn limiter_config(&self) -> LimiterConfig {
        LimiterConfig {
            key_count: self.api_tokens.len(),
            queue_capacity: self.queue_capacity,
            additional_window: self.additional_window,
            default_app_limits: self.default_app_limits.clone(),
            ..LimiterConfig::default()
        }
    }
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_value<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
    errors: &mut Vec<String>,
) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return default;
    }

    match raw.parse() {
        Ok(value) => value,
        Err(err) => {
            errors.push(format!("{key} must be an integer: {err}"));
            default
        }
    }
}

fn parse_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
    errors: &mut Vec<String>,
) -> Duration {
    let millis = parse_value(lookup, key, default.as_millis() as u64, errors);
    Duration::from_millis(millis)
}

fn parse_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: bool,
    errors: &mut Vec<String>,
) -> bool {
    let Some(raw) = lookup(key) else {
        return default;
    };

    match raw.trim() {
        "" => default,
        "1" => true,
        "0" => false,
        other => match other.parse() {
            Ok(value) => value,
            Err(_) => {
                errors.push(format!("{key} must be a boolean"));
                default
            }
        },
    }
}

/// Parses the `"limit:windowSeconds(,limit:windowSeconds)*"` grammar used for
/// default app limits. Unlike wire-header parsing, malformed entries here are
/// configuration mistakes and are reported.
fn parse_limit_specs(raw: &str, key: &str, errors: &mut Vec<String>) -> Vec<LimitSpec> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }

    let mut specs = Vec::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        let Some((limit_part, window_part)) = entry.split_once(':') else {
            errors.push(format!("{key} entries must look like \"20:1\", got {entry:?}"));
            continue;
        };

        match (limit_part.parse::<u32>(), window_part.parse::<u64>()) {
            (Ok(limit), Ok(secs)) if limit > 0 && secs > 0 => {
                specs.push(LimitSpec {
                    limit,
                    window: Duration::from_secs(secs),
                });
            }
            _ => errors.push(format!(
                "{key} entries need a positive limit and window, got {entry:?}"
            )),
        }
    }
    specs
}
