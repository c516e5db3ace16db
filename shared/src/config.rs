use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::capabilities::http::MAX_TIMEOUT_MS;
use crate::model::FeedFilter;
use crate::{
    DEFAULT_API_BASE_URL, DEFAULT_DEBOUNCE_MS, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_REQUEST_TIMEOUT_MS, MIN_QUERY_CHARS,
};

pub const ENV_API_URL: &str = "LOSTFOUND_API_URL";
pub const ENV_TIMEOUT_MS: &str = "LOSTFOUND_TIMEOUT_MS";
pub const ENV_DEBOUNCE_MS: &str = "LOSTFOUND_DEBOUNCE_MS";
pub const ENV_POLL_INTERVAL_MS: &str = "LOSTFOUND_POLL_INTERVAL_MS";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid base url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} of {value}ms exceeds maximum of {max}ms")]
    TooLarge {
        field: &'static str,
        value: u64,
        max: u64,
    },

    #[error("environment variable {var} is not a number: {value}")]
    NotANumber { var: &'static str, value: String },
}

/// Tunables for the sync core. Everything time-based is in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
    pub debounce_ms: u64,
    pub poll_interval_ms: u64,
    pub min_query_chars: usize,
    pub feed: FeedFilter,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            min_query_chars: MIN_QUERY_CHARS,
            feed: FeedFilter::All,
        }
    }
}

impl CoreConfig {
    /// Defaults overlaid with whatever `LOSTFOUND_*` variables are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_API_URL) {
            config.base_url = url;
        }
        if let Some(ms) = parse_ms(&lookup, ENV_TIMEOUT_MS)? {
            config.request_timeout_ms = ms;
        }
        if let Some(ms) = parse_ms(&lookup, ENV_DEBOUNCE_MS)? {
            config.debounce_ms = ms;
        }
        if let Some(ms) = parse_ms(&lookup, ENV_POLL_INTERVAL_MS)? {
            config.poll_interval_ms = ms;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let parsed = Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl {
                url: self.base_url.clone(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }
        if parsed.host_str().is_none() {
            return Err(ConfigError::InvalidBaseUrl {
                url: self.base_url.clone(),
                reason: "missing host".to_string(),
            });
        }

        for (field, value) in [
            ("request_timeout_ms", self.request_timeout_ms),
            ("debounce_ms", self.debounce_ms),
            ("poll_interval_ms", self.poll_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }

        if self.request_timeout_ms > MAX_TIMEOUT_MS {
            return Err(ConfigError::TooLarge {
                field: "request_timeout_ms",
                value: self.request_timeout_ms,
                max: MAX_TIMEOUT_MS,
            });
        }

        if self.min_query_chars == 0 {
            return Err(ConfigError::Zero {
                field: "min_query_chars",
            });
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn parse_ms<F>(lookup: &F, var: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::NotANumber { var, value: raw }),
    }
}
