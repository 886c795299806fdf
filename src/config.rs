use std::time::Duration;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "Caseflow";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default case service endpoint (local backend during development).
pub const DEFAULT_API_URL: &str = "http://localhost:8080/api";

/// Default page size for case and report lists.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// List views debounce between 300 and 1000 ms; 500 is the middle ground.
pub const DEFAULT_LIST_DEBOUNCE_MS: u64 = 500;
pub const LIST_DEBOUNCE_RANGE_MS: (u64, u64) = (300, 1000);

/// Autocomplete rows use a fixed short window.
pub const DEFAULT_SUGGEST_DEBOUNCE_MS: u64 = 300;

/// Queries shorter than this never reach the server.
pub const MIN_QUERY_LEN: usize = 2;

pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "caseflow_lib=info,warn"
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },

    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },

    #[error("{var} must be between {min} and {max}")]
    OutOfRange {
        var: &'static str,
        min: u64,
        max: u64,
    },
}

/// Runtime configuration for the store client and the list/search views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub page_size: u32,
    pub list_debounce: Duration,
    pub suggestion_debounce: Duration,
    pub min_query_len: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            page_size: DEFAULT_PAGE_SIZE,
            list_debounce: Duration::from_millis(DEFAULT_LIST_DEBOUNCE_MS),
            suggestion_debounce: Duration::from_millis(DEFAULT_SUGGEST_DEBOUNCE_MS),
            min_query_len: MIN_QUERY_LEN,
        }
    }
}

impl ReconcilerConfig {
    /// Defaults overridden by `CASEFLOW_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = lookup("CASEFLOW_API_URL") {
            let url = url.trim().trim_end_matches('/').to_string();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidValue {
                    var: "CASEFLOW_API_URL",
                    value: url,
                });
            }
            config.api_base_url = url;
        }
        if let Some(size) = parse_positive(&lookup, "CASEFLOW_PAGE_SIZE")? {
            config.page_size = u32::try_from(size).map_err(|_| ConfigError::InvalidValue {
                var: "CASEFLOW_PAGE_SIZE",
                value: size.to_string(),
            })?;
        }
        if let Some(ms) = parse_positive(&lookup, "CASEFLOW_LIST_DEBOUNCE_MS")? {
            let (min, max) = LIST_DEBOUNCE_RANGE_MS;
            if !(min..=max).contains(&ms) {
                return Err(ConfigError::OutOfRange {
                    var: "CASEFLOW_LIST_DEBOUNCE_MS",
                    min,
                    max,
                });
            }
            config.list_debounce = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_positive(&lookup, "CASEFLOW_SUGGEST_DEBOUNCE_MS")? {
            config.suggestion_debounce = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_positive(&lookup, "CASEFLOW_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }

        tracing::debug!(
            api = %config.api_base_url,
            page_size = config.page_size,
            list_debounce_ms = config.list_debounce.as_millis() as u64,
            "Configuration loaded"
        );
        Ok(config)
    }
}

fn parse_positive(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<u64>, ConfigError> {
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    let value: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var,
        value: raw.clone(),
    })?;
    if value == 0 {
        return Err(ConfigError::Zero { var });
    }
    Ok(Some(value))
}
