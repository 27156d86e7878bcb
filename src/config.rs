//! Runtime Configuration
//!
//! Settings for one analytics run, read from environment variables.

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::dune::DEFAULT_API_URL;
use crate::fetcher::DEFAULT_PAGE_SIZE;
use crate::labels::default_cache_path;
use crate::poller::PollerConfig;

/// Default ranking size
pub const DEFAULT_TOP_COUNT: usize = 25;

/// Default analysed period in days
pub const DEFAULT_PERIOD_DAYS: u32 = 30;

/// Default report path
pub const DEFAULT_OUTPUT_PATH: &str = "multisend_rankings.json";

/// Query parameter carrying the period length
pub const PERIOD_PARAMETER: &str = "days";

pub const ENV_API_KEY: &str = "DUNE_API_KEY";
pub const ENV_API_URL: &str = "DUNE_API_URL";
pub const ENV_QUERY_ID: &str = "TXNSCOPE_QUERY_ID";
pub const ENV_PERIOD_DAYS: &str = "TXNSCOPE_PERIOD_DAYS";
pub const ENV_PAGE_SIZE: &str = "TXNSCOPE_PAGE_SIZE";
pub const ENV_TOP_COUNT: &str = "TXNSCOPE_TOP_COUNT";
pub const ENV_MAX_POLL_ATTEMPTS: &str = "TXNSCOPE_MAX_POLL_ATTEMPTS";
pub const ENV_OUTPUT: &str = "TXNSCOPE_OUTPUT";
pub const ENV_LABEL_CACHE: &str = "TXNSCOPE_LABEL_CACHE";
pub const ENV_EXECUTE: &str = "TXNSCOPE_EXECUTE";

/// Errors that can occur while loading configuration
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Configuration for one analytics run
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    pub api_key: String,
    pub api_url: String,
    pub query_id: u64,
    pub period_days: u32,
    pub page_size: usize,
    pub top_count: usize,
    /// Start a fresh execution instead of reading the latest results
    pub execute: bool,
    pub output_path: PathBuf,
    pub label_cache_path: Option<PathBuf>,
    pub poller: PollerConfig,
}

impl AnalyticsConfig {
    /// Config with defaults for everything but the credentials and query
    pub fn new(api_key: impl Into<String>, query_id: u64) -> Self {
        Self {
            api_key: api_key.into(),
            api_url: DEFAULT_API_URL.to_string(),
            query_id,
            period_days: DEFAULT_PERIOD_DAYS,
            page_size: DEFAULT_PAGE_SIZE,
            top_count: DEFAULT_TOP_COUNT,
            execute: false,
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            label_cache_path: default_cache_path(),
            poller: PollerConfig::default(),
        }
    }

    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_key = get(ENV_API_KEY).ok_or(ConfigError::Missing(ENV_API_KEY))?;
        let query_id = get(ENV_QUERY_ID)
            .ok_or(ConfigError::Missing(ENV_QUERY_ID))
            .and_then(|v| parse_value(ENV_QUERY_ID, &v))?;

        let mut config = Self::new(api_key, query_id);
        if let Some(url) = get(ENV_API_URL) {
            config.api_url = url;
        }
        if let Some(v) = get(ENV_PERIOD_DAYS) {
            config.period_days = parse_value(ENV_PERIOD_DAYS, &v)?;
        }
        if let Some(v) = get(ENV_PAGE_SIZE) {
            config.page_size = parse_value(ENV_PAGE_SIZE, &v)?;
        }
        if let Some(v) = get(ENV_TOP_COUNT) {
            config.top_count = parse_value(ENV_TOP_COUNT, &v)?;
        }
        if let Some(v) = get(ENV_MAX_POLL_ATTEMPTS) {
            config.poller.max_attempts = parse_value(ENV_MAX_POLL_ATTEMPTS, &v)?;
        }
        if let Some(v) = get(ENV_EXECUTE) {
            config.execute = parse_flag(ENV_EXECUTE, &v)?;
        }
        if let Some(v) = get(ENV_OUTPUT) {
            config.output_path = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_LABEL_CACHE) {
            config.label_cache_path = Some(PathBuf::from(v));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid {
                name: ENV_PAGE_SIZE,
                value: "0".to_string(),
            });
        }
        if self.poller.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: ENV_MAX_POLL_ATTEMPTS,
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_value<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        value: value.to_string(),
    })
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        }),
    }
}
