//! Run configuration.
//!
//! Built once by the binary (after `.env` has been loaded) and passed by
//! reference into each stage. Nothing below `main` reads the environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_TABLE: &str = "air_quality_data";
pub const DEFAULT_BATCH_SIZE: usize = 200;
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_BACKOFF_MS: u64 = 1000;
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Connection settings for the remote table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub url: String,
    pub key: String,
    pub table: String,
    pub page_size: usize,
}

/// Retry behaviour of the batch committer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub batch_size: usize,
    pub max_retries: u32,
    /// Delay before retry `n` is `2^n` of these.
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_unit: Duration::from_millis(DEFAULT_BACKOFF_MS),
        }
    }
}

/// Optional S3 destination for analysis artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishConfig {
    pub bucket: String,
    pub prefix: String,
    pub gzip: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub raw_dir: PathBuf,
    pub staged_csv: PathBuf,
    pub processed_dir: PathBuf,
    pub retry: RetryPolicy,
    /// `None` when credentials are absent; only load/analyze need them.
    pub store: Option<StoreConfig>,
    pub publish: Option<PublishConfig>,
}

impl Config {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let batch_size = parse_number(&get, "BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
        if batch_size == 0 {
            return Err(ConfigError::OutOfRange {
                name: "BATCH_SIZE",
                reason: "must be at least 1",
            });
        }
        let max_retries = parse_number(&get, "LOAD_MAX_RETRIES", DEFAULT_MAX_RETRIES)?;
        let backoff_ms = parse_number(&get, "LOAD_BACKOFF_MS", DEFAULT_BACKOFF_MS)?;

        let page_size = parse_number(&get, "SELECT_PAGE_SIZE", DEFAULT_PAGE_SIZE)?;
        if page_size == 0 {
            return Err(ConfigError::OutOfRange {
                name: "SELECT_PAGE_SIZE",
                reason: "must be at least 1",
            });
        }

        let store = match (get("SUPABASE_URL"), get("SUPABASE_KEY")) {
            (Some(url), Some(key)) => Some(StoreConfig {
                url: url.trim_end_matches('/').to_string(),
                key,
                table: get("SUPABASE_TABLE").unwrap_or_else(|| DEFAULT_TABLE.to_string()),
                page_size,
            }),
            _ => None,
        };

        let publish = get("S3_BUCKET").map(|bucket| PublishConfig {
            bucket,
            prefix: get("S3_PREFIX").unwrap_or_else(|| "air_quality".to_string()),
            gzip: get("S3_GZIP").is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true")),
        });

        Ok(Config {
            raw_dir: get("RAW_DIR").unwrap_or_else(|| "data/raw".into()).into(),
            staged_csv: get("STAGED_CSV")
                .unwrap_or_else(|| "data/staged/air_quality_transformed.csv".into())
                .into(),
            processed_dir: get("PROCESSED_DIR")
                .unwrap_or_else(|| "data/processed".into())
                .into(),
            retry: RetryPolicy {
                batch_size,
                max_retries,
                backoff_unit: Duration::from_millis(backoff_ms),
            },
            store,
            publish,
        })
    }

    /// Store settings, or the fatal error for a stage that cannot run without them.
    pub fn require_store(&self) -> Result<&StoreConfig, ConfigError> {
        match &self.store {
            Some(store) => Ok(store),
            None => Err(ConfigError::Missing("SUPABASE_URL and SUPABASE_KEY")),
        }
    }
}

fn parse_number<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
    }
}
