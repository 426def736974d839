//! Store configuration.
//!
//! Configuration is an explicit value handed to [`CarStore::open`](crate::CarStore::open);
//! nothing is read from the process environment unless the caller asks for
//! it with [`StoreConfig::from_env`].

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Environment variable naming the data root.
pub const ENV_DATA_ROOT: &str = "DATA_ROOT";
/// Environment variable holding the lock TTL in milliseconds.
pub const ENV_LOCK_TTL_MS: &str = "LOCK_TTL_MS";
/// Environment variable holding the backup retention count.
pub const ENV_MAX_BACKUPS: &str = "MAX_BACKUPS";

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing env vars: {0}")]
    Missing(String),

    #[error("{name} must be {expected} (got '{value}')")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Configuration for a [`CarStore`](crate::CarStore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Directory holding `cars.json`, backups, the lock file and assets.
    pub data_root: PathBuf,
    /// Age after which an existing lock is considered abandoned.
    pub lock_ttl: Duration,
    /// Number of backups to keep; `0` disables backups.
    pub max_backups: usize,
}

impl StoreConfig {
    /// Default lock TTL (5 minutes).
    pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(5 * 60);
    /// Default backup retention.
    pub const DEFAULT_MAX_BACKUPS: usize = 10;

    /// Configuration for `data_root` with default TTL and retention.
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            lock_ttl: Self::DEFAULT_LOCK_TTL,
            max_backups: Self::DEFAULT_MAX_BACKUPS,
        }
    }

    /// Sets the lock TTL.
    #[must_use]
    pub const fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    /// Sets the backup retention.
    #[must_use]
    pub const fn with_max_backups(mut self, max_backups: usize) -> Self {
        self.max_backups = max_backups;
        self
    }

    /// Checks invariants.
    ///
    /// # Errors
    /// Returns an error if the TTL is zero or the data root is empty.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.data_root.as_os_str().is_empty() {
            return Err(ConfigError::Missing(ENV_DATA_ROOT.to_string()));
        }
        if self.lock_ttl.is_zero() {
            return Err(ConfigError::Invalid {
                name: ENV_LOCK_TTL_MS,
                expected: "a positive number",
                value: "0".to_string(),
            });
        }
        Ok(self)
    }

    /// Reads `DATA_ROOT`, `LOCK_TTL_MS` and `MAX_BACKUPS` from the process
    /// environment.
    ///
    /// # Errors
    /// Returns an error if `DATA_ROOT` is unset or a value does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    ///
    /// # Errors
    /// Returns an error if `DATA_ROOT` is unset or a value does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_root = lookup(ENV_DATA_ROOT)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::Missing(ENV_DATA_ROOT.to_string()))?;

        let mut config = Self::new(data_root);
        if let Some(raw) = lookup(ENV_LOCK_TTL_MS) {
            config.lock_ttl = Duration::from_millis(parse_lock_ttl_ms(&raw)?);
        }
        if let Some(raw) = lookup(ENV_MAX_BACKUPS) {
            config.max_backups = parse_max_backups(&raw)?;
        }
        config.validate()
    }
}

/// Parses a positive millisecond count.
///
/// # Errors
/// Returns an error unless the value is an integer greater than zero.
pub fn parse_lock_ttl_ms(raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|ms| *ms > 0)
        .ok_or_else(|| ConfigError::Invalid {
            name: ENV_LOCK_TTL_MS,
            expected: "a positive number",
            value: raw.to_string(),
        })
}

/// Parses a non-negative backup count.
///
/// # Errors
/// Returns an error unless the value is an integer `>= 0`.
pub fn parse_max_backups(raw: &str) -> Result<usize, ConfigError> {
    raw.trim().parse::<usize>().map_err(|_| ConfigError::Invalid {
        name: ENV_MAX_BACKUPS,
        expected: "a number >= 0",
        value: raw.to_string(),
    })
}
